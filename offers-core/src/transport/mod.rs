//! Raw HTTP transport against one API base URL.
//!
//! [`Transport`] knows nothing about tokens. It resolves endpoints against
//! the base URL, retries transient failures per its [`RetryPolicy`], and
//! serves eligible GETs from a redacting [`ResponseCache`].
//!
//! The refresh endpoint is special-cased twice: it is never looked up in or
//! written to the cache, and [`Transport::post_refresh`] sends to it without
//! retries.

pub mod cache;
pub mod retry;

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{CacheBackendKind, CacheConfig, TransportConfig};
use crate::headers::{Headers, Params, is_secret_header};
use crate::response::Response;

pub use cache::{CacheBackend, CacheEntry, CacheError, FileCache, MemoryCache, ResponseCache};
pub use retry::RetryPolicy;

/// Errors raised by the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be joined onto the base URL.
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidUrl {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The endpoint resolves to a host other than the API's.
    #[error("endpoint {endpoint:?} leaves the API origin ({url})")]
    ForeignOrigin { endpoint: String, url: Url },

    /// A header name or value cannot be sent.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Connection or timeout failures on every attempt.
    #[error("could not reach {url} after {attempts} attempt(s): {source}")]
    Connectivity {
        url: Url,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// A retryable status on every attempt.
    #[error("{url} still returned {status} after {attempts} attempt(s)")]
    RetriesExhausted {
        url: Url,
        status: StatusCode,
        attempts: u32,
    },

    /// Any other request failure.
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Whether the failure is a network condition rather than a bad request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connectivity { .. } | TransportError::RetriesExhausted { .. }
        )
    }
}

/// HTTP transport for one API.
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    auth_url: Url,
    retry: RetryPolicy,
    cache: Option<ResponseCache>,
}

impl Transport {
    /// Create a transport for `base_url`, with `auth_endpoint` as the
    /// refresh endpoint.
    ///
    /// A base URL without a trailing `/` gets one, so endpoints always
    /// resolve beneath it.
    pub fn new(
        base_url: Url,
        auth_endpoint: &str,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(TransportError::ClientBuild)?;

        let base_url = normalize_base_url(base_url);
        let auth_url = join(&base_url, auth_endpoint)?;

        Ok(Self {
            http,
            base_url,
            auth_url,
            retry: config.retry.clone(),
            cache: build_cache(&config.cache),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of the refresh endpoint.
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The response cache, if caching is enabled.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Resolve `endpoint` against the base URL.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
        join(&self.base_url, endpoint)
    }

    /// Whether `url` addresses the refresh endpoint, ignoring the query.
    pub fn is_auth_url(&self, url: &Url) -> bool {
        url.scheme() == self.auth_url.scheme()
            && url.host_str() == self.auth_url.host_str()
            && url.port_or_known_default() == self.auth_url.port_or_known_default()
            && url.path() == self.auth_url.path()
    }

    /// GET `endpoint`, served from the cache when possible.
    pub async fn get(
        &self,
        endpoint: &str,
        params: &Params,
        headers: &Headers,
    ) -> Result<Response, TransportError> {
        let url = self.resolve(endpoint)?;
        let cache = self.cache.as_ref().filter(|_| !self.is_auth_url(&url));
        let key = ResponseCache::key(&Method::GET, &url, params);

        if let Some(entry) = cache.and_then(|c| c.lookup(&key)) {
            tracing::debug!(url = %url, "Serving response from cache");
            let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
            return Ok(Response::cached(status, entry.body));
        }

        let mut request_url = url.clone();
        if !params.is_empty() {
            request_url.query_pairs_mut().extend_pairs(params.iter());
        }

        let (response, response_headers) = self
            .execute(Method::GET, request_url, None, headers, &self.retry)
            .await?;

        if let Some(cache) = cache {
            if response.status() == StatusCode::OK {
                match cache::freshness(&response_headers, cache.ttl()) {
                    Some(ttl) => {
                        let entry = cache_entry(key, &url, headers, &response_headers, &response, ttl);
                        cache.store(entry);
                    }
                    None => tracing::debug!(url = %url, "Response forbids caching"),
                }
            }
        }

        Ok(response)
    }

    /// POST a JSON body to `endpoint`. Never cached.
    pub async fn post(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        headers: &Headers,
    ) -> Result<Response, TransportError> {
        let url = self.resolve(endpoint)?;
        let (response, _) = self
            .execute(Method::POST, url, body, headers, &self.retry)
            .await?;
        Ok(response)
    }

    /// POST to the refresh endpoint exactly once, whatever the outcome.
    ///
    /// Every status is returned as a [`Response`]; only network failures are
    /// errors.
    pub async fn post_refresh(&self, headers: &Headers) -> Result<Response, TransportError> {
        let (response, _) = self
            .execute(
                Method::POST,
                self.auth_url.clone(),
                None,
                headers,
                &RetryPolicy::none(),
            )
            .await?;
        Ok(response)
    }

    /// Send a request, retrying transient failures per `policy`.
    ///
    /// With retries configured, a retryable status on the last attempt is an
    /// error. With none, every status passes through to the caller.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        headers: &Headers,
        policy: &RetryPolicy,
    ) -> Result<(Response, HeaderMap), TransportError> {
        let header_map = to_header_map(headers)?;
        let mut attempt = 0;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(header_map.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if RetryPolicy::is_retryable_status(status) && policy.max_retries > 0 {
                        if attempt < policy.max_retries {
                            let delay = policy
                                .delay_for(attempt, retry::parse_retry_after(response.headers()));
                            tracing::warn!(
                                status = %status,
                                url = %url,
                                delay_ms = delay.as_millis() as u64,
                                attempt = attempt + 1,
                                max_retries = policy.max_retries,
                                "Retryable status, backing off"
                            );
                            sleep(delay).await;
                            attempt += 1;
                            continue;
                        }

                        tracing::error!(
                            status = %status,
                            url = %url,
                            total_attempts = attempt + 1,
                            "HTTP request failed after all retries"
                        );
                        return Err(TransportError::RetriesExhausted {
                            url,
                            status,
                            attempts: attempt + 1,
                        });
                    }

                    let response_headers = response.headers().clone();
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|source| TransportError::Request {
                            url: url.clone(),
                            source,
                        })?;

                    tracing::debug!(status = %status, url = %url, "Received HTTP response");
                    return Ok((Response::from_bytes(status, &bytes), response_headers));
                }

                Err(e) if e.is_connect() || e.is_timeout() => {
                    let error_kind = if e.is_timeout() {
                        "timeout"
                    } else {
                        "connection_failed"
                    };

                    if attempt < policy.max_retries {
                        let delay = policy.backoff_delay(attempt);
                        tracing::warn!(
                            error_kind = error_kind,
                            error = %e,
                            url = %url,
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            "HTTP request error, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error_kind = error_kind,
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "HTTP request failed after all retries"
                    );
                    return Err(TransportError::Connectivity {
                        url,
                        attempts: attempt + 1,
                        source: e,
                    });
                }

                Err(source) => return Err(TransportError::Request { url, source }),
            }
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .field("auth_url", &self.auth_url.as_str())
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .finish()
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Credentials are attached to every request, so a joined URL must stay on
/// the base URL's origin.
fn join(base: &Url, endpoint: &str) -> Result<Url, TransportError> {
    let url = base
        .join(endpoint)
        .map_err(|source| TransportError::InvalidUrl {
            endpoint: endpoint.to_string(),
            source,
        })?;

    if url.origin() != base.origin() {
        return Err(TransportError::ForeignOrigin {
            endpoint: endpoint.to_string(),
            url,
        });
    }
    Ok(url)
}

fn build_cache(config: &CacheConfig) -> Option<ResponseCache> {
    if !config.enabled {
        return None;
    }

    let backend: Box<dyn CacheBackend> = match &config.backend {
        CacheBackendKind::Memory => Box::new(MemoryCache::new()),
        CacheBackendKind::Filesystem { dir } => {
            let opened = match dir {
                Some(dir) => FileCache::open(dir.clone()),
                None => FileCache::default_dir().and_then(|dir| FileCache::open(dir)),
            };
            match opened {
                Ok(files) => {
                    tracing::debug!(dir = ?files.dir(), "Using filesystem response cache");
                    Box::new(files)
                }
                Err(e) => {
                    tracing::warn!("Filesystem cache unavailable, using memory: {}", e);
                    Box::new(MemoryCache::new())
                }
            }
        }
    };

    Some(ResponseCache::new(backend, config.ttl))
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || TransportError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let mut header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        if is_secret_header(name) {
            header_value.set_sensitive(true);
        }
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn from_header_map(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn cache_entry(
    key: String,
    url: &Url,
    request_headers: &Headers,
    response_headers: &HeaderMap,
    response: &Response,
    ttl: Duration,
) -> CacheEntry {
    let created_at = Utc::now();
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    CacheEntry {
        key,
        method: Method::GET.to_string(),
        url: url.to_string(),
        status: response.status().as_u16(),
        request_headers: request_headers.clone(),
        response_headers: from_header_map(response_headers),
        body: response.body().clone(),
        created_at,
        expires_at: created_at
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC),
    }
}
