//! Authenticated API client.
//!
//! [`AuthenticatedClient`] composes a [`TokenLifecycleManager`] and a
//! [`Transport`]. Every call first makes sure a valid access token is held,
//! refreshing it through the refresh endpoint when needed, then dispatches
//! with the token attached.
//!
//! # Refresh protocol
//!
//! - An unauthenticated POST to the refresh endpoint carrying the refresh
//!   credential in the [`HeaderRole::RefreshCredential`] header
//! - On 2xx, the JSON body's `access_token` replaces the current token and is
//!   persisted
//! - Anything else fails the current call with [`TokenRefreshError`]
//!
//! Refreshes are single-flight per client: concurrent callers that find the
//! token expired wait for one refresh instead of each issuing their own. If
//! that refresh is rejected, the waiters fail with the same
//! [`TokenRefreshError`] rather than re-sending the rejected credential.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use offers_core::{ApiConfig, AuthenticatedClient, Params, Headers, TransportConfig, create_store};
//!
//! let config = ApiConfig::from_env()?;
//! let client = AuthenticatedClient::from_config(&config, &TransportConfig::default(), create_store(true)).await?;
//!
//! let response = client.get("products/42/offers", &Params::new(), &Headers::new()).await?;
//! println!("{}", response.body());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{ApiConfig, TransportConfig};
use crate::headers::{HeaderRole, Headers, Params, merge};
use crate::response::Response;
use crate::store::{Secret, TokenStore};
use crate::token_manager::TokenLifecycleManager;
use crate::transport::{Transport, TransportError};

/// Why a refresh did not yield a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The refresh endpoint answered with a non-2xx status.
    Rejected,
    /// A 2xx answer without a string `access_token`.
    MissingAccessToken,
}

/// The refresh endpoint did not issue a token.
///
/// Carries the raw refresh response for inspection.
#[derive(Debug, Clone)]
pub struct TokenRefreshError {
    kind: RefreshFailure,
    response: Response,
}

impl TokenRefreshError {
    pub fn new(kind: RefreshFailure, response: Response) -> Self {
        Self { kind, response }
    }

    pub fn kind(&self) -> RefreshFailure {
        self.kind
    }

    /// The refresh endpoint's response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// An actionable message for the failure.
    pub fn hint(&self) -> &'static str {
        if self.kind == RefreshFailure::MissingAccessToken {
            return "Refresh response did not contain an access token";
        }
        match self.status() {
            StatusCode::UNAUTHORIZED => "Failed to refresh token",
            StatusCode::BAD_REQUEST => "Bad authentication: Check refresh token",
            StatusCode::UNPROCESSABLE_ENTITY => "Malformed authentication request",
            _ => "Unknown token refresh error",
        }
    }
}

impl std::fmt::Display for TokenRefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "token refresh failed with status {}: {}",
            self.status(),
            self.hint()
        )
    }
}

impl std::error::Error for TokenRefreshError {}

/// Errors from an authenticated call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The token could not be refreshed; the call was not sent.
    #[error(transparent)]
    TokenRefresh(#[from] TokenRefreshError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// HTTP client that keeps a valid access token attached.
///
/// # Type Parameters
///
/// * `S` - The token store the lifecycle manager persists to
pub struct AuthenticatedClient<S: TokenStore = Box<dyn TokenStore>> {
    transport: Transport,
    tokens: TokenLifecycleManager<S>,
    refresh_credential: Secret,
    default_headers: RwLock<Headers>,
    refresh_generation: AtomicU64,
    refresh_state: Mutex<RefreshState>,
}

/// Outcome of the most recent refresh, guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_rejection: Option<TokenRefreshError>,
}

impl AuthenticatedClient {
    /// Build a client from deployment configuration.
    pub async fn from_config(
        config: &ApiConfig,
        transport_config: &TransportConfig,
        store: Box<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let transport = Transport::new(
            config.base_url.clone(),
            &config.auth_endpoint,
            transport_config,
        )?;
        let tokens =
            TokenLifecycleManager::load(store, Some(config.persistent_token_key.clone())).await;

        Ok(Self::new(transport, tokens, config.refresh_token.clone()))
    }
}

impl<S: TokenStore> AuthenticatedClient<S> {
    /// Create a client. A still-valid token held by `tokens` is attached
    /// from the first call.
    pub fn new(transport: Transport, tokens: TokenLifecycleManager<S>, refresh_credential: Secret) -> Self {
        let mut default_headers = Headers::new();
        if !tokens.is_expired() {
            if let Some(token) = tokens.current_token() {
                default_headers.insert(
                    HeaderRole::AccessToken.wire_name().to_string(),
                    token.expose().to_string(),
                );
            }
        }

        Self {
            transport,
            tokens,
            refresh_credential,
            default_headers: RwLock::new(default_headers),
            refresh_generation: AtomicU64::new(0),
            refresh_state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn token_manager(&self) -> &TokenLifecycleManager<S> {
        &self.tokens
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Authenticated GET. Caller headers win over the client's defaults.
    pub async fn get(
        &self,
        endpoint: &str,
        params: &Params,
        headers: &Headers,
    ) -> Result<Response, ClientError> {
        self.ensure_access_token().await?;

        let headers = self.request_headers(headers);
        Ok(self.transport.get(endpoint, params, &headers).await?)
    }

    /// Authenticated POST with an optional JSON body.
    pub async fn post(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        headers: &Headers,
    ) -> Result<Response, ClientError> {
        self.ensure_access_token().await?;

        let headers = self.request_headers(headers);
        Ok(self.transport.post(endpoint, body, &headers).await?)
    }

    /// Refresh the access token now, whether or not it has expired.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let mut state = self.refresh_state.lock().await;
        self.run_refresh(&mut state).await
    }

    fn request_headers(&self, caller: &Headers) -> Headers {
        merge(&self.default_headers.read(), caller)
    }

    /// Refresh first if the token is expired.
    ///
    /// Callers that lose the race for the refresh lock reuse the winner's
    /// outcome: its token on success, its error on rejection.
    async fn ensure_access_token(&self) -> Result<(), ClientError> {
        if !self.tokens.is_expired() {
            return Ok(());
        }

        let seen = self.refresh_generation.load(Ordering::Acquire);
        let mut state = self.refresh_state.lock().await;
        if !self.tokens.is_expired() {
            tracing::debug!("Access token refreshed by a concurrent call");
            return Ok(());
        }
        if self.refresh_generation.load(Ordering::Acquire) != seen {
            if let Some(rejection) = &state.last_rejection {
                tracing::debug!(
                    status = %rejection.status(),
                    "Concurrent token refresh was rejected, not retrying"
                );
                return Err(rejection.clone().into());
            }
        }

        tracing::info!("Access token expired or missing, refreshing");
        self.run_refresh(&mut state).await
    }

    /// Refresh and record the outcome for callers queued behind this one.
    async fn run_refresh(&self, state: &mut RefreshState) -> Result<(), ClientError> {
        let result = self.refresh_access_token().await;
        state.last_rejection = match &result {
            Err(ClientError::TokenRefresh(rejection)) => Some(rejection.clone()),
            _ => None,
        };
        self.refresh_generation.fetch_add(1, Ordering::Release);
        result
    }

    /// Exchange the refresh credential for a new access token.
    ///
    /// Must be called with `refresh_state` locked.
    async fn refresh_access_token(&self) -> Result<(), ClientError> {
        let headers = Headers::from([(
            HeaderRole::RefreshCredential.wire_name().to_string(),
            self.refresh_credential.expose().to_string(),
        )]);

        let response = self.transport.post_refresh(&headers).await?;

        if !response.is_success() {
            tracing::error!(status = %response.status(), "Token refresh rejected");
            return Err(TokenRefreshError::new(RefreshFailure::Rejected, response).into());
        }

        let Some(token) = response
            .body()
            .get("access_token")
            .and_then(Value::as_str)
            .map(Secret::new)
        else {
            tracing::error!(status = %response.status(), "Token refresh response has no access_token");
            return Err(TokenRefreshError::new(RefreshFailure::MissingAccessToken, response).into());
        };

        if let Err(e) = self.tokens.update(token.expose(), true).await {
            tracing::warn!("Failed to persist refreshed access token: {}", e);
        }

        self.default_headers.write().insert(
            HeaderRole::AccessToken.wire_name().to_string(),
            token.expose().to_string(),
        );

        tracing::info!(
            expires_at = ?self.tokens.expires_at(),
            "Successfully refreshed access token"
        );
        Ok(())
    }
}

impl<S: TokenStore> std::fmt::Debug for AuthenticatedClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("transport", &self.transport)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
