//! Client configuration.
//!
//! [`ApiConfig`] holds what the deployment must supply (read from the
//! environment); [`TransportConfig`] holds tunables with working defaults.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::store::Secret;
use crate::transport::RetryPolicy;
use crate::transport::cache::DEFAULT_CACHE_TTL;

/// Base URL of the Offers API.
pub const ENV_BASE_URL: &str = "OFFERS_API_BASE_URL";
/// Refresh endpoint, relative to the base URL.
pub const ENV_AUTH_ENDPOINT: &str = "AUTH_ENDPOINT";
/// Long-lived refresh credential.
pub const ENV_REFRESH_TOKEN: &str = "REFRESH_TOKEN";
/// Key the access token is persisted under.
pub const ENV_PERSISTENT_TOKEN_KEY: &str = "PERSISTENT_TOKEN_KEY";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} is not set")]
    MissingVar { name: &'static str },

    #[error("invalid base URL {value:?}: {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Deployment configuration for one API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub auth_endpoint: String,
    pub refresh_token: Secret,
    pub persistent_token_key: String,
}

impl ApiConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`.
    ///
    /// Every variable is required; an empty value counts as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar { name })
        };

        let raw_base_url = require(ENV_BASE_URL)?;
        let base_url = Url::parse(raw_base_url.trim()).map_err(|source| {
            ConfigError::InvalidBaseUrl {
                value: raw_base_url.clone(),
                source,
            }
        })?;

        Ok(Self {
            base_url,
            auth_endpoint: require(ENV_AUTH_ENDPOINT)?,
            refresh_token: Secret::new(require(ENV_REFRESH_TOKEN)?),
            persistent_token_key: require(ENV_PERSISTENT_TOKEN_KEY)?,
        })
    }
}

/// Where cached responses live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    /// One file per entry. `None` uses the platform cache directory.
    Filesystem { dir: Option<PathBuf> },
}

/// Response cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub backend: CacheBackendKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            backend: CacheBackendKind::Memory,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            user_agent: format!("offers-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
