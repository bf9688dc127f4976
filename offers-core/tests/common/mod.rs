//! Shared fixtures for offers-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use offers_core::{
    AuthenticatedClient, CacheConfig, MemoryStore, RetryPolicy, Secret, TokenLifecycleManager,
    Transport, TransportConfig,
};
use url::Url;
use wiremock::MockServer;

pub const AUTH_PATH: &str = "/api/v1/auth";
pub const REFRESH_TOKEN: &str = "refresh-secret";
pub const TOKEN_KEY: &str = "offers-test";

/// Build an unsigned JWT-shaped token expiring at `expires`.
pub fn jwt(expires: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"expires":{}}}"#, expires.timestamp()));
    format!("{}.{}.signature", header, payload)
}

pub fn valid_jwt() -> String {
    jwt(Utc::now() + chrono::Duration::hours(1))
}

pub fn expired_jwt() -> String {
    jwt(Utc::now() - chrono::Duration::hours(1))
}

/// Transport settings with millisecond backoff.
pub fn fast_config() -> TransportConfig {
    TransportConfig {
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..TransportConfig::default()
    }
}

pub fn uncached_config() -> TransportConfig {
    TransportConfig {
        cache: CacheConfig::disabled(),
        ..fast_config()
    }
}

pub fn transport(server: &MockServer, config: &TransportConfig) -> Transport {
    let base = Url::parse(&format!("{}/api/v1/", server.uri())).unwrap();
    Transport::new(base, "auth", config).unwrap()
}

pub async fn client_with(
    server: &MockServer,
    store: Arc<MemoryStore>,
    config: TransportConfig,
) -> AuthenticatedClient<Arc<MemoryStore>> {
    let tokens = TokenLifecycleManager::load(store, Some(TOKEN_KEY.to_string())).await;
    AuthenticatedClient::new(transport(server, &config), tokens, Secret::new(REFRESH_TOKEN))
}

/// A client with an empty store and the fast default configuration.
pub async fn client(server: &MockServer) -> AuthenticatedClient<Arc<MemoryStore>> {
    client_with(server, Arc::new(MemoryStore::new()), fast_config()).await
}
