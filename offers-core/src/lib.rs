//! # Offers Core
//!
//! Authenticated transport for the Offers API.
//!
//! This crate provides:
//! - [`TokenStore`] backends for persisting the access token between runs
//! - [`TokenLifecycleManager`], the single owner of the current access token
//! - [`Transport`], raw HTTP with retry and a credential-redacting cache
//! - [`AuthenticatedClient`], which refreshes and attaches tokens before every call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use offers_core::{ApiConfig, AuthenticatedClient, Headers, Params, TransportConfig, create_store};
//!
//! async fn offers() -> Result<(), offers_core::OffersError> {
//!     let config = ApiConfig::from_env()?;
//!     let client = AuthenticatedClient::from_config(&config, &TransportConfig::default(), create_store(true)).await?;
//!     let response = client.get("products/42/offers", &Params::new(), &Headers::new()).await?;
//!     println!("{}", response.body());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod response;
pub mod store;
pub mod token;
pub mod token_manager;
pub mod transport;

// Re-export commonly used types at crate root
pub use client::{
    AuthenticatedClient,
    ClientError,
    RefreshFailure,
    TokenRefreshError,
};

pub use config::{
    ApiConfig,
    CacheBackendKind,
    CacheConfig,
    ConfigError,
    TransportConfig,
};

pub use error::OffersError;

pub use headers::{
    BEARER_HEADER,
    HeaderRole,
    Headers,
    Params,
    REDACTION_MARKER,
};

pub use response::Response;

pub use store::{
    MemoryStore,
    NoopStore,
    Secret,
    StoreError,
    TokenStore,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token::{AccessToken, TokenError};

pub use token_manager::TokenLifecycleManager;

pub use transport::{
    CacheEntry,
    CacheError,
    ResponseCache,
    RetryPolicy,
    Transport,
    TransportError,
};
