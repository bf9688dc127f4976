//! Access-token persistence.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`TokenStore`] - Capability trait for token storage backends
//! - [`MemoryStore`] / [`NoopStore`] - In-process implementations
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select backend based on availability
//!
//! # Storage Key Convention
//!
//! The key is chosen by the caller (typically the `PERSISTENT_TOKEN_KEY`
//! setting). An absent or empty key means the token is never persisted; that
//! decision is made by the token manager, not by the stores.
//!
//! # Example
//!
//! ```rust,ignore
//! use offers_core::store::{Secret, TokenStore, create_store};
//!
//! let store = create_store(true); // Prefer keyring if available
//!
//! store.save("offers-cli", &Secret::new("eyJ...")).await.unwrap();
//!
//! let token = store.load("offers-cli").await.unwrap();
//! assert_eq!(token.unwrap().expose(), "eyJ...");
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::{MemoryStore, NoopStore};
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Keyring service name under which access tokens are filed.
pub const KEYRING_SERVICE_NAME: &str = "offers_sdk";

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
/// The buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Access to the stored token was denied.
    #[error("access denied to stored token: {key}")]
    AccessDenied { key: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Capability set required from an access-token storage backend.
///
/// Any type providing `load`/`save` can back a token manager; there is no
/// base type to extend. Implementations include:
/// - [`MemoryStore`] - In-memory storage (tests, single process)
/// - [`NoopStore`] - Never remembers anything
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Retrieve the token stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored.
    async fn load(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a token under `key`, overwriting any existing value.
    async fn save(&self, key: &str, token: &Secret) -> Result<(), StoreError>;

    /// Forget the token stored under `key`.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn load(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, token: &Secret) -> Result<(), StoreError> {
        (**self).save(key, token).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    async fn load(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, token: &Secret) -> Result<(), StoreError> {
        (**self).save(key, token).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Create a token store with automatic backend selection.
///
/// # Backend Selection Logic
///
/// - If `prefer_keyring` is `true` and the `keyring-store` feature is enabled:
///   - Attempts to create a [`KeyringStore`]
///   - Falls back to [`MemoryStore`] with a warning if keyring is unavailable
/// - Otherwise: Returns [`MemoryStore`]
pub fn create_store(prefer_keyring: bool) -> Box<dyn TokenStore> {
    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringStore::try_new(KEYRING_SERVICE_NAME) {
            Ok(store) => {
                tracing::info!("Using OS keyring for access token storage");
                return Box::new(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Keyring unavailable ({}), falling back to memory store. \
                     Access tokens will not persist across restarts.",
                    e
                );
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            "Keyring storage requested but keyring-store feature not enabled. \
             Using memory store. Access tokens will not persist across restarts."
        );
    }

    tracing::debug!("Using in-memory access token storage");
    Box::new(MemoryStore::new())
}
