//! Access-token lifecycle.
//!
//! [`TokenLifecycleManager`] owns the in-memory access token and its expiry.
//! It answers one question for the rest of the crate, "is my token still
//! good?", and is the only place the token is mutated.
//!
//! # Features
//!
//! - Adopts a still-valid token from a [`TokenStore`] at construction
//! - Treats "no token", "undecodable token" and "past expiry" alike: expired
//! - Writes refreshed tokens through to the store
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use offers_core::{MemoryStore, TokenLifecycleManager};
//!
//! let manager = TokenLifecycleManager::load(MemoryStore::new(), Some("offers-cli".into())).await;
//! assert!(manager.is_expired());
//!
//! manager.update("eyJhbGciOi...", true).await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::store::{Secret, StoreError, TokenStore};
use crate::token::AccessToken;

#[derive(Debug, Default)]
struct TokenState {
    token: Option<Secret>,
    /// `None` while a token is held means it could not be decoded.
    expires_at: Option<DateTime<Utc>>,
}

/// Owner of the current access token.
///
/// # Type Parameters
///
/// * `S` - The token store implementation to use
pub struct TokenLifecycleManager<S: TokenStore = Box<dyn TokenStore>> {
    store: S,
    key: Option<String>,
    state: RwLock<TokenState>,
}

impl<S: TokenStore> TokenLifecycleManager<S> {
    /// Create a manager, adopting the stored token if it is still valid.
    ///
    /// An absent or empty `key` disables persistence entirely. A store that
    /// fails to load is logged and treated as empty.
    pub async fn load(store: S, key: Option<String>) -> Self {
        let key = key.filter(|k| !k.is_empty());
        let manager = Self {
            store,
            key,
            state: RwLock::new(TokenState::default()),
        };

        let Some(key) = manager.key.as_deref() else {
            tracing::debug!("No persistence key configured, starting without a token");
            return manager;
        };

        match manager.store.load(key).await {
            Ok(Some(stored)) => match AccessToken::decode(stored.expose()) {
                Ok(token) if !token.is_expired() => {
                    tracing::debug!(
                        expires_at = %token.expires_at(),
                        "Adopting stored access token"
                    );
                    *manager.state.write() = TokenState {
                        token: Some(token.secret().clone()),
                        expires_at: Some(token.expires_at()),
                    };
                }
                Ok(token) => {
                    tracing::debug!(
                        expired_at = %token.expires_at(),
                        "Stored access token already expired"
                    );
                }
                Err(e) => {
                    tracing::warn!("Ignoring undecodable stored access token: {}", e);
                }
            },
            Ok(None) => tracing::debug!("No stored access token"),
            Err(e) => tracing::warn!("Failed to load stored access token: {}", e),
        }

        manager
    }

    /// Whether a refresh is needed before the next authenticated call.
    ///
    /// True when no token is held, when the held token could not be decoded,
    /// or when `now >= expiry`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// [`is_expired`](Self::is_expired) evaluated at an explicit instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        match (&state.token, state.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at,
            _ => true,
        }
    }

    /// The current token, whether or not it is still valid.
    pub fn current_token(&self) -> Option<Secret> {
        self.state.read().token.clone()
    }

    /// Expiry of the current token, if one is held and decodable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read();
        state.token.as_ref().and(state.expires_at)
    }

    /// Key tokens are persisted under, if persistence is enabled.
    pub fn persistence_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the current token.
    ///
    /// The in-memory state changes before anything is persisted, so a store
    /// failure leaves the new token usable in this process; the error is
    /// still returned for the caller to report. A token that cannot be
    /// decoded is kept but reported as expired.
    pub async fn update(&self, token: &str, persist: bool) -> Result<(), StoreError> {
        let expires_at = match AccessToken::decode(token) {
            Ok(decoded) => Some(decoded.expires_at()),
            Err(e) => {
                tracing::warn!("Access token could not be decoded, treating as expired: {}", e);
                None
            }
        };

        let secret = Secret::new(token);
        {
            let mut state = self.state.write();
            state.token = Some(secret.clone());
            state.expires_at = expires_at;
        }

        if persist {
            if let Some(key) = self.key.as_deref() {
                self.store.save(key, &secret).await?;
                tracing::debug!("Persisted access token");
            }
        }

        Ok(())
    }

    /// Drop the current token from memory and from the store.
    pub async fn forget(&self) -> Result<(), StoreError> {
        *self.state.write() = TokenState::default();

        if let Some(key) = self.key.as_deref() {
            self.store.delete(key).await?;
        }

        Ok(())
    }
}

impl<S: TokenStore> std::fmt::Debug for TokenLifecycleManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("key", &self.key)
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}
