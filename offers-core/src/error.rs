//! Top-level error type for the Offers client.

use thiserror::Error;

use crate::client::{ClientError, TokenRefreshError};
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::transport::{CacheError, TransportError};

/// Top-level error type encompassing all client errors.
#[derive(Debug, Error)]
pub enum OffersError {
    /// Error from access-token storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error decoding an access token.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// The refresh endpoint did not issue a token.
    #[error(transparent)]
    TokenRefresh(#[from] TokenRefreshError),

    /// Error from the HTTP transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error from a response cache backend.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ClientError> for OffersError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TokenRefresh(e) => OffersError::TokenRefresh(e),
            ClientError::Transport(e) => OffersError::Transport(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_flattens() {
        let err: OffersError = ClientError::from(TransportError::InvalidHeader {
            name: "Bad Header".to_string(),
        })
        .into();

        assert!(matches!(err, OffersError::Transport(TransportError::InvalidHeader { .. })));
    }

    #[test]
    fn test_config_error_message() {
        let err: OffersError = ConfigError::MissingVar { name: "REFRESH_TOKEN" }.into();
        assert_eq!(
            err.to_string(),
            "configuration error: environment variable REFRESH_TOKEN is not set"
        );
    }
}
