use offers_core::{ClientError, ConfigError, TokenRefreshError, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An offer for a registered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identifier.
    pub id: Uuid,
    /// Price in the smallest currency unit.
    pub price: i64,
    pub items_in_stock: i64,
}

/// A product to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub description: String,
}

impl Product {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Identifier of a registered product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId {
    pub id: Uuid,
}

/// Errors that can occur when calling the Offers API.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Credentials were rejected, either by the API or by the refresh endpoint.
    #[error("authentication error: {message}")]
    Authentication {
        message: String,
        #[source]
        refresh: Option<TokenRefreshError>,
    },

    /// The API rejected the request content.
    #[error("validation error: {0}")]
    Validation(String),

    /// The API failed with a 5xx status.
    #[error("server error (status {status})")]
    Server { status: u16, body: Value },

    /// Any other non-success status.
    #[error("unexpected error (status {status})")]
    Unexpected { status: u16, body: Value },

    /// A success response whose body does not have the expected shape.
    #[error("invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SdkError {
    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        SdkError::Authentication {
            message: message.into(),
            refresh: None,
        }
    }

    /// HTTP status behind the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Server { status, .. } | SdkError::Unexpected { status, .. } => Some(*status),
            SdkError::Authentication {
                refresh: Some(e), ..
            } => Some(e.status().as_u16()),
            _ => None,
        }
    }
}

impl From<TokenRefreshError> for SdkError {
    fn from(err: TokenRefreshError) -> Self {
        SdkError::Authentication {
            message: err.hint().to_string(),
            refresh: Some(err),
        }
    }
}

impl From<ClientError> for SdkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TokenRefresh(e) => e.into(),
            ClientError::Transport(e) => e.into(),
        }
    }
}

/// Result type for Offers API operations.
pub type Result<T> = std::result::Result<T, SdkError>;
