//! Access tokens and their expiry claim.
//!
//! This module provides:
//! - [`AccessToken`] - An access token together with its decoded expiry
//! - [`TokenError`] - Why a token could not be decoded
//!
//! Access tokens are JWT-shaped (`header.payload.signature`). Only the payload's
//! `expires` claim is read, and the signature is not verified: the token server
//! is trusted through TLS, not through the token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::store::Secret;

/// Error type for token decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token does not have three dot-separated segments.
    #[error("token is not a three-part JWT")]
    InvalidFormat,

    /// The payload segment is not valid base64url.
    #[error("token payload is not base64url: {message}")]
    InvalidEncoding { message: String },

    /// The payload is not a JSON object with a numeric `expires` claim.
    #[error("token payload has no usable expires claim: {message}")]
    InvalidClaims { message: String },

    /// The `expires` claim is outside the representable time range.
    #[error("token expiry out of range: {expires}")]
    ExpiryOutOfRange { expires: String },
}

#[derive(Debug, Deserialize)]
struct Claims {
    expires: f64,
}

/// An access token with its expiry.
///
/// Never constructed field-by-field: [`AccessToken::decode`] derives the
/// expiry from the token itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: Secret,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Decode a raw token, reading its `expires` claim.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let expires_at = decode_expiry(raw)?;
        Ok(Self {
            value: Secret::new(raw),
            expires_at,
        })
    }

    /// The raw token.
    pub fn secret(&self) -> &Secret {
        &self.value
    }

    /// When the token stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is expired at `now`.
    ///
    /// A token is valid only while `now < expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Read the `expires` claim of a JWT-shaped token.
pub fn decode_expiry(raw: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = raw.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::InvalidFormat);
    };

    // Some issuers keep the `=` padding; the no-pad engine rejects it.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::InvalidEncoding {
            message: e.to_string(),
        })?;

    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::InvalidClaims {
            message: e.to_string(),
        })?;

    if !claims.expires.is_finite() {
        return Err(TokenError::ExpiryOutOfRange {
            expires: claims.expires.to_string(),
        });
    }

    let millis = (claims.expires * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(TokenError::ExpiryOutOfRange {
            expires: claims.expires.to_string(),
        });
    }

    DateTime::from_timestamp_millis(millis as i64).ok_or_else(|| TokenError::ExpiryOutOfRange {
        expires: claims.expires.to_string(),
    })
}
