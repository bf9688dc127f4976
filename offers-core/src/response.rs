//! Structured HTTP responses.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A finished HTTP exchange: status, parsed body and cache provenance.
///
/// Bodies are parsed eagerly. An empty body becomes JSON `null` and a body
/// that is not JSON is kept as a JSON string, so a `Response` always exists
/// for any status the server returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    body: Value,
    from_cache: bool,
}

impl Response {
    /// A response received from the network.
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            from_cache: false,
        }
    }

    /// A response replayed from the cache.
    pub fn cached(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            from_cache: true,
        }
    }

    /// Build a response from raw body bytes.
    pub fn from_bytes(status: StatusCode, bytes: &[u8]) -> Self {
        Self::new(status, parse_body(bytes))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Whether this response was served from the cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
