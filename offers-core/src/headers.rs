//! Header maps and the credential header roles.
//!
//! The API uses one wire header, `Bearer`, for two different credentials:
//! the refresh credential while a token is being obtained, and the access
//! token on every other call. Only one of them is on the wire at a time. The
//! two [`HeaderRole`]s keep the two meanings apart in code while mapping to
//! the same header name. Do not split them into two headers; the API only
//! reads `Bearer`.

use std::collections::BTreeMap;

/// Request or response headers, keyed by header name.
pub type Headers = BTreeMap<String, String>;

/// Query parameters, kept sorted so equal requests produce equal cache keys.
pub type Params = BTreeMap<String, String>;

/// The wire header carrying either credential.
pub const BEARER_HEADER: &str = "Bearer";

/// Value written in place of a secret header before a cache write.
pub const REDACTION_MARKER: &str = "REDACTED";

/// Which credential a header carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderRole {
    /// The short-lived access token on authenticated calls.
    AccessToken,
    /// The long-lived refresh credential on the refresh call.
    RefreshCredential,
}

impl HeaderRole {
    /// Every role, for redaction.
    pub const ALL: [HeaderRole; 2] = [HeaderRole::AccessToken, HeaderRole::RefreshCredential];

    /// The header name this role occupies on the wire.
    pub const fn wire_name(self) -> &'static str {
        match self {
            HeaderRole::AccessToken => BEARER_HEADER,
            HeaderRole::RefreshCredential => BEARER_HEADER,
        }
    }

    /// Whether `name` is the wire header of this role.
    pub fn matches(self, name: &str) -> bool {
        self.wire_name().eq_ignore_ascii_case(name)
    }
}

/// Whether a header (or parameter) name carries a credential.
pub fn is_secret_header(name: &str) -> bool {
    HeaderRole::ALL.iter().any(|role| role.matches(name))
}

/// Copy of `headers` with every credential value replaced by [`REDACTION_MARKER`].
pub fn redact(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            if is_secret_header(name) {
                (name.clone(), REDACTION_MARKER.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Merge `overrides` over `defaults`.
///
/// Header names compare case-insensitively; on collision the override wins
/// and keeps its own spelling.
pub fn merge(defaults: &Headers, overrides: &Headers) -> Headers {
    let mut merged: Headers = defaults
        .iter()
        .filter(|(name, _)| !overrides.keys().any(|o| o.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    merged.extend(overrides.iter().map(|(n, v)| (n.clone(), v.clone())));
    merged
}
