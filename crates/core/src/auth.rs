//! API key parsing.
//!
//! Keys are UUIDs. Clients send them either in `X-Auth: <key>` or in
//! `Authorization: Bearer <key>`.

use std::fmt;

use uuid::Uuid;

use crate::error::{AuthErrorCode, Error, Result};

/// Parsed and validated API key from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParsedApiKey(Uuid);

impl ParsedApiKey {
    /// Parse and validate an API key.
    pub fn parse(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::auth(AuthErrorCode::MissingKey, "API key is required"));
        }

        Uuid::parse_str(key)
            .map(Self)
            .map_err(|_| Error::auth(AuthErrorCode::InvalidFormat, "Invalid API key format"))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ParsedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ParsedApiKey {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Extract API key from request headers.
///
/// Checks in order:
/// 1. `X-Auth: <key>`
/// 2. `Authorization: Bearer <key>`
pub fn extract_api_key(
    x_auth_header: Option<&str>,
    auth_header: Option<&str>,
) -> Result<ParsedApiKey> {
    if let Some(key) = x_auth_header {
        return ParsedApiKey::parse(key);
    }

    if let Some(auth) = auth_header {
        if let Some(key) = auth.strip_prefix("Bearer ") {
            return ParsedApiKey::parse(key);
        }
        return Err(Error::auth(
            AuthErrorCode::InvalidFormat,
            "Authorization header must use the Bearer scheme",
        ));
    }

    Err(Error::auth(AuthErrorCode::MissingKey, "API key is required"))
}
