//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use engine_core::{extract_api_key, ParsedApiKey};

use crate::response::ApiError;

pub const X_AUTH_HEADER: &str = "X-Auth";

/// API key taken from `X-Auth` or `Authorization: Bearer`.
///
/// Rejects before the body is read, so a request without a usable key is
/// answered with 401 whatever its payload.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey(pub ParsedApiKey);

#[async_trait]
impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let x_auth = parts.headers.get(X_AUTH_HEADER).and_then(|h| h.to_str().ok());
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        Ok(ApiKey(extract_api_key(x_auth, authorization)?))
    }
}

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First hop of X-Forwarded-For, then X-Real-IP
        if let Some(xff) = parts.headers.get("X-Forwarded-For") {
            if let Ok(xff_str) = xff.to_str() {
                if let Some(ip) = xff_str.split(',').next().map(str::trim) {
                    if !ip.is_empty() {
                        return Ok(ClientIp(Some(ip.to_string())));
                    }
                }
            }
        }

        if let Some(real_ip) = parts.headers.get("X-Real-IP") {
            if let Ok(ip) = real_ip.to_str() {
                return Ok(ClientIp(Some(ip.trim().to_string())));
            }
        }

        Ok(ClientIp(None))
    }
}
