//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use engine_core::{Envelope, ErrorKind};
use serde::{Deserialize, Serialize};
use telemetry::PipelineStatus;
use uuid::Uuid;

/// Seconds a client should wait before retrying after a dependency failure.
pub const RETRY_AFTER_SECS: u64 = 1;

/// Success response for admission.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitResponse {
    pub accepted: bool,
    pub event_id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl From<&Envelope> for AdmitResponse {
    fn from(envelope: &Envelope) -> Self {
        Self {
            accepted: true,
            event_id: envelope.id,
            received_at: envelope.received_at,
        }
    }
}

/// Persistence pipeline summary.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsHealthResponse {
    pub total_events_processed: u64,
    pub total_batches_processed: u64,
    pub total_failed_batches: u64,
    pub current_buffer_size: u64,
    pub last_processing_time_ms: Option<u64>,
    pub failure_rate: f64,
    pub dead_lettered: u64,
    pub dead_letter_publish_failures: u64,
    /// HEALTHY or UNHEALTHY
    pub status: String,
}

impl From<PipelineStatus> for EventsHealthResponse {
    fn from(status: PipelineStatus) -> Self {
        Self {
            total_events_processed: status.total_events_processed,
            total_batches_processed: status.total_batches_processed,
            total_failed_batches: status.total_failed_batches,
            current_buffer_size: status.current_buffer_size,
            last_processing_time_ms: status.last_processing_time_ms,
            failure_rate: status.failure_rate,
            dead_lettered: status.dead_lettered,
            dead_letter_publish_failures: status.dead_letter_publish_failures,
            status: if status.healthy { "HEALTHY" } else { "UNHEALTHY" }.to_string(),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// validation, auth, quota, unavailable, or internal
    pub kind: ErrorKind,
}

/// API error with a stable code and kind.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, code: &str, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse {
                error: msg.into(),
                code: code.to_string(),
                kind,
            },
            retry_after: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::Validation, "VALID_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<engine_core::Error> for ApiError {
    fn from(err: engine_core::Error) -> Self {
        let kind = err.kind();
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };

        let mut api_error = ApiError::new(status, kind, err.error_code(), message);
        if kind == ErrorKind::Unavailable {
            api_error.retry_after = Some(RETRY_AFTER_SECS);
        }
        api_error
    }
}
