//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::HealthReport;

use crate::response::EventsHealthResponse;
use crate::state::AppState;

/// GET /health - Dependency health.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.report())
}

/// GET /health/ready - Readiness probe (can admit events).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe.
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// GET /api/health/events - Persistence pipeline summary.
pub async fn events_health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<EventsHealthResponse>) {
    let status = state.metrics.pipeline_status(state.failure_rate_threshold);
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(EventsHealthResponse::from(status)))
}
