//! Event admission endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::extractors::{ApiKey, ClientIp};
use crate::response::{AdmitResponse, ApiError};
use crate::state::AppState;

/// POST /event - Admit a single event.
///
/// Responds 202 once the event is durably on the transport. The body is
/// decoded here rather than with the `Json` extractor so malformed payloads
/// map onto the validation error code.
pub async fn event_handler(
    State(state): State<AppState>,
    ApiKey(api_key): ApiKey,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AdmitResponse>), ApiError> {
    let context = state.enricher.enrich(&headers, client_ip);
    let envelope = state.admission.admit_body(&body, &api_key, context).await?;

    Ok((StatusCode::ACCEPTED, Json(AdmitResponse::from(&envelope))))
}
