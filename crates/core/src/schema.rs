//! Validation of client-submitted events.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{Error, Result};
use crate::events::{RawUserEvent, UserEvent};
use crate::limits::{MAX_EVENT_BODY_BYTES, MAX_EVENT_TYPE_LEN, MAX_METADATA_BYTES};

static EVENT_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\- ]*$").expect("valid regex"));

/// Validates raw body size BEFORE deserialization.
pub fn validate_event_size(raw_bytes: &[u8]) -> Result<()> {
    if raw_bytes.len() > MAX_EVENT_BODY_BYTES {
        return Err(Error::validation(format!(
            "event {}KB exceeds {}KB limit",
            raw_bytes.len() / 1024,
            MAX_EVENT_BODY_BYTES / 1024
        )));
    }
    Ok(())
}

/// Checks the mandatory fields and converts the raw payload into a [`UserEvent`].
pub fn validate_user_event(raw: RawUserEvent) -> Result<UserEvent> {
    raw.validate()
        .map_err(|e| Error::validation(describe(&e)))?;

    let (Some(app_id), Some(timestamp), Some(event_type), Some(source)) =
        (raw.app_id, raw.timestamp, raw.event_type, raw.source)
    else {
        return Err(Error::validation("missing mandatory field"));
    };

    Ok(UserEvent {
        app_id,
        anonymous_id: raw.anonymous_id,
        session_id: raw.session_id,
        user_id: raw.user_id,
        timestamp,
        event_type,
        source,
        metadata: raw.metadata,
    })
}

pub(crate) fn validate_event_type(value: &str) -> std::result::Result<(), ValidationError> {
    if value.is_empty() || value.len() > MAX_EVENT_TYPE_LEN {
        let mut err = ValidationError::new("event_type_length");
        err.message = Some("event must be 1-128 characters".into());
        return Err(err);
    }
    if !EVENT_TYPE_PATTERN.is_match(value) {
        let mut err = ValidationError::new("event_type_format");
        err.message = Some("event contains invalid characters".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_metadata(
    metadata: &Map<String, Value>,
) -> std::result::Result<(), ValidationError> {
    let size = serde_json::to_vec(metadata).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > MAX_METADATA_BYTES {
        let mut err = ValidationError::new("metadata_size");
        err.message = Some(format!("metadata exceeds {}KB", MAX_METADATA_BYTES / 1024).into());
        return Err(err);
    }
    Ok(())
}

/// Flattens validator output into "field: message" pairs, sorted by field.
fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "invalid".to_string());
            format!("{field}: {message}")
        })
        .collect();
    parts.sort();
    parts.join("; ")
}
