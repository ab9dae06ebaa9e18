//! Event types: the client payload, the enriched envelope, and dead-letter records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::schema::{validate_event_type, validate_metadata};

/// Version of the envelope layout written to the transport and the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[default]
    #[serde(rename = "V1_0_0")]
    V1_0_0,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0_0 => "V1_0_0",
        }
    }
}

/// An event exactly as submitted by a client. Nothing is trusted yet.
///
/// The event type is accepted under both `event` and `eventType`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawUserEvent {
    #[validate(required(message = "appId is required"))]
    pub app_id: Option<Uuid>,

    pub anonymous_id: Option<Uuid>,

    pub session_id: Option<Uuid>,

    pub user_id: Option<Uuid>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    #[validate(required(message = "timestamp is required"))]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "event", alias = "eventType")]
    #[validate(
        required(message = "event is required"),
        custom(function = "validate_event_type")
    )]
    pub event_type: Option<String>,

    #[validate(
        required(message = "source is required"),
        length(min = 1, max = 128, message = "source must be 1-128 characters")
    )]
    pub source: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_metadata"))]
    pub metadata: Map<String, Value>,
}

/// A validated client event. All mandatory fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub app_id: Uuid,
    pub anonymous_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "event", alias = "eventType")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Request context captured at the edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub device: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

/// The unit carried on the transport and persisted to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub schema_version: SchemaVersion,
    pub context: Option<Context>,
    pub user_event: UserEvent,
}

impl Envelope {
    /// Wrap a validated event with a fresh id and the current receive time.
    pub fn wrap(user_event: UserEvent, context: Option<Context>) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            schema_version: SchemaVersion::default(),
            context,
            user_event,
        }
    }

    pub fn app_id(&self) -> Uuid {
        self.user_event.app_id
    }

    /// Transport partition key. Events of one application stay ordered.
    pub fn partition_key(&self) -> String {
        self.user_event.app_id.to_string()
    }
}

/// An envelope that could not be persisted, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqRecord {
    pub event: Envelope,
    pub error_message: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

fn default_attempts() -> u32 {
    1
}

impl DlqRecord {
    pub fn new(event: Envelope, reason: impl Into<String>) -> Self {
        Self {
            event,
            error_message: non_empty_reason(reason.into()),
            attempts: 1,
            failed_at: Utc::now(),
        }
    }

    /// Record another failed replay of this envelope.
    pub fn retry_failed(self, reason: impl Into<String>) -> Self {
        Self {
            event: self.event,
            error_message: non_empty_reason(reason.into()),
            attempts: self.attempts.saturating_add(1),
            failed_at: Utc::now(),
        }
    }
}

fn non_empty_reason(reason: String) -> String {
    if reason.trim().is_empty() {
        "unknown persistence failure".to_string()
    } else {
        reason
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Timestamp::Text(ts)) => Ok(Some(ts)),
        Some(Timestamp::Millis(ms)) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
    }
}
