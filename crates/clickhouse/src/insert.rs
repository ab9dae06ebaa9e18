//! Batch insert of envelopes into the event table.

use std::time::Instant;

use async_trait::async_trait;
use clickhouse::Row;
use engine_core::{with_deadline, Dependency, Envelope, Error, Result, StoreFailure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::ClickHouseClient;

/// Flattened envelope row for the event table.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    #[serde(rename = "receivedAt")]
    pub received_at: i64, // DateTime64(3) as milliseconds
    pub context_ip: Option<String>,
    pub context_ua: Option<String>,
    pub context_os: Option<String>,
    pub context_browser: Option<String>,
    pub context_device: Option<String>,
    pub context_locale: Option<String>,
    pub context_timezone: Option<String>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "anonymousId")]
    pub anonymous_id: Option<String>,
    #[serde(rename = "appId")]
    pub app_id: String,
    pub timestamp: i64,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub metadata: String, // JSON object
    pub source: String,
}

impl From<&Envelope> for EventRow {
    fn from(envelope: &Envelope) -> Self {
        let context = envelope.context.clone().unwrap_or_default();
        let event = &envelope.user_event;

        Self {
            id: envelope.id.to_string(),
            received_at: envelope.received_at.timestamp_millis(),
            context_ip: context.ip,
            context_ua: context.user_agent,
            context_os: context.os,
            context_browser: context.browser,
            context_device: context.device,
            context_locale: context.locale,
            context_timezone: context.timezone,
            schema_version: envelope.schema_version.as_str().to_string(),
            session_id: event.session_id.map(|id| id.to_string()),
            user_id: event.user_id.map(|id| id.to_string()),
            anonymous_id: event.anonymous_id.map(|id| id.to_string()),
            app_id: event.app_id.to_string(),
            timestamp: event.timestamp.timestamp_millis(),
            event_type: event.event_type.clone(),
            metadata: Value::Object(event.metadata.clone()).to_string(),
            source: event.source.clone(),
        }
    }
}

/// Durable event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert all envelopes as one batch. Nothing is partially acknowledged:
    /// an error means the whole batch must be treated as not persisted.
    async fn insert_batch(&self, events: &[Envelope]) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// ClickHouse server error codes worth retrying.
const TRANSIENT_CODES: &[u32] = &[
    3,   // UNEXPECTED_END_OF_FILE
    159, // TIMEOUT_EXCEEDED
    202, // TOO_MANY_SIMULTANEOUS_QUERIES
    209, // SOCKET_TIMEOUT
    210, // NETWORK_ERROR
    241, // MEMORY_LIMIT_EXCEEDED
    242, // TABLE_IS_READ_ONLY
    252, // TOO_MANY_PARTS
    319, // UNKNOWN_STATUS_OF_INSERT
    425, // SYSTEM_ERROR
    999, // KEEPER_EXCEPTION
];

/// Extract the numeric code from a server response such as `Code: 60. DB::Exception: ...`.
pub fn response_code(message: &str) -> Option<u32> {
    let rest = &message[message.find("Code: ")? + "Code: ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Classify a server error response. Responses without a code come from
/// proxies or an overloaded server and are retried.
pub fn classify_response(message: &str) -> StoreFailure {
    match response_code(message) {
        Some(code) if !TRANSIENT_CODES.contains(&code) => StoreFailure::Permanent,
        _ => StoreFailure::Transient,
    }
}

/// Map a client error to a store error.
pub fn store_error(stage: &str, err: clickhouse::error::Error) -> Error {
    use clickhouse::error::Error as ChError;

    let failure = match &err {
        ChError::Network(_) | ChError::TimedOut => StoreFailure::Transient,
        ChError::BadResponse(message) => classify_response(message),
        _ => StoreFailure::Permanent,
    };
    Error::store(failure, format!("{stage} failed: {err}"))
}

/// Insert envelopes into the event table.
pub async fn insert_events(client: &ClickHouseClient, events: &[Envelope]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let count = events.len();
    let start = Instant::now();
    let table = client.config().event_table();

    let mut insert = client
        .inner()
        .insert(&table)
        .map_err(|e| store_error("insert", e))?;

    for envelope in events {
        insert
            .write(&EventRow::from(envelope))
            .await
            .map_err(|e| store_error("write", e))?;
    }

    insert.end().await.map_err(|e| store_error("end", e))?;

    debug!(
        count,
        table = %table,
        latency_ms = %start.elapsed().as_millis(),
        "Inserted events to ClickHouse"
    );

    Ok(count)
}

#[async_trait]
impl EventStore for ClickHouseClient {
    async fn insert_batch(&self, events: &[Envelope]) -> Result<()> {
        with_deadline(
            Dependency::Store,
            "insert",
            self.config().timeout(),
            insert_events(self, events),
        )
        .await
        .map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        with_deadline(Dependency::Store, "ping", self.config().timeout(), async {
            self.inner()
                .query("SELECT 1")
                .fetch_one::<u8>()
                .await
                .map(|_| ())
                .map_err(|e| store_error("ping", e))
        })
        .await
    }
}
