//! ClickHouse table schema.
//!
//! - One row per envelope, flattened context columns
//! - ReplacingMergeTree keyed on the envelope id, so redelivered envelopes collapse
//! - DateTime64(3) for millisecond precision
//! - Metadata kept as a JSON string

pub const EVENT_TABLE: &str = "event";

/// SQL for creating the database.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}

/// SQL for creating the event table.
pub fn create_event_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.{EVENT_TABLE} (
    id String,
    receivedAt DateTime64(3, 'UTC'),

    context_ip Nullable(String),
    context_ua Nullable(String),
    context_os LowCardinality(Nullable(String)),
    context_browser LowCardinality(Nullable(String)),
    context_device LowCardinality(Nullable(String)),
    context_locale LowCardinality(Nullable(String)),
    context_timezone LowCardinality(Nullable(String)),

    schemaVersion LowCardinality(String),
    sessionId Nullable(String),
    userId Nullable(String),
    anonymousId Nullable(String),
    appId String,
    timestamp DateTime64(3, 'UTC'),
    eventType LowCardinality(String),
    metadata String,
    source LowCardinality(String)
)
ENGINE = ReplacingMergeTree(receivedAt)
PARTITION BY toYYYYMM(timestamp)
ORDER BY (appId, toDate(timestamp), id)
SETTINGS index_granularity = 8192
"#
    )
}

/// All DDL statements, in execution order.
pub fn all_statements(database: &str) -> Vec<String> {
    vec![create_database(database), create_event_table(database)]
}
