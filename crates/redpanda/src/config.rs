//! Redpanda configuration.

use std::time::Duration;

use rskafka::client::partition::Compression;
use serde::{Deserialize, Serialize};

/// Where a consumer starts when it has no position yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    Latest,
}

/// Redpanda connection and topic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// SASL username (enables TLS + SCRAM-SHA-256 when set with a password)
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Topic carrying admitted envelopes
    #[serde(default = "default_event_topic")]
    pub event_topic: String,
    /// Topic carrying dead-letter records
    #[serde(default = "default_dlq_topic")]
    pub dlq_topic: String,
    /// Partition used for produce and fetch
    #[serde(default)]
    pub partition: i32,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Deadline for a produce request in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Create missing topics at startup
    #[serde(default = "default_true")]
    pub create_topics: bool,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    #[serde(default = "ConsumerConfig::events")]
    pub consumer: ConsumerConfig,
    #[serde(default = "ConsumerConfig::dead_letters")]
    pub dlq_consumer: ConsumerConfig,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_event_topic() -> String {
    "event".to_string()
}

fn default_dlq_topic() -> String {
    "event_dlq".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_replication_factor() -> i16 {
    1
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            sasl_username: None,
            sasl_password: None,
            event_topic: default_event_topic(),
            dlq_topic: default_dlq_topic(),
            partition: 0,
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            create_topics: true,
            replication_factor: default_replication_factor(),
            consumer: ConsumerConfig::events(),
            dlq_consumer: ConsumerConfig::dead_letters(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn compression(&self) -> Compression {
        match self.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }

    /// SASL credentials, when both halves are configured.
    pub fn sasl_credentials(&self) -> Option<(String, String)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.clone(), pass.clone())),
            _ => None,
        }
    }
}

/// Consumer configuration for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Logical consumer name, used in logs
    pub group_id: String,
    /// Maximum bytes per fetch
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: i32,
    /// Maximum time the broker waits for data in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    #[serde(default = "default_start_offset")]
    pub start_offset: StartOffset,
}

fn default_max_fetch_bytes() -> i32 {
    4 * 1024 * 1024
}

fn default_max_wait_ms() -> i32 {
    500
}

fn default_start_offset() -> StartOffset {
    StartOffset::Earliest
}

impl ConsumerConfig {
    pub fn events() -> Self {
        Self {
            group_id: "analytics-consumer".to_string(),
            max_fetch_bytes: default_max_fetch_bytes(),
            max_wait_ms: default_max_wait_ms(),
            start_offset: default_start_offset(),
        }
    }

    pub fn dead_letters() -> Self {
        Self {
            group_id: "dlq_consumer".to_string(),
            ..Self::events()
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::events()
    }
}
