//! ClickHouse configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Password (optional)
    #[serde(default)]
    pub password: Option<String>,
    /// Deadline for one batch insert in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Create the event table at startup
    #[serde(default = "default_init_schema")]
    pub init_schema: bool,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "analytics".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_init_schema() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            init_schema: default_init_schema(),
        }
    }
}

impl ClickHouseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fully qualified event table name.
    pub fn event_table(&self) -> String {
        format!("{}.{}", self.database, crate::schema::EVENT_TABLE)
    }
}
