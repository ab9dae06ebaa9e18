//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which cache implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    /// Process-local map. Only correct with a single gateway instance.
    Memory,
}

/// Shared cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: CacheBackend,
    /// Redis connection URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Deadline for a single cache command in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Maximum number of in-flight write-behind tasks
    #[serde(default = "default_write_behind_capacity")]
    pub write_behind_capacity: usize,
    /// Seconds to wait for in-flight write-behind tasks at shutdown
    #[serde(default = "default_write_behind_drain_secs")]
    pub write_behind_drain_secs: u64,
}

fn default_backend() -> CacheBackend {
    CacheBackend::Redis
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_op_timeout_ms() -> u64 {
    250
}

fn default_write_behind_capacity() -> usize {
    256
}

fn default_write_behind_drain_secs() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_url(),
            op_timeout_ms: default_op_timeout_ms(),
            write_behind_capacity: default_write_behind_capacity(),
            write_behind_drain_secs: default_write_behind_drain_secs(),
        }
    }
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn write_behind_drain(&self) -> Duration {
        Duration::from_secs(self.write_behind_drain_secs)
    }
}
