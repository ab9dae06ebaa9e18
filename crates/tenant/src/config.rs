//! Tenant service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant service base URL (e.g., "http://tenant-service:8081")
    #[serde(default = "default_url")]
    pub url: String,
    /// Deadline for one identity or ledger call in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long a verified key binding stays in the process-local cache
    #[serde(default = "default_identity_ttl_secs")]
    pub identity_ttl_secs: u64,
    /// Maximum process-local key bindings
    #[serde(default = "default_identity_capacity")]
    pub identity_capacity: u64,
    /// Attempts for a deferred charge when the cache was down at admission
    #[serde(default = "default_charge_retry_attempts")]
    pub charge_retry_attempts: u32,
}

fn default_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_identity_ttl_secs() -> u64 {
    30
}

fn default_identity_capacity() -> u64 {
    10_000
}

fn default_charge_retry_attempts() -> u32 {
    5
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            request_timeout_ms: default_request_timeout_ms(),
            identity_ttl_secs: default_identity_ttl_secs(),
            identity_capacity: default_identity_capacity(),
            charge_retry_attempts: default_charge_retry_attempts(),
        }
    }
}

impl TenantConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn identity_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_ttl_secs)
    }
}
