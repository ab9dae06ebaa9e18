//! Pipeline and scheduler configuration.

use std::time::Duration;

use engine_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Buffering, batching, and retry settings for the persistence pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Buffer size that triggers an immediate flush
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Envelopes per persisted batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Persist attempts per batch, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Failed/processed batch ratio above which the pipeline reports unhealthy
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
}

fn default_max_buffer_size() -> usize {
    1000
}

fn default_max_batch_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_failure_rate_threshold() -> f64 {
    0.1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            retry_attempts: default_retry_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            failure_rate_threshold: default_failure_rate_threshold(),
        }
    }
}

impl PipelineConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Intervals for the background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    #[serde(default = "default_replay_interval_secs")]
    pub replay_interval_secs: u64,
    /// How long one dead-letter replay stays active
    #[serde(default = "default_replay_window_secs")]
    pub replay_window_secs: u64,
    #[serde(default = "default_metrics_log_interval_secs")]
    pub metrics_log_interval_secs: u64,
    #[serde(default = "default_true")]
    pub monthly_reset: bool,
}

fn default_reconcile_interval_ms() -> u64 {
    500
}

fn default_replay_interval_secs() -> u64 {
    60
}

fn default_replay_window_secs() -> u64 {
    5
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: default_reconcile_interval_ms(),
            replay_interval_secs: default_replay_interval_secs(),
            replay_window_secs: default_replay_window_secs(),
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
            monthly_reset: true,
        }
    }
}

impl SchedulerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs)
    }

    pub fn replay_window(&self) -> Duration {
        Duration::from_secs(self.replay_window_secs)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_log_interval_secs)
    }
}
