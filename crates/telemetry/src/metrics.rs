//! In-process counters for admission, credit accounting, and the persistence pipeline.
//!
//! A single [`Metrics`] is created at startup and shared as `Arc<Metrics>`
//! with every component that records into it.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A point-in-time value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency distribution with fixed millisecond buckets.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; 11],
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Upper bounds in ms. The last bucket also holds everything above it.
    pub const BOUNDS_MS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn observe(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let idx = Self::BOUNDS_MS
            .partition_point(|&bound| bound < ms)
            .min(Self::BOUNDS_MS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// (upper bound ms, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BOUNDS_MS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Wall-clock timestamp stored as epoch millis; zero means never.
#[derive(Debug, Default)]
pub struct Timestamp(AtomicI64);

impl Timestamp {
    pub fn touch(&self) {
        self.0.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// Collected metrics for the gateway.
#[derive(Debug, Default)]
pub struct Metrics {
    // Admission
    pub events_received: Counter,
    pub events_accepted: Counter,
    pub rejected_validation: Counter,
    pub rejected_auth: Counter,
    pub rejected_quota: Counter,
    pub rejected_unavailable: Counter,
    /// Events charged after losing the post-publish race for the last credit.
    pub credit_overdrafts: Counter,
    pub admission_latency_ms: Histogram,
    pub publish_latency_ms: Histogram,

    // Credit accounting
    pub write_behind_submitted: Counter,
    pub write_behind_dropped: Counter,
    pub write_behind_failed: Counter,
    pub reconcile_runs: Counter,
    pub reconcile_failures: Counter,
    pub credits_reconciled: Counter,
    pub monthly_resets: Counter,

    // Persistence pipeline
    pub events_consumed: Counter,
    pub events_persisted: Counter,
    pub batches_flushed: Counter,
    pub batches_failed: Counter,
    pub persist_retries: Counter,
    pub events_dead_lettered: Counter,
    /// Envelopes lost because the DLQ publish itself failed.
    pub dead_letter_publish_failures: Counter,
    pub buffer_size: Gauge,
    pub last_flush: Timestamp,
    /// Duration of the most recent buffer drain.
    pub last_processing_ms: Gauge,
    pub persist_latency_ms: Histogram,

    // Dead-letter replay
    pub replay_runs: Counter,
    pub events_replayed: Counter,
    pub replay_failures: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of flushed batches that ended in the dead-letter topic.
    pub fn failure_rate(&self) -> f64 {
        match self.batches_flushed.get() {
            0 => 0.0,
            total => self.batches_failed.get() as f64 / total as f64,
        }
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_received: self.events_received.get(),
            events_accepted: self.events_accepted.get(),
            rejected_validation: self.rejected_validation.get(),
            rejected_auth: self.rejected_auth.get(),
            rejected_quota: self.rejected_quota.get(),
            rejected_unavailable: self.rejected_unavailable.get(),
            credit_overdrafts: self.credit_overdrafts.get(),
            write_behind_dropped: self.write_behind_dropped.get(),
            write_behind_failed: self.write_behind_failed.get(),
            credits_reconciled: self.credits_reconciled.get(),
            reconcile_failures: self.reconcile_failures.get(),
            events_consumed: self.events_consumed.get(),
            events_persisted: self.events_persisted.get(),
            batches_flushed: self.batches_flushed.get(),
            batches_failed: self.batches_failed.get(),
            events_dead_lettered: self.events_dead_lettered.get(),
            dead_letter_publish_failures: self.dead_letter_publish_failures.get(),
            events_replayed: self.events_replayed.get(),
            buffer_size: self.buffer_size.get(),
            failure_rate: self.failure_rate(),
            admission_latency_mean_ms: self.admission_latency_ms.mean_ms(),
            persist_latency_mean_ms: self.persist_latency_ms.mean_ms(),
        }
    }

    /// Processing summary, healthy while the failure rate stays under `threshold`.
    pub fn pipeline_status(&self, threshold: f64) -> PipelineStatus {
        let failure_rate = self.failure_rate();
        PipelineStatus {
            healthy: failure_rate < threshold,
            total_events_processed: self.events_persisted.get(),
            total_batches_processed: self.batches_flushed.get(),
            total_failed_batches: self.batches_failed.get(),
            current_buffer_size: self.buffer_size.get(),
            last_processing_time_ms: self
                .last_flush
                .get()
                .map(|_| self.last_processing_ms.get()),
            failure_rate,
            dead_lettered: self.events_dead_lettered.get(),
            dead_letter_publish_failures: self.dead_letter_publish_failures.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_received: u64,
    pub events_accepted: u64,
    pub rejected_validation: u64,
    pub rejected_auth: u64,
    pub rejected_quota: u64,
    pub rejected_unavailable: u64,
    pub credit_overdrafts: u64,
    pub write_behind_dropped: u64,
    pub write_behind_failed: u64,
    pub credits_reconciled: u64,
    pub reconcile_failures: u64,
    pub events_consumed: u64,
    pub events_persisted: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub events_dead_lettered: u64,
    pub dead_letter_publish_failures: u64,
    pub events_replayed: u64,
    pub buffer_size: u64,
    pub failure_rate: f64,
    pub admission_latency_mean_ms: f64,
    pub persist_latency_mean_ms: f64,
}

/// Pipeline processing summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub healthy: bool,
    pub total_events_processed: u64,
    pub total_batches_processed: u64,
    pub total_failed_batches: u64,
    pub current_buffer_size: u64,
    /// Duration of the last drain; `None` until one has run.
    pub last_processing_time_ms: Option<u64>,
    pub failure_rate: f64,
    pub dead_lettered: u64,
    pub dead_letter_publish_failures: u64,
}
