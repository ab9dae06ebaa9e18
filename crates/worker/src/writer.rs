//! Batch writer: drains the event buffer into the store, with bounded retry
//! and a dead-letter path for batches that exhaust it.

use std::sync::Arc;
use std::time::Instant;

use clickhouse_client::EventStore;
use engine_core::{retry_with_backoff, DlqRecord, Envelope, Error, Result, RetryPolicy};
use redpanda::DeadLetterPublisher;
use telemetry::Metrics;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::buffer::EventBuffer;
use crate::config::PipelineConfig;

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches: usize,
    pub persisted: usize,
    pub dead_lettered: usize,
    /// Envelopes lost because the dead-letter publish failed too
    pub lost: usize,
}

impl FlushReport {
    fn absorb(&mut self, other: FlushReport) {
        self.batches += other.batches;
        self.persisted += other.persisted;
        self.dead_lettered += other.dead_lettered;
        self.lost += other.lost;
    }
}

pub struct BatchWriter {
    buffer: Arc<EventBuffer>,
    store: Arc<dyn EventStore>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    metrics: Arc<Metrics>,
    max_batch_size: usize,
    retry_policy: RetryPolicy,
    flush_lock: Mutex<()>,
}

impl BatchWriter {
    pub fn new(
        config: &PipelineConfig,
        buffer: Arc<EventBuffer>,
        store: Arc<dyn EventStore>,
        dead_letters: Arc<dyn DeadLetterPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            buffer,
            store,
            dead_letters,
            metrics,
            max_batch_size: config.max_batch_size.max(1),
            retry_policy: config.retry_policy(),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Buffer one envelope, flushing out of band once the high-water mark is hit.
    pub async fn append(&self, envelope: Envelope) {
        self.metrics.events_consumed.inc();
        self.buffer.add(envelope);
        self.after_append().await;
    }

    pub async fn append_all(&self, envelopes: Vec<Envelope>) {
        self.metrics.events_consumed.inc_by(envelopes.len() as u64);
        self.buffer.add_all(envelopes);
        self.after_append().await;
    }

    async fn after_append(&self) {
        self.metrics.buffer_size.set(self.buffer.size() as u64);
        if self.buffer.should_flush() {
            debug!(buffer_size = self.buffer.size(), "Buffer reached high-water mark");
            self.scheduled_flush().await;
        }
    }

    /// Timer entry point. Returns `None` without waiting if a flush is already running.
    pub async fn scheduled_flush(&self) -> Option<FlushReport> {
        let _guard = self.flush_lock.try_lock().ok()?;
        Some(self.drain().await)
    }

    /// Wait for any running flush, then drain the buffer completely. Every
    /// envelope buffered before the call is persisted or dead-lettered on return.
    pub async fn flush(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;
        self.drain().await
    }

    async fn drain(&self) -> FlushReport {
        let mut report = FlushReport::default();
        if self.buffer.is_empty() {
            return report;
        }

        let start = Instant::now();
        loop {
            let batch = self.buffer.drain_up_to(self.max_batch_size);
            self.metrics.buffer_size.set(self.buffer.size() as u64);
            if batch.is_empty() {
                break;
            }
            report.absorb(self.write_batch(batch).await);
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.last_processing_ms.set(elapsed_ms);
        self.metrics.last_flush.touch();
        if report.batches > 0 {
            info!(
                batches = report.batches,
                persisted = report.persisted,
                dead_lettered = report.dead_lettered,
                lost = report.lost,
                "Flushed event buffer"
            );
        }
        report
    }

    async fn write_batch(&self, batch: Vec<Envelope>) -> FlushReport {
        let batch_size = batch.len();
        let mut report = FlushReport {
            batches: 1,
            ..FlushReport::default()
        };

        self.metrics.batches_flushed.inc();
        match self.persist(&batch).await {
            Ok(()) => {
                self.metrics.events_persisted.inc_by(batch_size as u64);
                report.persisted = batch_size;
            }
            Err(e) => {
                self.metrics.batches_failed.inc();
                error!(batch_size, error = %e, "Failed to persist batch after retries");
                let records = batch
                    .into_iter()
                    .map(|envelope| DlqRecord::new(envelope, e.to_string()))
                    .collect();
                if self.dead_letter(records).await {
                    report.dead_lettered = batch_size;
                } else {
                    report.lost = batch_size;
                }
            }
        }
        report
    }

    /// Persist one batch, retrying transient store failures with backoff.
    pub async fn persist(&self, batch: &[Envelope]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let mut attempts: u64 = 0;
        let result = retry_with_backoff(
            || {
                attempts += 1;
                self.store.insert_batch(batch)
            },
            &self.retry_policy,
            Error::is_transient,
            "persist batch",
        )
        .await;

        self.metrics.persist_retries.inc_by(attempts.saturating_sub(1));
        if result.is_ok() {
            self.metrics.persist_latency_ms.observe(start.elapsed());
            debug!(
                batch_size = batch.len(),
                attempts,
                latency_ms = %start.elapsed().as_millis(),
                "Persisted batch"
            );
        }
        result
    }

    /// Publish records to the dead-letter topic. A failure here is where data
    /// is lost: it is logged with every affected event id and counted.
    pub async fn dead_letter(&self, records: Vec<DlqRecord>) -> bool {
        if records.is_empty() {
            return true;
        }

        match self.dead_letters.publish_dead_letters(&records).await {
            Ok(()) => {
                self.metrics.events_dead_lettered.inc_by(records.len() as u64);
                warn!(count = records.len(), "Dead-lettered events");
                true
            }
            Err(e) => {
                self.metrics.dead_letter_publish_failures.inc();
                let event_ids: Vec<Uuid> = records.iter().map(|r| r.event.id).collect();
                error!(
                    count = records.len(),
                    event_ids = ?event_ids,
                    error = %e,
                    "Dead-letter publish failed, events lost"
                );
                false
            }
        }
    }
}
