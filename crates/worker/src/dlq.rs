//! Dead-letter reprocessor.
//!
//! Consumption from the dead-letter topic is pulsed: each activation replays
//! records up to the high watermark seen when it started, for at most one
//! window, then stops until the next pulse. Records that fail again are
//! republished with an updated reason and picked up by a later pulse.

use std::sync::Arc;
use std::time::Duration;

use engine_core::{DlqRecord, Envelope, Result};
use redpanda::{ConsumedRecord, TopicSource};
use telemetry::Metrics;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::writer::BatchWriter;

/// Outcome of one replay activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records consumed from the dead-letter topic
    pub consumed: usize,
    pub persisted: usize,
    /// Records republished after failing again
    pub requeued: usize,
    /// True when the window closed before reaching the target offset
    pub window_exhausted: bool,
}

pub struct DeadLetterReprocessor {
    source: Arc<dyn TopicSource<DlqRecord>>,
    writer: Arc<BatchWriter>,
    metrics: Arc<Metrics>,
    window: Duration,
}

impl DeadLetterReprocessor {
    pub fn new(
        source: Arc<dyn TopicSource<DlqRecord>>,
        writer: Arc<BatchWriter>,
        metrics: Arc<Metrics>,
        window: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            metrics,
            window,
        }
    }

    /// Replay dead letters for one activation window.
    pub async fn trigger_replay(&self) -> Result<ReplayReport> {
        self.metrics.replay_runs.inc();
        let mut report = ReplayReport::default();

        // Records read but not committed by an earlier pulse are read again.
        self.source.rewind().await;

        // Stop at what existed on activation, so records requeued by this
        // run wait for the next pulse.
        let target = self.source.high_watermark().await?;
        let deadline = Instant::now() + self.window;

        loop {
            if self.source.position().is_some_and(|position| position >= target) {
                break;
            }
            if Instant::now() >= deadline {
                report.window_exhausted = true;
                break;
            }

            let batch = match tokio::time::timeout_at(deadline, self.source.fetch()).await {
                Ok(batch) => batch?,
                Err(_) => {
                    report.window_exhausted = true;
                    break;
                }
            };

            let records: Vec<ConsumedRecord<DlqRecord>> = batch
                .records
                .into_iter()
                .filter(|r| r.offset < target)
                .collect();
            let Some(next_offset) = batch.next_offset else {
                // Nothing arrived within the fetch wait
                continue;
            };

            report.consumed += records.len();
            let records: Vec<DlqRecord> = records.into_iter().map(|r| r.value).collect();
            if !self.replay(records, &mut report).await {
                // Requeue failed: leave the position so these records are read again.
                break;
            }
            self.source.commit(next_offset.min(target)).await?;
        }

        if report.consumed > 0 {
            info!(
                consumed = report.consumed,
                persisted = report.persisted,
                requeued = report.requeued,
                window_exhausted = report.window_exhausted,
                "Dead-letter replay finished"
            );
        } else {
            debug!("No dead letters to replay");
        }
        Ok(report)
    }

    /// Persist records in writer-sized batches. Returns false if a failed
    /// batch could not be requeued.
    async fn replay(&self, records: Vec<DlqRecord>, report: &mut ReplayReport) -> bool {
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            let chunk: Vec<DlqRecord> = records.by_ref().take(self.writer.max_batch_size()).collect();
            let envelopes: Vec<Envelope> = chunk.iter().map(|r| r.event.clone()).collect();

            match self.writer.persist(&envelopes).await {
                Ok(()) => {
                    self.metrics.events_replayed.inc_by(chunk.len() as u64);
                    report.persisted += chunk.len();
                }
                Err(e) => {
                    self.metrics.replay_failures.inc();
                    warn!(count = chunk.len(), error = %e, "Replay persist failed, requeueing");
                    let count = chunk.len();
                    let retried = chunk
                        .into_iter()
                        .map(|record| record.retry_failed(e.to_string()))
                        .collect();
                    if !self.writer.dead_letter(retried).await {
                        return false;
                    }
                    report.requeued += count;
                }
            }
        }
        true
    }
}
