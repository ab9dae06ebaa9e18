//! Consumer worker for reading envelopes from Redpanda into the batch writer.
//!
//! This worker implements the core data pipeline:
//! 1. Fetch a batch of envelopes from the event topic
//! 2. Append to the event buffer (the writer flushes at the high-water mark)
//! 3. Flush and commit the offset once the flush interval passes or the topic is idle
//! 4. Repeat
//!
//! The offset only moves after a flush, so delivery is at-least-once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use engine_core::{Envelope, Result};
use redpanda::TopicSource;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::writer::BatchWriter;

const ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Worker that consumes envelopes and feeds the batch writer.
pub struct ConsumerWorker {
    source: Arc<dyn TopicSource<Envelope>>,
    writer: Arc<BatchWriter>,
    flush_interval: Duration,
    pending_offset: Option<i64>,
    last_commit: Instant,
}

impl ConsumerWorker {
    pub fn new(
        source: Arc<dyn TopicSource<Envelope>>,
        writer: Arc<BatchWriter>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            flush_interval,
            pending_offset: None,
            last_commit: Instant::now(),
        }
    }

    /// Main run loop. Returns after a final flush and commit once shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Consumer worker starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Not raced against shutdown: a flush must never be cancelled halfway.
            // Fetches are bounded by the broker wait time.
            match self.process_once().await {
                Ok(count) if count > 0 => debug!(count, "Processed batch"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Batch processing error");
                    tokio::select! {
                        _ = tokio::time::sleep(ERROR_PAUSE) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        if let Err(e) = self.flush_and_commit().await {
            error!(error = %e, "Final commit failed");
        }
        info!("Consumer worker stopped");
    }

    /// Fetch once, buffer what arrived, and commit when due. Returns the
    /// number of envelopes buffered.
    pub async fn process_once(&mut self) -> Result<usize> {
        let batch = self.source.fetch().await?;
        let idle = batch.is_empty();
        let count = batch.records.len();

        if count > 0 {
            let envelopes = batch.records.into_iter().map(|r| r.value).collect();
            self.writer.append_all(envelopes).await;
        }
        if let Some(next) = batch.next_offset {
            self.pending_offset = Some(next);
        }

        if self.pending_offset.is_some()
            && (idle || self.last_commit.elapsed() >= self.flush_interval)
        {
            self.flush_and_commit().await?;
        }

        Ok(count)
    }

    async fn flush_and_commit(&mut self) -> Result<()> {
        let Some(offset) = self.pending_offset else {
            return Ok(());
        };
        self.writer.flush().await;
        self.source.commit(offset).await?;
        self.pending_offset = None;
        self.last_commit = Instant::now();
        Ok(())
    }
}
