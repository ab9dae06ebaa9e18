//! Bounded pool for fire-and-forget cache writes.
//!
//! Writes that must not delay the request path (identity bindings, credit
//! seeding, deferred charges) are submitted here. When every slot is taken
//! the write is dropped with a warning and counted, never queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use engine_core::Result;
use telemetry::Metrics;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub struct WriteBehind {
    permits: Arc<Semaphore>,
    capacity: u32,
    metrics: Arc<Metrics>,
}

impl WriteBehind {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize)) as u32;
        Self {
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            metrics,
        }
    }

    /// Run `task` in the background. Returns false if it was dropped.
    pub fn submit<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.write_behind_dropped.inc();
                warn!(task = label, "Write-behind pool saturated, dropping write");
                return false;
            }
        };

        self.metrics.write_behind_submitted.inc();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match task.await {
                Ok(()) => debug!(task = label, "Write-behind task completed"),
                Err(e) => {
                    metrics.write_behind_failed.inc();
                    warn!(task = label, error = %e, "Write-behind task failed");
                }
            }
        });
        true
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity as usize - self.permits.available_permits()
    }

    /// Stop accepting work and wait up to `deadline` for running tasks.
    /// Returns false if tasks were still running at the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        let acquired = tokio::time::timeout(deadline, self.permits.acquire_many(self.capacity)).await;
        self.permits.close();
        let drained = matches!(acquired, Ok(Ok(_)));

        if drained {
            info!("Write-behind pool drained");
        } else {
            warn!(
                in_flight = self.in_flight(),
                "Write-behind pool shutdown deadline reached with tasks still running"
            );
        }
        drained
    }
}
