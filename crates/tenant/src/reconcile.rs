//! Flushes cached usage deltas into the durable ledger.

use std::sync::Arc;

use cache::{keys, CounterCache};
use engine_core::Result;
use telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rpc::LedgerRpc;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub flushed_apps: usize,
    /// Settled delta keys removed.
    pub pruned: usize,
    pub credits_flushed: i64,
    pub failures: usize,
}

pub struct CreditReconciler {
    cache: Arc<dyn CounterCache>,
    ledger: Arc<dyn LedgerRpc>,
    metrics: Arc<Metrics>,
}

impl CreditReconciler {
    pub fn new(cache: Arc<dyn CounterCache>, ledger: Arc<dyn LedgerRpc>, metrics: Arc<Metrics>) -> Self {
        Self {
            cache,
            ledger,
            metrics,
        }
    }

    /// Report every non-zero delta to the ledger. A delta is decremented by
    /// exactly the amount reported, and only after the ledger accepted it, so
    /// increments that land during the call are kept for the next pass. Keys
    /// left at zero are deleted, so idle applications drop out of the scan.
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        self.metrics.reconcile_runs.inc();
        let delta_keys = self.cache.scan_prefix(keys::CREDIT_DELTA_PREFIX).await?;
        let mut report = ReconcileReport {
            scanned: delta_keys.len(),
            ..Default::default()
        };

        for key in delta_keys {
            let Some(app_id) = keys::app_id_from_delta(&key).and_then(|id| Uuid::parse_str(id).ok())
            else {
                warn!(key = %key, "Skipping delta key with invalid application id");
                continue;
            };

            let delta = match self.cache.get_ints(std::slice::from_ref(&key)).await {
                Ok(values) => values.first().copied().flatten().unwrap_or(0),
                Err(e) => {
                    warn!(%app_id, error = %e, "Failed to read credit delta");
                    report.failures += 1;
                    continue;
                }
            };
            if delta == 0 {
                self.prune(&key, &mut report).await;
                continue;
            }
            if delta < 0 {
                continue;
            }

            if let Err(e) = self.ledger.increment_credits(app_id, delta).await {
                warn!(%app_id, delta, error = %e, "Ledger rejected credit delta; will retry next pass");
                report.failures += 1;
                continue;
            }

            match self.cache.decr_by(&key, delta).await {
                Ok(remaining) => {
                    debug!(%app_id, delta, remaining, "Credit delta reconciled");
                    report.flushed_apps += 1;
                    report.credits_flushed += delta;
                    if remaining == 0 {
                        self.prune(&key, &mut report).await;
                    }
                }
                Err(e) => {
                    // The ledger already has these credits; the next pass reports them again.
                    warn!(%app_id, delta, error = %e, "Failed to decrement delta after ledger accepted it");
                    report.failures += 1;
                }
            }
        }

        self.metrics.credits_reconciled.inc_by(report.credits_flushed.max(0) as u64);
        if report.failures > 0 {
            self.metrics.reconcile_failures.inc_by(report.failures as u64);
        }
        if report.flushed_apps > 0 || report.failures > 0 {
            info!(
                flushed_apps = report.flushed_apps,
                credits = report.credits_flushed,
                failures = report.failures,
                "Credit reconciliation pass complete"
            );
        }
        Ok(report)
    }

    async fn prune(&self, key: &str, report: &mut ReconcileReport) {
        match self.cache.delete_if_zero(key).await {
            Ok(true) => report.pruned += 1,
            Ok(false) => {}
            Err(e) => debug!(key = %key, error = %e, "Failed to prune settled delta key"),
        }
    }
}
