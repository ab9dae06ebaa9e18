//! Two-tier credit accounting.
//!
//! The shared cache holds three counters per application (limit, usage, and
//! the delta not yet reported to the durable ledger). Reads are cache-first;
//! a miss fetches limit and usage from the ledger in one call. Every failure
//! to reach either tier denies the request.

use std::sync::Arc;

use cache::{CounterCache, CreditKeys, WriteBehind};
use engine_core::{
    retry_with_backoff, CreditInfo, Error, IncrementOutcome, Result, RetryPolicy,
};
use telemetry::Metrics;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::rpc::LedgerRpc;

pub struct CreditLedger {
    cache: Arc<dyn CounterCache>,
    ledger: Arc<dyn LedgerRpc>,
    write_behind: Arc<WriteBehind>,
    metrics: Arc<Metrics>,
    deferred_charge_policy: RetryPolicy,
}

impl CreditLedger {
    pub fn new(
        cache: Arc<dyn CounterCache>,
        ledger: Arc<dyn LedgerRpc>,
        write_behind: Arc<WriteBehind>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            ledger,
            write_behind,
            metrics,
            deferred_charge_policy: RetryPolicy::default(),
        }
    }

    pub fn with_deferred_charge_attempts(mut self, attempts: u32) -> Self {
        self.deferred_charge_policy.max_attempts = attempts;
        self
    }

    pub async fn get_limit(&self, app_id: Uuid) -> Result<i64> {
        Ok(self.get_credit_info(app_id).await?.credit_limit)
    }

    pub async fn get_usage(&self, app_id: Uuid) -> Result<i64> {
        Ok(self.get_credit_info(app_id).await?.credits_used)
    }

    /// Limit and usage, cache-first. On a miss both counters are fetched
    /// from the ledger together and seeded before returning, so the charge
    /// that follows an admission finds them.
    pub async fn get_credit_info(&self, app_id: Uuid) -> Result<CreditInfo> {
        let keys = CreditKeys::for_app(app_id);
        if let Some(info) = self.cached(&keys).await? {
            return Ok(info);
        }

        let info = self.fetch(app_id).await?;
        seed(self.cache.as_ref(), &keys, info).await?;
        Ok(info)
    }

    /// Read-only admission check. Fails with `QUOTA_001` when no credit is left.
    pub async fn check_quota(&self, app_id: Uuid) -> Result<CreditInfo> {
        let info = self.get_credit_info(app_id).await?;
        if !info.has_headroom() {
            return Err(Error::quota_exceeded(app_id, info.credit_limit, info.credits_used));
        }
        Ok(info)
    }

    /// Consume one credit if usage is below the limit. Usage and delta move
    /// together in one atomic cache step; nothing changes on failure.
    pub async fn check_and_increment(&self, app_id: Uuid) -> Result<i64> {
        let keys = CreditKeys::for_app(app_id);

        let outcome = match self.cache.check_and_increment(&keys).await? {
            IncrementOutcome::Missing => {
                let info = self.fetch(app_id).await?;
                seed(self.cache.as_ref(), &keys, info).await?;
                self.cache.check_and_increment(&keys).await?
            }
            outcome => outcome,
        };

        match outcome {
            IncrementOutcome::Charged { used, .. } => Ok(used),
            IncrementOutcome::Exhausted { used, limit } => {
                Err(Error::quota_exceeded(app_id, limit, used))
            }
            IncrementOutcome::Missing => Err(Error::cache(format!(
                "credit counters for {app_id} missing after seeding"
            ))),
        }
    }

    /// Consume one credit regardless of the limit.
    pub async fn charge(&self, app_id: Uuid) -> Result<()> {
        self.cache.charge(&CreditKeys::for_app(app_id)).await
    }

    /// Charge for an event that is already on the transport. If the cache
    /// refuses, the charge is retried from the write-behind pool.
    pub async fn charge_accepted(&self, app_id: Uuid) {
        match self.check_and_increment(app_id).await {
            Ok(used) => debug!(%app_id, used, "Credit charged"),
            Err(Error::QuotaExceeded { limit, used, .. }) => {
                self.metrics.credit_overdrafts.inc();
                warn!(%app_id, limit, used, "Lost race for last credit after publish; charging anyway");
                if let Err(e) = self.charge(app_id).await {
                    self.defer_charge(app_id, e);
                }
            }
            Err(e) => self.defer_charge(app_id, e),
        }
    }

    fn defer_charge(&self, app_id: Uuid, cause: Error) {
        warn!(%app_id, error = %cause, "Charge failed on request path; deferring");
        let cache = self.cache.clone();
        let policy = self.deferred_charge_policy;
        let submitted = self.write_behind.submit("deferred_charge", async move {
            let keys = CreditKeys::for_app(app_id);
            retry_with_backoff(
                || cache.charge(&keys),
                &policy,
                |e: &Error| e.is_retryable(),
                "deferred_charge",
            )
            .await
        });
        if !submitted {
            error!(%app_id, "Deferred charge dropped; one accepted event is uncharged");
        }
    }

    async fn cached(&self, keys: &CreditKeys) -> Result<Option<CreditInfo>> {
        let values = self
            .cache
            .get_ints(&[keys.limit.clone(), keys.usage.clone()])
            .await?;
        match values.as_slice() {
            [Some(limit), Some(used)] => Ok(Some(CreditInfo::new(*limit, *used))),
            _ => Ok(None),
        }
    }

    async fn fetch(&self, app_id: Uuid) -> Result<CreditInfo> {
        debug!(%app_id, "Credit cache miss, fetching from ledger");
        self.ledger.get_credit_info(app_id).await.map_err(|e| {
            warn!(%app_id, error = %e, "Ledger fetch failed; denying");
            e
        })
    }
}

/// Write limit and usage without overwriting counters that already exist.
async fn seed(cache: &dyn CounterCache, keys: &CreditKeys, info: CreditInfo) -> Result<()> {
    cache.set_if_absent(&keys.limit, info.credit_limit).await?;
    cache.set_if_absent(&keys.usage, info.credits_used).await?;
    Ok(())
}
