//! Start-of-month reset of cached usage counters.
//!
//! Only the cached usage is cleared. Limits and unreconciled deltas stay;
//! the next admission refetches usage from the ledger, whose own period reset
//! is an administrative operation outside the gateway.

use std::sync::Arc;

use cache::{keys, CounterCache};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use engine_core::Result;
use telemetry::Metrics;
use tracing::info;

pub struct MonthlyReset {
    cache: Arc<dyn CounterCache>,
    metrics: Arc<Metrics>,
}

impl MonthlyReset {
    pub fn new(cache: Arc<dyn CounterCache>, metrics: Arc<Metrics>) -> Self {
        Self { cache, metrics }
    }

    /// Delete every cached usage counter. Returns how many were removed.
    pub async fn run_once(&self) -> Result<u64> {
        let usage_keys = self.cache.scan_prefix(keys::CREDIT_USAGE_PREFIX).await?;
        let removed = self.cache.delete(&usage_keys).await?;
        self.metrics.monthly_resets.inc();
        info!(removed, "Monthly credit usage reset complete");
        Ok(removed)
    }
}

/// Midnight UTC on the first day of the month after `now`.
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now + chrono::Duration::days(28))
}
