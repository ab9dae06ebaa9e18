//! Credit accounting types shared by the ledger client and the cache.

use serde::{Deserialize, Serialize};

/// An application's credit limit and usage for the current period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditInfo {
    pub credit_limit: i64,
    #[serde(alias = "creditUtilization")]
    pub credits_used: i64,
}

impl CreditInfo {
    pub fn new(credit_limit: i64, credits_used: i64) -> Self {
        Self {
            credit_limit,
            credits_used,
        }
    }

    /// Whether at least one more credit can be consumed.
    pub fn has_headroom(&self) -> bool {
        self.credits_used < self.credit_limit
    }

    pub fn remaining(&self) -> i64 {
        (self.credit_limit - self.credits_used).max(0)
    }
}

/// Result of an atomic check-and-increment against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Both counters were incremented; carries the new usage.
    Charged { used: i64, limit: i64 },
    /// Usage already reached the limit; nothing changed.
    Exhausted { used: i64, limit: i64 },
    /// Limit or usage is not cached; nothing changed.
    Missing,
}
