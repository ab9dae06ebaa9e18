//! The counter cache seam.

use async_trait::async_trait;
use engine_core::{IncrementOutcome, Result};

use crate::keys::CreditKeys;

/// Shared key-value store holding identity bindings and credit counters.
///
/// Every method fails with a `CACHE_001` error when the cache is unreachable
/// or a command exceeds its deadline.
#[async_trait]
pub trait CounterCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read integer counters. Missing or non-numeric keys read as `None`.
    async fn get_ints(&self, keys: &[String]) -> Result<Vec<Option<i64>>>;

    async fn set_int(&self, key: &str, value: i64) -> Result<()>;

    /// Set `key` only if it does not exist. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool>;

    /// Atomically add `delta`, creating the key at zero. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomically subtract `delta`. Returns the new value.
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64>;

    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Delete `key` only if it holds zero, in one atomic step. Returns whether
    /// it was deleted.
    async fn delete_if_zero(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// If usage is below the limit, add one to usage and to the delta in a
    /// single atomic step. Nothing changes when either counter is missing.
    async fn check_and_increment(&self, keys: &CreditKeys) -> Result<IncrementOutcome>;

    /// Add one to usage and to the delta atomically, ignoring the limit.
    async fn charge(&self, keys: &CreditKeys) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
