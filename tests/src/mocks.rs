//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cache::{CounterCache, CreditKeys, MemoryCache};
use clickhouse_client::EventStore;
use engine_core::{
    CreditInfo, DlqRecord, Envelope, Error, IncrementOutcome, ParsedApiKey, Result, StoreFailure,
};
use parking_lot::Mutex;
use redpanda::{ConsumedRecord, DeadLetterPublisher, EventPublisher, FetchedBatch, TopicSource};
use tenant_client::{IdentityRpc, LedgerRpc};
use uuid::Uuid;

/// Publisher that keeps both topics in memory.
#[derive(Default)]
pub struct MockPublisher {
    events: Mutex<Vec<Envelope>>,
    dead_letters: Mutex<Vec<DlqRecord>>,
    fail_events: AtomicBool,
    fail_dead_letters: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Envelope> {
        self.events.lock().clone()
    }

    pub fn dead_letters(&self) -> Vec<DlqRecord> {
        self.dead_letters.lock().clone()
    }

    /// Remove and return everything dead-lettered so far.
    pub fn take_dead_letters(&self) -> Vec<DlqRecord> {
        std::mem::take(&mut *self.dead_letters.lock())
    }

    pub fn set_fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_dead_letters(&self, fail: bool) {
        self.fail_dead_letters.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(Error::transport("mock broker unavailable"));
        }
        self.events.lock().push(envelope.clone());
        Ok(())
    }
}

#[async_trait]
impl DeadLetterPublisher for MockPublisher {
    async fn publish_dead_letters(&self, records: &[DlqRecord]) -> Result<()> {
        if self.fail_dead_letters.load(Ordering::SeqCst) {
            return Err(Error::transport("mock broker unavailable"));
        }
        self.dead_letters.lock().extend_from_slice(records);
        Ok(())
    }
}

/// Tenant service double: key bindings and a durable credit ledger.
#[derive(Default)]
pub struct MockTenant {
    bindings: Mutex<HashMap<ParsedApiKey, Uuid>>,
    credits: Mutex<HashMap<Uuid, CreditInfo>>,
    increments: Mutex<Vec<(Uuid, i64)>>,
    resolve_calls: AtomicUsize,
    identity_down: AtomicBool,
    ledger_down: AtomicBool,
}

impl MockTenant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, key: ParsedApiKey, app_id: Uuid) {
        self.bindings.lock().insert(key, app_id);
    }

    pub fn set_credits(&self, app_id: Uuid, limit: i64, used: i64) {
        self.credits.lock().insert(app_id, CreditInfo::new(limit, used));
    }

    pub fn credits(&self, app_id: Uuid) -> CreditInfo {
        self.credits.lock().get(&app_id).copied().unwrap_or_default()
    }

    /// Every `increment_credits` call the ledger accepted.
    pub fn increments(&self) -> Vec<(Uuid, i64)> {
        self.increments.lock().clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn set_identity_down(&self, down: bool) {
        self.identity_down.store(down, Ordering::SeqCst);
    }

    pub fn set_ledger_down(&self, down: bool) {
        self.ledger_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityRpc for MockTenant {
    async fn resolve_application_id(&self, api_key: &ParsedApiKey) -> Result<Option<Uuid>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.identity_down.load(Ordering::SeqCst) {
            return Err(Error::identity("mock identity service unavailable"));
        }
        Ok(self.bindings.lock().get(api_key).copied())
    }
}

#[async_trait]
impl LedgerRpc for MockTenant {
    async fn get_credit_info(&self, app_id: Uuid) -> Result<CreditInfo> {
        if self.ledger_down.load(Ordering::SeqCst) {
            return Err(Error::ledger("mock ledger unavailable"));
        }
        Ok(self.credits(app_id))
    }

    async fn increment_credits(&self, app_id: Uuid, amount: i64) -> Result<()> {
        if self.ledger_down.load(Ordering::SeqCst) {
            return Err(Error::ledger("mock ledger unavailable"));
        }
        self.credits.lock().entry(app_id).or_default().credits_used += amount;
        self.increments.lock().push((app_id, amount));
        Ok(())
    }
}

/// Cache double over a [`MemoryCache`] that can be switched off. While down,
/// every call fails with `CACHE_001` and the inner entries are untouched.
pub struct UnavailableCache {
    inner: Arc<MemoryCache>,
    down: AtomicBool,
}

impl UnavailableCache {
    pub fn new(inner: Arc<MemoryCache>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::cache("mock cache unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterCache for UnavailableCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn get_ints(&self, keys: &[String]) -> Result<Vec<Option<i64>>> {
        self.check()?;
        self.inner.get_ints(keys).await
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.check()?;
        self.inner.set_int(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool> {
        self.check()?;
        self.inner.set_if_absent(key, value).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.check()?;
        self.inner.incr_by(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.check()?;
        self.inner.decr_by(key, delta).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn delete_if_zero(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete_if_zero(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.scan_prefix(prefix).await
    }

    async fn check_and_increment(&self, keys: &CreditKeys) -> Result<IncrementOutcome> {
        self.check()?;
        self.inner.check_and_increment(keys).await
    }

    async fn charge(&self, keys: &CreditKeys) -> Result<()> {
        self.check()?;
        self.inner.charge(keys).await
    }

    async fn ping(&self) -> Result<()> {
        self.check()?;
        self.inner.ping().await
    }
}

/// Store double that keeps inserted rows in memory.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Envelope>>,
    failure: Mutex<Option<StoreFailure>>,
    attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Envelope> {
        self.rows.lock().clone()
    }

    /// Fail every insert with `failure` until cleared with `None`.
    pub fn set_failure(&self, failure: Option<StoreFailure>) {
        *self.failure.lock() = failure;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_batch(&self, events: &[Envelope]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.failure.lock() {
            return Err(Error::store(failure, "mock store refused insert"));
        }
        self.rows.lock().extend_from_slice(events);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        match *self.failure.lock() {
            Some(failure) => Err(Error::store(failure, "mock store unavailable")),
            None => Ok(()),
        }
    }
}

const IDLE_FETCH_WAIT: Duration = Duration::from_millis(10);

/// Single-partition topic with a read cursor and a committed position.
pub struct MemoryTopic<T> {
    log: Mutex<Vec<T>>,
    read: Mutex<i64>,
    committed: Mutex<i64>,
    fetch_size: usize,
}

impl<T: Clone> MemoryTopic<T> {
    pub fn new(fetch_size: usize) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            read: Mutex::new(0),
            committed: Mutex::new(0),
            fetch_size,
        }
    }

    pub fn push_all(&self, values: impl IntoIterator<Item = T>) {
        self.log.lock().extend(values);
    }

    pub fn committed(&self) -> i64 {
        *self.committed.lock()
    }

    fn read_next(&self) -> FetchedBatch<T> {
        let log = self.log.lock();
        let mut read = self.read.lock();
        let start = *read as usize;
        let end = (start + self.fetch_size).min(log.len());
        if start >= end {
            return FetchedBatch::empty(log.len() as i64);
        }

        *read = end as i64;
        FetchedBatch {
            records: (start..end)
                .map(|offset| ConsumedRecord {
                    offset: offset as i64,
                    value: log[offset].clone(),
                })
                .collect(),
            next_offset: Some(end as i64),
            high_watermark: log.len() as i64,
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> TopicSource<T> for MemoryTopic<T> {
    async fn fetch(&self) -> Result<FetchedBatch<T>> {
        let batch = self.read_next();
        if batch.next_offset.is_none() {
            // Stand-in for the broker's fetch wait
            tokio::time::sleep(IDLE_FETCH_WAIT).await;
        }
        Ok(batch)
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        let mut committed = self.committed.lock();
        *committed = (*committed).max(next_offset);
        let mut read = self.read.lock();
        *read = (*read).max(next_offset);
        Ok(())
    }

    async fn rewind(&self) {
        *self.read.lock() = *self.committed.lock();
    }

    async fn high_watermark(&self) -> Result<i64> {
        Ok(self.log.lock().len() as i64)
    }

    fn position(&self) -> Option<i64> {
        Some(*self.committed.lock())
    }
}
