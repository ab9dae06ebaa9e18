//! Process-local cache backend.

use std::collections::HashMap;

use async_trait::async_trait;
use engine_core::{Error, IncrementOutcome, Result};
use parking_lot::Mutex;

use crate::keys::CreditKeys;
use crate::store::CounterCache;

/// In-memory cache. Every operation holds one lock, so compound operations
/// are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn parse_int(key: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| Error::cache(format!("value at {key} is not an integer")))
}

fn add(entries: &mut HashMap<String, String>, key: &str, delta: i64) -> Result<i64> {
    let current = match entries.get(key) {
        Some(raw) => parse_int(key, raw)?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| Error::cache(format!("increment would overflow {key}")))?;
    entries.insert(key.to_string(), next.to_string());
    Ok(next)
}

#[async_trait]
impl CounterCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_ints(&self, keys: &[String]) -> Result<Vec<Option<i64>>> {
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|k| entries.get(k).and_then(|v| v.parse().ok()))
            .collect())
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        add(&mut self.entries.lock(), key, delta)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        add(&mut self.entries.lock(), key, -delta)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.lock();
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count() as u64)
    }

    async fn delete_if_zero(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(raw) if parse_int(key, raw)? == 0 => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn check_and_increment(&self, keys: &CreditKeys) -> Result<IncrementOutcome> {
        let mut entries = self.entries.lock();
        let (Some(limit), Some(used)) = (entries.get(&keys.limit), entries.get(&keys.usage)) else {
            return Ok(IncrementOutcome::Missing);
        };
        let limit = parse_int(&keys.limit, limit)?;
        let used = parse_int(&keys.usage, used)?;
        if used >= limit {
            return Ok(IncrementOutcome::Exhausted { used, limit });
        }
        let used = add(&mut entries, &keys.usage, 1)?;
        add(&mut entries, &keys.delta, 1)?;
        Ok(IncrementOutcome::Charged { used, limit })
    }

    async fn charge(&self, keys: &CreditKeys) -> Result<()> {
        let mut entries = self.entries.lock();
        add(&mut entries, &keys.usage, 1)?;
        add(&mut entries, &keys.delta, 1)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
