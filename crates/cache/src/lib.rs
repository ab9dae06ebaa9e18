//! Shared counter cache for identity bindings and credit counters.

pub mod config;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod writeback;

use std::sync::Arc;

pub use config::{CacheBackend, CacheConfig};
pub use keys::CreditKeys;
pub use memory::MemoryCache;
pub use redis_store::RedisCache;
pub use store::CounterCache;
pub use writeback::WriteBehind;

/// Build the configured cache backend.
pub async fn connect(config: &CacheConfig) -> engine_core::Result<Arc<dyn CounterCache>> {
    match config.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisCache::connect(config).await?)),
        CacheBackend::Memory => {
            tracing::warn!("Using in-memory cache; credit counters are not shared across instances");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}
