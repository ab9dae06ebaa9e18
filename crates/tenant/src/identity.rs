//! API key to application binding, cached in two tiers.
//!
//! Lookup order: process-local moka cache, shared cache (`apikey:<key>`),
//! then the identity RPC. A binding learned from the RPC is written to both
//! tiers only after it matched the caller's claim, and the shared-cache write
//! goes through the write-behind pool.

use std::sync::Arc;

use cache::{keys, CounterCache, WriteBehind};
use engine_core::error::AuthErrorCode;
use engine_core::{Error, ParsedApiKey, Result};
use moka::future::Cache;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TenantConfig;
use crate::rpc::IdentityRpc;

pub struct IdentityCache {
    local: Cache<ParsedApiKey, Uuid>,
    cache: Arc<dyn CounterCache>,
    rpc: Arc<dyn IdentityRpc>,
    write_behind: Arc<WriteBehind>,
}

impl IdentityCache {
    pub fn new(
        config: &TenantConfig,
        cache: Arc<dyn CounterCache>,
        rpc: Arc<dyn IdentityRpc>,
        write_behind: Arc<WriteBehind>,
    ) -> Self {
        Self {
            local: Cache::builder()
                .max_capacity(config.identity_capacity)
                .time_to_live(config.identity_ttl())
                .build(),
            cache,
            rpc,
            write_behind,
        }
    }

    /// Succeeds when `api_key` is bound to `claimed_app_id`.
    pub async fn authenticate(&self, api_key: &ParsedApiKey, claimed_app_id: Uuid) -> Result<()> {
        if let Some(bound) = self.local.get(api_key).await {
            return check_binding(bound, claimed_app_id);
        }

        let cache_key = keys::api_key(api_key);
        if let Some(raw) = self.cache.get(&cache_key).await? {
            match Uuid::parse_str(&raw) {
                Ok(bound) => {
                    debug!("Identity cache hit");
                    check_binding(bound, claimed_app_id)?;
                    self.local.insert(*api_key, bound).await;
                    return Ok(());
                }
                Err(_) => warn!(key = %cache_key, "Ignoring malformed identity binding in cache"),
            }
        }

        debug!("Identity cache miss");
        let resolved = self.rpc.resolve_application_id(api_key).await?;
        let bound = match resolved {
            Some(bound) => bound,
            None => {
                info!(app_id = %claimed_app_id, "API key is not bound to any application");
                return Err(mismatch());
            }
        };
        check_binding(bound, claimed_app_id)?;

        self.local.insert(*api_key, bound).await;
        let cache = self.cache.clone();
        let value = bound.to_string();
        self.write_behind.submit("identity_binding", async move {
            cache.set(&cache_key, &value).await
        });
        Ok(())
    }

    /// Drop the process-local binding for a key.
    pub async fn invalidate(&self, api_key: &ParsedApiKey) {
        self.local.invalidate(api_key).await;
    }
}

fn check_binding(bound: Uuid, claimed: Uuid) -> Result<()> {
    if bound == claimed {
        Ok(())
    } else {
        info!(claimed_app_id = %claimed, "API key bound to a different application");
        Err(mismatch())
    }
}

fn mismatch() -> Error {
    Error::auth(
        AuthErrorCode::ApplicationMismatch,
        "API key is not valid for this application",
    )
}
