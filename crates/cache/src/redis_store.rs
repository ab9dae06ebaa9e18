//! Redis cache backend.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use engine_core::{with_deadline, Dependency, Error, IncrementOutcome, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use tracing::info;

use crate::config::CacheConfig;
use crate::keys::CreditKeys;
use crate::store::CounterCache;

const SCAN_BATCH: usize = 500;

/// KEYS: limit, usage, delta. Returns {status, used, limit}; status is
/// 1 charged, 0 exhausted, -1 missing.
static CHECK_AND_INCREMENT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local limit = redis.call('GET', KEYS[1])
local used = redis.call('GET', KEYS[2])
if not limit or not used then
  return {-1, 0, 0}
end
limit = tonumber(limit)
used = tonumber(used)
if used >= limit then
  return {0, used, limit}
end
used = redis.call('INCRBY', KEYS[2], 1)
redis.call('INCRBY', KEYS[3], 1)
return {1, used, limit}
"#,
    )
});

/// KEYS: counter. Deletes it when it reads zero; returns 1 if deleted.
static DELETE_IF_ZERO: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local value = redis.call('GET', KEYS[1])
if value and tonumber(value) == 0 then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
"#,
    )
});

fn cache_err(e: RedisError) -> Error {
    Error::cache(format!("redis: {e}"))
}

/// Redis-backed cache. The connection manager reconnects on its own; every
/// command runs under the configured deadline.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(cache_err)?;
        let conn = with_deadline(
            Dependency::Cache,
            "connect",
            config.op_timeout().max(Duration::from_secs(5)),
            async { client.get_connection_manager().await.map_err(cache_err) },
        )
        .await?;

        info!(url = %redact(&config.url), "Connected to Redis");

        Ok(Self {
            conn,
            op_timeout: config.op_timeout(),
        })
    }

    async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, RedisError>>,
    {
        with_deadline(Dependency::Cache, operation, self.op_timeout, async {
            fut.await.map_err(cache_err)
        })
        .await
    }
}

/// Hide credentials in a redis URL for logging.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &url[..scheme], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl CounterCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.run("get", async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.run("set", async move { conn.set(key, value).await }).await
    }

    async fn get_ints(&self, keys: &[String]) -> Result<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<Option<String>> = self
            .run("mget", async move {
                redis::cmd("MGET").arg(keys).query_async(&mut conn).await
            })
            .await?;
        Ok(raw
            .into_iter()
            .map(|v| v.and_then(|s| s.parse().ok()))
            .collect())
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        self.run("set", async move { conn.set(key, value).await }).await
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        self.run("setnx", async move { conn.set_nx(key, value).await })
            .await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        self.run("incrby", async move { conn.incr(key, delta).await })
            .await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        self.run("decrby", async move { conn.decr(key, delta).await })
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        self.run("del", async move { conn.del(keys).await }).await
    }

    async fn delete_if_zero(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .run("delete_if_zero", async move {
                DELETE_IF_ZERO.key(key).invoke_async(&mut conn).await
            })
            .await?;
        Ok(deleted == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut conn = self.conn.clone();
            let (next, batch): (u64, Vec<String>) = self
                .run("scan", async {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn check_and_increment(&self, keys: &CreditKeys) -> Result<IncrementOutcome> {
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .run("check_and_increment", async move {
                CHECK_AND_INCREMENT
                    .key(&keys.limit)
                    .key(&keys.usage)
                    .key(&keys.delta)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        match reply.as_slice() {
            [1, used, limit] => Ok(IncrementOutcome::Charged {
                used: *used,
                limit: *limit,
            }),
            [0, used, limit] => Ok(IncrementOutcome::Exhausted {
                used: *used,
                limit: *limit,
            }),
            [-1, ..] => Ok(IncrementOutcome::Missing),
            other => Err(Error::cache(format!(
                "unexpected check_and_increment reply: {other:?}"
            ))),
        }
    }

    async fn charge(&self, keys: &CreditKeys) -> Result<()> {
        let mut conn = self.conn.clone();
        self.run("charge", async move {
            redis::pipe()
                .atomic()
                .incr(&keys.usage, 1)
                .ignore()
                .incr(&keys.delta, 1)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run("ping", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
