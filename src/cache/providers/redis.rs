//! Redis-backed distributed tier (feature `cache-redis`).
//!
//! Every command is bounded by an operation timeout so a stalled server
//! surfaces as [`CacheError::Timeout`] and counts against the cache breaker.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::{DistributedCacheClient, DistributedEntry};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(500);

/// Keys fetched per SCAN round trip during pattern deletes
const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisCacheClient {
    connection: ConnectionManager,
    operation_timeout: Duration,
    endpoint: String,
}

impl fmt::Debug for RedisCacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheClient")
            .field("endpoint", &self.endpoint)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCacheClient {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let endpoint = redact_url(url);
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::ConnectionError(format!("invalid Redis URL {endpoint}: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(format!("{endpoint}: {e}")))?;

        info!(endpoint = %endpoint, "Connected to Redis cache tier");
        Ok(Self {
            connection,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            endpoint,
        })
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    async fn bounded<T, Fut>(&self, command: &'static str, request: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_io_error() || e.is_connection_dropped() => {
                Err(CacheError::ConnectionError(format!("{command}: {e}")))
            }
            Ok(Err(e)) => Err(CacheError::BackendError(format!("{command}: {e}"))),
            Err(_) => Err(CacheError::Timeout(format!(
                "{command} exceeded {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl DistributedCacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<DistributedEntry>> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().get(key).pttl(key);
        let (value, pttl): (Option<String>, i64) =
            self.bounded("GET+PTTL", pipe.query_async(&mut conn)).await?;
        Ok(entry_from_reply(value, pttl))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        self.bounded(
            "PSETEX",
            conn.pset_ex::<_, _, ()>(key, value, expiry_millis(ttl)),
        )
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        self.bounded("DEL", conn.del::<_, ()>(key)).await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.connection.clone();
        let mut cursor = 0_u64;
        let mut deleted = 0_u64;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let mut del_conn = self.connection.clone();
                deleted += self
                    .bounded("DEL", del_conn.del::<_, u64>(keys))
                    .await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = pattern, deleted = deleted, "Redis pattern delete");
        Ok(deleted)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let reply: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(reply == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

/// PSETEX rejects a zero expiry, so sub-millisecond TTLs become 1ms
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Pair a GET reply with its PTTL reply (`-1` no expiry, `-2` no key)
fn entry_from_reply(value: Option<String>, pttl: i64) -> Option<DistributedEntry> {
    let value = value?;
    match pttl {
        -1 => Some(DistributedEntry::new(value, None)),
        ms if ms > 0 => Some(DistributedEntry::new(
            value,
            Some(Duration::from_millis(ms.unsigned_abs())),
        )),
        // Expired between the two commands
        _ => None,
    }
}

/// Mask the password component of a Redis URL
pub(crate) fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _password)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
