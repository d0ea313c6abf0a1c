//! Redis slot and lease stores
//!
//! Share slots and locks across processes. Requires the `redis` feature.

use crate::error::{LockResult, SlotResult};
use crate::lock::LeaseStore;
use crate::slot::{SlotLookup, SlotStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace, warn};

const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const RENEW_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

/// Redis-backed slot store
pub struct RedisSlotStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSlotStore {
    /// Create a new Redis slot store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> SlotResult<Self> {
        debug!(url = %url, "Connecting to Redis for singleton slots");
        Ok(Self::from_connection(connect(url).await?))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: "singleton:slot".to_string(),
        }
    }

    /// Set a custom key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }
}

#[async_trait]
impl SlotStore for RedisSlotStore {
    async fn get_json(&self, name: &str, timeout: Duration) -> SlotResult<SlotLookup> {
        let key = self.key(name);
        let mut conn = self.conn.clone();

        match tokio::time::timeout(timeout, conn.get::<_, Option<String>>(&key)).await {
            Ok(Ok(Some(value))) => Ok(SlotLookup::Found(value)),
            Ok(Ok(None)) => Ok(SlotLookup::Missing),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(slot = %name, timeout_ms = timeout.as_millis() as u64, "Redis slot read timed out");
                Ok(SlotLookup::Missing)
            }
        }
    }

    async fn set_json(&self, name: &str, value: String) -> SlotResult<()> {
        trace!(slot = %name, "Redis slot write");
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key(name), value).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> SlotResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.key(name)).await?;
        Ok(removed > 0)
    }
}

/// Redis-backed lease store
///
/// Acquisition is `SET NX PX`; renewal and release are compare-and-set
/// Lua scripts keyed on the holder token.
pub struct RedisLeaseStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisLeaseStore {
    /// Create a new Redis lease store
    pub async fn new(url: &str) -> LockResult<Self> {
        debug!(url = %url, "Connecting to Redis for singleton locks");
        Ok(Self::from_connection(connect(url).await?))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: "singleton:lock".to_string(),
        }
    }

    /// Set a custom key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        // SET NX PX for atomic acquire with TTL
        let result: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RENEW_SCRIPT)
            .key(self.key(key))
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }

    async fn release(&self, key: &str, token: &str) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }

    async fn holder(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.key(key)).await?)
    }
}
