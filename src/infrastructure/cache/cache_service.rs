//! Cache Service
//!
//! Object-safe cache trait and its Redis implementation.
//!
//! `Cache` works on strings so it can live behind `Arc<dyn Cache>`; typed
//! JSON access comes from the blanket [`CacheExt`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_kit::infrastructure::cache::{Cache, CacheExt, RedisCache};
//!
//! let cache = RedisCache::new(redis_connection);
//!
//! cache.set("session:123", &session, Some(Duration::from_secs(3600))).await?;
//! let session: Option<Session> = cache.get("session:123").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue, Pipeline};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::shared::{KitError, KitResult};

/// String-level cache operations.
///
/// Mirrors the Redis command set the services use. Implementations must be
/// usable as `Arc<dyn Cache>`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns `None` when the key does not exist.
    async fn get_string(&self, key: &str) -> KitResult<Option<String>>;

    /// Stores a value, with an expiration when `ttl` is given.
    async fn set_string(&self, key: &str, value: String, ttl: Option<Duration>) -> KitResult<()>;

    /// Sets the value only if the key is absent. Returns whether it was set.
    async fn set_nx(&self, key: &str, value: String, ttl: Option<Duration>) -> KitResult<bool>;

    /// Values in the same order as `keys`.
    async fn mget(&self, keys: &[&str]) -> KitResult<Vec<Option<String>>>;

    /// Number of keys removed.
    async fn del(&self, keys: &[&str]) -> KitResult<u64>;

    /// Number of the given keys that exist.
    async fn exists(&self, keys: &[&str]) -> KitResult<u64>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> KitResult<bool>;

    /// `None` for a missing key or a key without expiration.
    async fn ttl(&self, key: &str) -> KitResult<Option<Duration>>;

    async fn incr(&self, key: &str) -> KitResult<i64>;
    async fn decr(&self, key: &str) -> KitResult<i64>;
    async fn incr_by(&self, key: &str, delta: i64) -> KitResult<i64>;

    async fn hset(&self, key: &str, field: &str, value: String) -> KitResult<()>;
    async fn hget(&self, key: &str, field: &str) -> KitResult<Option<String>>;
    async fn hgetall(&self, key: &str) -> KitResult<HashMap<String, String>>;
    async fn hdel(&self, key: &str, fields: &[&str]) -> KitResult<u64>;

    /// Returns the list length after the push.
    async fn lpush(&self, key: &str, values: &[String]) -> KitResult<u64>;
    async fn rpush(&self, key: &str, values: &[String]) -> KitResult<u64>;
    async fn lpop(&self, key: &str) -> KitResult<Option<String>>;
    async fn rpop(&self, key: &str) -> KitResult<Option<String>>;
    async fn llen(&self, key: &str) -> KitResult<u64>;

    /// Number of members newly added.
    async fn sadd(&self, key: &str, members: &[String]) -> KitResult<u64>;
    async fn srem(&self, key: &str, members: &[String]) -> KitResult<u64>;
    async fn smembers(&self, key: &str) -> KitResult<Vec<String>>;
    async fn sismember(&self, key: &str, member: &str) -> KitResult<bool>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KitResult<u64>;
    async fn zrem(&self, key: &str, members: &[&str]) -> KitResult<u64>;
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> KitResult<Vec<String>>;
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> KitResult<Vec<(String, f64)>>;

    async fn ping(&self) -> KitResult<()>;

    /// The underlying Redis connection, when there is one.
    fn connection(&self) -> Option<ConnectionManager>;
}

/// Typed JSON access for every [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Reads and deserializes a JSON value.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> KitResult<Option<T>> {
        match self.get_string(key).await? {
            Some(data) => Ok(Some(deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores a JSON value.
    async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> KitResult<()> {
        let data = serialize(value)?;
        self.set_string(key, data, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

fn serialize<T: Serialize + ?Sized>(value: &T) -> KitResult<String> {
    serde_json::to_string(value).map_err(|e| {
        warn!("Cache serialization error: {}", e);
        KitError::Serialization(e)
    })
}

fn deserialize<T: DeserializeOwned>(data: &str) -> KitResult<T> {
    serde_json::from_str(data).map_err(|e| {
        warn!("Cache deserialization error: {}", e);
        KitError::Serialization(e)
    })
}

fn format_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

/// TTL in whole milliseconds for `PX`/`PEXPIRE`; never zero, so a
/// sub-millisecond TTL still expires instead of deleting.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Redis-backed cache implementation.
///
/// Uses a Redis ConnectionManager for automatic reconnection handling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: Option<Arc<str>>,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, prefix: None }
    }

    /// All keys will be prefixed: with `"app:v1:"`, key `"user:1"` becomes
    /// `"app:v1:user:1"`.
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    /// The key as stored in Redis, prefix included.
    pub fn key(&self, key: &str) -> String {
        format_key(self.prefix.as_deref(), key)
    }

    fn keys(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| self.key(k)).collect()
    }

    /// A plain pipeline. Keys added to it are not prefixed; use [`Self::key`].
    pub fn pipeline(&self) -> Pipeline {
        redis::pipe()
    }

    /// A MULTI/EXEC pipeline.
    pub fn tx_pipeline(&self) -> Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe
    }

    #[instrument(skip(self, pipe), level = "debug")]
    pub async fn run_pipeline<T: FromRedisValue>(&self, pipe: &Pipeline) -> KitResult<T> {
        let mut conn = self.conn.clone();
        let result = pipe.query_async(&mut conn).await?;
        debug!("Pipeline executed");
        Ok(result)
    }
}

#[async_trait]
impl Cache for RedisCache {
    #[instrument(skip(self), level = "debug")]
    async fn get_string(&self, key: &str) -> KitResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let result: Option<String> = conn.get(&full_key).await?;
        match &result {
            Some(_) => debug!(key = %full_key, "Cache hit"),
            None => debug!(key = %full_key, "Cache miss"),
        }

        Ok(result)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_string(&self, key: &str, value: String, ttl: Option<Duration>) -> KitResult<()> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        match ttl {
            Some(ttl) => {
                let _: () = conn.pset_ex(&full_key, value, ttl_millis(ttl)).await?;
                debug!(key = %full_key, ttl = ?ttl, "Cache set with expiry");
            }
            None => {
                let _: () = conn.set(&full_key, value).await?;
                debug!(key = %full_key, "Cache set");
            }
        }

        Ok(())
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_nx(&self, key: &str, value: String, ttl: Option<Duration>) -> KitResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        // SET NX replies OK when written, nil otherwise
        let result: Option<String> = cmd.query_async(&mut conn).await?;
        let was_set = result.is_some();
        debug!(key = %full_key, was_set = was_set, "Cache set if not exists");

        Ok(was_set)
    }

    #[instrument(skip(self), level = "debug")]
    async fn mget(&self, keys: &[&str]) -> KitResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let full_keys = self.keys(keys);
        let mut conn = self.conn.clone();

        let values: Vec<Option<String>> = conn.mget(full_keys.as_slice()).await?;
        debug!(count = values.len(), "Cache get many");

        Ok(values)
    }

    #[instrument(skip(self), level = "debug")]
    async fn del(&self, keys: &[&str]) -> KitResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys = self.keys(keys);
        let mut conn = self.conn.clone();

        let deleted: u64 = conn.del(full_keys.as_slice()).await?;
        debug!(count = deleted, "Cache delete");

        Ok(deleted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, keys: &[&str]) -> KitResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys = self.keys(keys);
        let mut conn = self.conn.clone();

        let count: u64 = conn.exists(full_keys.as_slice()).await?;
        debug!(count = count, "Cache exists check");

        Ok(count)
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, ttl: Duration) -> KitResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        // PEXPIRE returns 1 if the timeout was set, 0 if the key does not exist
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let result: i32 = conn.pexpire(&full_key, millis).await?;
        let success = result == 1;
        debug!(key = %full_key, ttl = ?ttl, success = success, "Cache expire");

        Ok(success)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ttl(&self, key: &str) -> KitResult<Option<Duration>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        // -2: no such key, -1: no expiration
        let ttl: i64 = conn.pttl(&full_key).await?;
        let result = u64::try_from(ttl).ok().map(Duration::from_millis);
        debug!(key = %full_key, ttl = ?result, "Cache TTL check");

        Ok(result)
    }

    #[instrument(skip(self), level = "debug")]
    async fn incr(&self, key: &str) -> KitResult<i64> {
        self.incr_by(key, 1).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn decr(&self, key: &str) -> KitResult<i64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let value: i64 = conn.decr(&full_key, 1).await?;
        debug!(key = %full_key, value = value, "Cache decrement");

        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn incr_by(&self, key: &str, delta: i64) -> KitResult<i64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let value: i64 = conn.incr(&full_key, delta).await?;
        debug!(key = %full_key, delta = delta, value = value, "Cache increment");

        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn hset(&self, key: &str, field: &str, value: String) -> KitResult<()> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let _: i64 = conn.hset(&full_key, field, value).await?;
        debug!(key = %full_key, field = field, "Hash set");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn hget(&self, key: &str, field: &str) -> KitResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let value: Option<String> = conn.hget(&full_key, field).await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn hgetall(&self, key: &str) -> KitResult<HashMap<String, String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let map: HashMap<String, String> = conn.hgetall(&full_key).await?;
        debug!(key = %full_key, fields = map.len(), "Hash get all");

        Ok(map)
    }

    #[instrument(skip(self), level = "debug")]
    async fn hdel(&self, key: &str, fields: &[&str]) -> KitResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }

        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let removed: u64 = conn.hdel(&full_key, fields).await?;
        Ok(removed)
    }

    #[instrument(skip(self, values), level = "debug")]
    async fn lpush(&self, key: &str, values: &[String]) -> KitResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let len: u64 = conn.lpush(&full_key, values).await?;
        debug!(key = %full_key, len = len, "List push front");

        Ok(len)
    }

    #[instrument(skip(self, values), level = "debug")]
    async fn rpush(&self, key: &str, values: &[String]) -> KitResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let len: u64 = conn.rpush(&full_key, values).await?;
        debug!(key = %full_key, len = len, "List push back");

        Ok(len)
    }

    #[instrument(skip(self), level = "debug")]
    async fn lpop(&self, key: &str) -> KitResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("LPOP").arg(&full_key).query_async(&mut conn).await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn rpop(&self, key: &str) -> KitResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("RPOP").arg(&full_key).query_async(&mut conn).await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn llen(&self, key: &str) -> KitResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let len: u64 = conn.llen(&full_key).await?;
        Ok(len)
    }

    #[instrument(skip(self, members), level = "debug")]
    async fn sadd(&self, key: &str, members: &[String]) -> KitResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let added: u64 = conn.sadd(&full_key, members).await?;
        debug!(key = %full_key, added = added, "Set add");

        Ok(added)
    }

    #[instrument(skip(self, members), level = "debug")]
    async fn srem(&self, key: &str, members: &[String]) -> KitResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let removed: u64 = conn.srem(&full_key, members).await?;
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn smembers(&self, key: &str) -> KitResult<Vec<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn.smembers(&full_key).await?;
        Ok(members)
    }

    #[instrument(skip(self), level = "debug")]
    async fn sismember(&self, key: &str, member: &str) -> KitResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let is_member: bool = conn.sismember(&full_key, member).await?;
        Ok(is_member)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zadd(&self, key: &str, member: &str, score: f64) -> KitResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let added: u64 = conn.zadd(&full_key, member, score).await?;
        debug!(key = %full_key, score = score, "Sorted set add");

        Ok(added)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zrem(&self, key: &str, members: &[&str]) -> KitResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let removed: u64 = conn.zrem(&full_key, members).await?;
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> KitResult<Vec<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn.zrange(&full_key, start, stop).await?;
        Ok(members)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> KitResult<Vec<(String, f64)>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(&full_key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> KitResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn connection(&self) -> Option<ConnectionManager> {
        Some(self.conn.clone())
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
