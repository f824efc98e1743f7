//! Redis sliding-window limiter.
//!
//! Uses a sorted set per key where members are unique event ids and scores
//! are Unix timestamps in milliseconds. The check and the insert run in one
//! Lua script, so concurrent callers across instances cannot overshoot.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, instrument};

use super::RateLimiter;
use crate::shared::KitResult;

static ALLOW_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])
        local limit = tonumber(ARGV[3])
        local n = tonumber(ARGV[4])
        local nonce = ARGV[5]

        -- Drop events that left the window
        redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)

        local current = redis.call('ZCARD', key)
        if current + n > limit then
            return 0
        end

        for i = 1, n do
            redis.call('ZADD', key, now_ms, nonce .. ':' .. i)
        end
        redis.call('PEXPIRE', key, window_ms + 1000)
        return 1
        "#,
    )
});

static COUNT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])

        redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
        return redis.call('ZCARD', key)
        "#,
    )
});

#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    limit: u64,
    window: Duration,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(
        conn: ConnectionManager,
        limit: u64,
        window: Duration,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            limit,
            window,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        redis_key(&self.prefix, key)
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

fn redis_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    #[instrument(skip(self), level = "debug")]
    async fn allow_n(&self, key: &str, n: u64) -> KitResult<bool> {
        let full_key = self.key(key);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let nonce = format!("{}:{}", now_ms, uuid::Uuid::new_v4().simple());
        let mut conn = self.conn.clone();

        let allowed: i64 = ALLOW_SCRIPT
            .key(&full_key)
            .arg(now_ms)
            .arg(self.window_ms())
            .arg(self.limit)
            .arg(n)
            .arg(nonce)
            .invoke_async(&mut conn)
            .await?;

        debug!(key = %full_key, n = n, allowed = allowed == 1, "Rate limit check");
        Ok(allowed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn reset(&self, key: &str) -> KitResult<()> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let _: u64 = conn.del(&full_key).await?;
        debug!(key = %full_key, "Rate limit reset");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remaining(&self, key: &str) -> KitResult<u64> {
        let full_key = self.key(key);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        let count: u64 = COUNT_SCRIPT
            .key(&full_key)
            .arg(now_ms)
            .arg(self.window_ms())
            .invoke_async(&mut conn)
            .await?;

        Ok(self.limit.saturating_sub(count))
    }
}
