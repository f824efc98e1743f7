//! Cache that stores nothing.
//!
//! Used when no Redis is configured and in tests. Writes succeed, reads miss.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::Cache;
use crate::shared::KitResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl NoOpCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Cache for NoOpCache {
    async fn get_string(&self, _key: &str) -> KitResult<Option<String>> {
        Ok(None)
    }

    async fn set_string(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> KitResult<()> {
        Ok(())
    }

    async fn set_nx(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> KitResult<bool> {
        Ok(true)
    }

    async fn mget(&self, keys: &[&str]) -> KitResult<Vec<Option<String>>> {
        Ok(vec![None; keys.len()])
    }

    async fn del(&self, _keys: &[&str]) -> KitResult<u64> {
        Ok(0)
    }

    async fn exists(&self, _keys: &[&str]) -> KitResult<u64> {
        Ok(0)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> KitResult<bool> {
        Ok(true)
    }

    async fn ttl(&self, _key: &str) -> KitResult<Option<Duration>> {
        Ok(None)
    }

    async fn incr(&self, _key: &str) -> KitResult<i64> {
        Ok(1)
    }

    async fn decr(&self, _key: &str) -> KitResult<i64> {
        Ok(-1)
    }

    async fn incr_by(&self, _key: &str, delta: i64) -> KitResult<i64> {
        Ok(delta)
    }

    async fn hset(&self, _key: &str, _field: &str, _value: String) -> KitResult<()> {
        Ok(())
    }

    async fn hget(&self, _key: &str, _field: &str) -> KitResult<Option<String>> {
        Ok(None)
    }

    async fn hgetall(&self, _key: &str) -> KitResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn hdel(&self, _key: &str, _fields: &[&str]) -> KitResult<u64> {
        Ok(0)
    }

    async fn lpush(&self, _key: &str, _values: &[String]) -> KitResult<u64> {
        Ok(0)
    }

    async fn rpush(&self, _key: &str, _values: &[String]) -> KitResult<u64> {
        Ok(0)
    }

    async fn lpop(&self, _key: &str) -> KitResult<Option<String>> {
        Ok(None)
    }

    async fn rpop(&self, _key: &str) -> KitResult<Option<String>> {
        Ok(None)
    }

    async fn llen(&self, _key: &str) -> KitResult<u64> {
        Ok(0)
    }

    async fn sadd(&self, _key: &str, _members: &[String]) -> KitResult<u64> {
        Ok(0)
    }

    async fn srem(&self, _key: &str, _members: &[String]) -> KitResult<u64> {
        Ok(0)
    }

    async fn smembers(&self, _key: &str) -> KitResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn sismember(&self, _key: &str, _member: &str) -> KitResult<bool> {
        Ok(false)
    }

    async fn zadd(&self, _key: &str, _member: &str, _score: f64) -> KitResult<u64> {
        Ok(0)
    }

    async fn zrem(&self, _key: &str, _members: &[&str]) -> KitResult<u64> {
        Ok(0)
    }

    async fn zrange(&self, _key: &str, _start: isize, _stop: isize) -> KitResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn zrange_with_scores(
        &self,
        _key: &str,
        _start: isize,
        _stop: isize,
    ) -> KitResult<Vec<(String, f64)>> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> KitResult<()> {
        Ok(())
    }

    fn connection(&self) -> Option<ConnectionManager> {
        None
    }
}
