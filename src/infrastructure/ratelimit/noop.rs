use async_trait::async_trait;

use super::RateLimiter;
use crate::shared::KitResult;

/// Remaining allowance reported by [`NoOpRateLimiter`]
pub const UNLIMITED_REMAINING: u64 = 999_999;

/// Admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRateLimiter;

#[async_trait]
impl RateLimiter for NoOpRateLimiter {
    async fn allow_n(&self, _key: &str, _n: u64) -> KitResult<bool> {
        Ok(true)
    }

    async fn reset(&self, _key: &str) -> KitResult<()> {
        Ok(())
    }

    async fn remaining(&self, _key: &str) -> KitResult<u64> {
        Ok(UNLIMITED_REMAINING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_allows() {
        let limiter = NoOpRateLimiter;
        for _ in 0..10 {
            assert!(limiter.allow_n("k", 1_000).await.unwrap());
        }
        assert_eq!(limiter.remaining("k").await.unwrap(), UNLIMITED_REMAINING);
    }
}
