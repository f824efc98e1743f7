//! Rate Limiting
//!
//! Sliding-window admission control. A key may record at most `limit`
//! events within any trailing `window`; a request for `n` events is rejected
//! when `count_in_window + n > limit`, otherwise all `n` are recorded.
//!
//! Backends:
//! - [`RedisRateLimiter`]: shared across instances, one Lua script per check
//! - [`MemoryRateLimiter`]: per-process
//! - [`NoOpRateLimiter`]: admits everything

mod memory;
mod noop;
mod redis_limiter;

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

pub use memory::MemoryRateLimiter;
pub use noop::NoOpRateLimiter;
pub use redis_limiter::RedisRateLimiter;

use crate::config::{RateLimitBackend, RateLimitSettings, RedisSettings};
use crate::infrastructure::cache::create_redis_client;
use crate::shared::{KitError, KitResult};

#[async_trait]
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Record one event for `key` if the window has room.
    async fn allow(&self, key: &str) -> KitResult<bool> {
        self.allow_n(key, 1).await
    }

    /// Record `n` events for `key` if all of them fit; records nothing otherwise.
    async fn allow_n(&self, key: &str, n: u64) -> KitResult<bool>;

    /// Forget every event recorded for `key`.
    async fn reset(&self, key: &str) -> KitResult<()>;

    /// Events `key` may still record in the current window.
    async fn remaining(&self, key: &str) -> KitResult<u64>;
}

/// Build the limiter described by `settings`.
///
/// The Redis backend uses `settings.redis_url` when set, otherwise the shared
/// connection passed in.
pub async fn build_rate_limiter(
    settings: &RateLimitSettings,
    shared_redis: Option<ConnectionManager>,
) -> KitResult<Arc<dyn RateLimiter>> {
    if !settings.enabled {
        info!("Rate limiting disabled");
        return Ok(Arc::new(NoOpRateLimiter));
    }

    let limiter: Arc<dyn RateLimiter> = match settings.backend {
        RateLimitBackend::Memory => {
            Arc::new(MemoryRateLimiter::new(settings.limit, settings.window()))
        }
        RateLimitBackend::Redis => {
            let conn = match (&settings.redis_url, shared_redis) {
                (Some(url), _) => {
                    create_redis_client(&RedisSettings {
                        url: url.clone(),
                        key_prefix: None,
                        connect_timeout_secs: 5,
                    })
                    .await?
                }
                (None, Some(conn)) => conn,
                (None, None) => {
                    return Err(KitError::InvalidArgument(
                        "redis rate limiter requires a redis connection".into(),
                    ))
                }
            };
            Arc::new(RedisRateLimiter::new(
                conn,
                settings.limit,
                settings.window(),
                settings.prefix.clone(),
            ))
        }
    };

    info!(
        backend = ?settings.backend,
        limit = settings.limit,
        window_secs = settings.window_secs,
        "Rate limiter ready"
    );
    Ok(limiter)
}
