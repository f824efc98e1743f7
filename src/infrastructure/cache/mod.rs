//! Cache Module
//!
//! Redis connection management and caching utilities.
//!
//! This module provides:
//! - Redis connection management with automatic reconnection
//! - An object-safe `Cache` trait plus typed JSON helpers (`CacheExt`)
//! - A `RedisCache` implementation and a `NoOpCache` fallback
//! - Key naming helpers
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! |   Arc<dyn Cache>  |  <-- what services hold
//! +-------------------+
//!          |
//!     +----+-----+
//!     v          v
//! RedisCache  NoOpCache
//!     |
//!     v
//! ConnectionManager
//! ```

mod cache_service;
mod noop;

pub use cache_service::{Cache, CacheExt, RedisCache};
pub use noop::NoOpCache;

use redis::aio::ConnectionManager;
use redis::Client;
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::config::RedisSettings;
use crate::shared::{KitError, KitResult};

/// Creates a Redis connection manager with automatic reconnection.
///
/// The first connection and a `PING` must both complete within
/// `connect_timeout_secs`.
#[instrument(skip(settings), fields(url = %redact(&settings.url)))]
pub async fn create_redis_client(settings: &RedisSettings) -> KitResult<ConnectionManager> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let limit = settings.connect_timeout();

    let mut manager = timeout(limit, ConnectionManager::new(client))
        .await
        .map_err(|_| timed_out("connect", limit))??;

    let _: String = timeout(limit, redis::cmd("PING").query_async(&mut manager))
        .await
        .map_err(|_| timed_out("ping", limit))??;

    info!("Redis connection established");
    Ok(manager)
}

/// Connects and wraps the connection in a `RedisCache`, honouring `key_prefix`.
#[instrument(skip(settings))]
pub async fn create_redis_cache(settings: &RedisSettings) -> KitResult<RedisCache> {
    let conn = create_redis_client(settings).await?;
    Ok(match settings.key_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => RedisCache::with_prefix(conn, prefix),
        _ => RedisCache::new(conn),
    })
}

fn timed_out(stage: &str, limit: std::time::Duration) -> KitError {
    KitError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("redis {stage} timed out after {limit:?}"),
    ))
}

/// Strip the password from a connection URL for logging.
pub(crate) fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Cache key helpers.
///
/// ```rust,ignore
/// use service_kit::infrastructure::cache::keys;
///
/// let key = keys::build(&["user", "42", "profile"]); // "user:42:profile"
/// ```
pub mod keys {
    /// Separator between key segments
    pub const SEPARATOR: &str = ":";

    /// Prefix for distributed locks (e.g., "lock:resource_name")
    pub const LOCK: &str = "lock:";

    /// Joins segments with `:`.
    pub fn build(parts: &[&str]) -> String {
        parts.join(SEPARATOR)
    }

    /// Generates a namespaced entity key (`<namespace>:<id>`)
    #[inline]
    pub fn entity(namespace: &str, id: impl std::fmt::Display) -> String {
        format!("{}{}{}", namespace, SEPARATOR, id)
    }

    /// Generates a distributed lock key
    #[inline]
    pub fn lock(resource: &str) -> String {
        format!("{}{}", LOCK, resource)
    }
}
