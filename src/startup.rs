//! Kit Startup
//!
//! Builds every adapter from one configuration, in dependency order:
//! logger, metrics, Redis, rate limiter, translator, database, gRPC.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use config::Config;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use tracing::{error, info};

use crate::config::{config_path, load_config, Settings};
use crate::i18n::Translator;
use crate::infrastructure::cache::{create_redis_client, Cache, NoOpCache, RedisCache};
use crate::infrastructure::database::PostgresStore;
use crate::infrastructure::metrics::{self, MetricsCollector, NoOpMetrics, PrometheusMetrics};
use crate::infrastructure::ratelimit::{build_rate_limiter, RateLimiter};
use crate::presentation::grpc::GrpcManager;
use crate::presentation::http::{admin_router, handlers::health, AdminState};
use crate::presentation::middleware::{
    skip_health_checks, InterceptorOptions, LanguageInterceptor, RateLimitLayer,
};
use crate::shared::{KitError, KitResult};
use crate::telemetry::{init_logger, Logger};

static KIT: OnceCell<Kit> = OnceCell::new();

/// Every initialized adapter
pub struct Kit {
    config: Config,
    settings: Arc<Settings>,
    logger: Mutex<Option<Logger>>,
    metrics: Arc<dyn MetricsCollector>,
    redis: Option<ConnectionManager>,
    cache: Arc<dyn Cache>,
    rate_limiter: Arc<dyn RateLimiter>,
    translator: Arc<Translator>,
    database: Option<Arc<PostgresStore>>,
    grpc: Arc<GrpcManager>,
}

impl std::fmt::Debug for Kit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kit")
            .field("environment", &self.settings.environment)
            .field("redis", &self.redis.is_some())
            .field("database", &self.database.is_some())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl Kit {
    /// Load the configuration file named by `SERVICE_KIT_CONFIG` and
    /// initialize the kit from it.
    pub async fn load() -> KitResult<Self> {
        let config = load_config(&config_path())?;
        Self::init(config).await
    }

    /// Initialize every adapter described by `config`.
    ///
    /// Redis and Postgres are only connected when their sections carry a
    /// URL; without Redis the cache is a no-op.
    pub async fn init(config: Config) -> KitResult<Self> {
        let settings = Settings::from_config(&config)?;

        let logger = init_logger(&settings.log, &settings.sentry)?;
        health::init_start_time();
        info!(environment = %settings.environment, "Initializing service kit");

        let metrics: Arc<dyn MetricsCollector> = if settings.metrics.enabled {
            Arc::new(PrometheusMetrics::new(&settings.metrics.namespace)?)
        } else {
            Arc::new(NoOpMetrics)
        };

        let redis = match settings.redis.as_ref().filter(|r| !r.url.is_empty()) {
            Some(redis_settings) => Some(create_redis_client(redis_settings).await?),
            None => None,
        };
        let cache: Arc<dyn Cache> = match (&redis, &settings.redis) {
            (Some(conn), Some(redis_settings)) => match redis_settings.key_prefix.as_deref() {
                Some(prefix) if !prefix.is_empty() => {
                    Arc::new(RedisCache::with_prefix(conn.clone(), prefix))
                }
                _ => Arc::new(RedisCache::new(conn.clone())),
            },
            _ => {
                info!("Redis not configured, using no-op cache");
                Arc::new(NoOpCache::new())
            }
        };

        let rate_limiter = build_rate_limiter(&settings.rate_limit, redis.clone()).await?;

        let translator = Translator::new(settings.i18n.default_language);
        if let Some(dir) = settings.i18n.directory.as_deref() {
            translator.load_translations(dir)?;
        }

        let database = match settings.database.as_ref().filter(|d| !d.url.is_empty()) {
            Some(db) => Some(Arc::new(PostgresStore::connect(db, metrics.clone()).await?)),
            None => None,
        };

        let grpc = Arc::new(GrpcManager::new(settings.grpc.clone()));

        info!("Service kit initialized");

        Ok(Self {
            config,
            settings: Arc::new(settings),
            logger: Mutex::new(Some(logger)),
            metrics,
            redis,
            cache,
            rate_limiter,
            translator: Arc::new(translator),
            database,
            grpc,
        })
    }

    /// The raw configuration, for keys the typed settings do not cover.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }

    /// The shared Redis connection, when Redis is configured.
    pub fn redis(&self) -> Option<&ConnectionManager> {
        self.redis.as_ref()
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    pub fn translator(&self) -> &Arc<Translator> {
        &self.translator
    }

    pub fn database(&self) -> Option<&Arc<PostgresStore>> {
        self.database.as_ref()
    }

    pub fn grpc(&self) -> &Arc<GrpcManager> {
        &self.grpc
    }

    /// Send an error to Sentry when error reporting is enabled.
    pub fn capture_error(&self, err: &(dyn std::error::Error + 'static)) {
        match self.logger.lock().as_ref() {
            Some(logger) => logger.capture_error(err),
            None => error!(error = %err, "Captured error after shutdown"),
        }
    }

    /// Send a message event to Sentry when error reporting is enabled.
    pub fn capture_message(
        &self,
        message: &str,
        level: sentry::Level,
    ) -> Option<sentry::types::Uuid> {
        self.logger
            .lock()
            .as_ref()
            .and_then(|logger| logger.capture_message(message, level))
    }

    /// Server middleware wired to this kit: recovery, logging, metrics,
    /// rate limiting (health checks exempt) and language negotiation.
    pub fn interceptor_options(&self) -> InterceptorOptions {
        let mut options = InterceptorOptions::new()
            .with_recovery()
            .with_logging()
            .with_metrics(self.metrics.clone());

        if self.settings.rate_limit.enabled {
            options = options.with_rate_limit(
                RateLimitLayer::new(self.rate_limiter.clone()).with_skip_fn(skip_health_checks),
            );
        }

        options.with_language(LanguageInterceptor::from_settings(&self.settings.i18n))
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            metrics: self.metrics.clone(),
            cache: self.cache.clone(),
            database: self.database.clone(),
            grpc: Some(self.grpc.clone()),
        }
    }

    /// Health probes and `/metrics`.
    pub fn admin_router(&self) -> Router {
        admin_router(self.admin_state())
    }

    /// Stop the gRPC server, close clients and the database pool, then flush
    /// the logger. Every step runs; the first error is returned.
    pub async fn shutdown(&self, timeout: Duration) -> KitResult<()> {
        info!("Shutting down service kit");

        let result = self.grpc.close(timeout).await;

        if let Some(database) = &self.database {
            database.close().await;
        }

        if let Some(logger) = self.logger.lock().take() {
            logger.close(timeout);
        }

        result
    }
}

/// Initialize the process-wide kit. A second call fails with
/// [`KitError::AlreadyInitialized`].
///
/// The kit's collector also becomes the process-wide metrics collector when
/// none was installed yet.
pub async fn init_global(config: Config) -> KitResult<&'static Kit> {
    if KIT.get().is_some() {
        return Err(KitError::AlreadyInitialized("service kit".into()));
    }

    let kit = Kit::init(config).await?;
    let metrics = kit.metrics.clone();

    KIT.set(kit)
        .map_err(|_| KitError::AlreadyInitialized("service kit".into()))?;
    metrics::set_global(metrics);

    global()
}

/// The process-wide kit.
pub fn global() -> KitResult<&'static Kit> {
    KIT.get()
        .ok_or_else(|| KitError::NotInitialized("service kit, call init_global first".into()))
}
