//! Kit settings and configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::i18n::Language;

/// Environment variable naming the configuration file (without extension)
pub const CONFIG_PATH_ENV: &str = "SERVICE_KIT_CONFIG";

/// Default configuration file location (extension is inferred)
pub const DEFAULT_CONFIG_PATH: &str = "config/config";

/// Prefix for environment variable overrides (VGO__GRPC__SERVER__PORT=9001)
pub const ENV_PREFIX: &str = "VGO";

/// Load the raw layered configuration.
///
/// The loading order is:
/// 1. The configuration file at `path` (required; YAML, TOML or JSON)
/// 2. Environment variables prefixed with `VGO__` (highest priority)
///
/// The raw [`Config`] stays useful after startup for ad-hoc key lookups.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    Config::builder()
        .set_default("environment", "development")?
        .add_source(File::with_name(path).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
}

/// Resolve the configuration path from the environment.
pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Root configuration structure containing all kit settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Current environment (development, staging, production)
    pub environment: String,

    /// Admin HTTP listener (metrics, health)
    pub http: HttpSettings,

    /// Log sinks
    pub log: LogSettings,

    /// Error reporting
    pub sentry: SentrySettings,

    /// Prometheus metrics
    pub metrics: MetricsSettings,

    /// Redis configuration, cache falls back to a no-op when absent
    pub redis: Option<RedisSettings>,

    /// PostgreSQL configuration, no pool is created when absent
    pub database: Option<DatabaseSettings>,

    /// Rate limiting configuration
    pub rate_limit: RateLimitSettings,

    /// Translation lookup
    pub i18n: I18nSettings,

    /// gRPC server and named clients
    pub grpc: GrpcSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            http: HttpSettings::default(),
            log: LogSettings::default(),
            sentry: SentrySettings::default(),
            metrics: MetricsSettings::default(),
            redis: None,
            database: None,
            rate_limit: RateLimitSettings::default(),
            i18n: I18nSettings::default(),
            grpc: GrpcSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the file named by `SERVICE_KIT_CONFIG`
    /// (default `config/config`) and environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = load_config(&config_path())?;
        Self::from_config(&config)
    }

    /// Deserialize and validate settings from an already-built [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config
            .clone()
            .try_deserialize()
            .and_then(|settings: Self| settings.validate().map(|_| settings))
    }

    /// Reject combinations the adapters cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sentry.enabled && self.sentry.dsn.trim().is_empty() {
            return Err(ConfigError::Message(
                "sentry.dsn is required when sentry is enabled".into(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Message(
                "rate_limit.window_secs must be greater than zero".into(),
            ));
        }
        if let Some(tls) = &self.grpc.server.tls {
            if tls.enabled && (tls.cert_file.is_empty() || tls.key_file.is_empty()) {
                return Err(ConfigError::Message(
                    "cert_file and key_file are required for server TLS".into(),
                ));
            }
        }

        for (name, client) in &self.grpc.clients {
            if client
                .tls
                .as_ref()
                .is_some_and(|tls| tls.enabled && tls.insecure_skip_verify)
            {
                return Err(ConfigError::Message(format!(
                    "grpc client {name}: insecure_skip_verify is not supported"
                )));
            }
        }
        Ok(())
    }
}

/// Admin HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Serve the admin router at all
    pub enabled: bool,

    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

impl HttpSettings {
    /// Get the bind address as a string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Rotation period of the log file.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Log sink configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum level: trace, debug, info, warn, error
    pub level: String,

    /// Directory for the log file; file output is off when empty
    pub directory: String,

    /// Log file name; file output is off when empty
    pub filename: String,

    /// Mirror logs to the terminal
    pub stdout: bool,

    /// Emit terminal logs as JSON instead of the pretty format
    pub json: bool,

    /// File rotation period
    pub rotation: LogRotation,

    /// Rotated files kept on disk (0 = default of 10)
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "./logs".to_string(),
            filename: "app.log".to_string(),
            stdout: true,
            json: false,
            rotation: LogRotation::Daily,
            max_files: 10,
        }
    }
}

/// Sentry error-reporting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentrySettings {
    pub enabled: bool,
    pub dsn: String,
    pub environment: String,
    pub debug: bool,

    /// Fraction of error events sent (0.0 - 1.0)
    pub sample_rate: f32,

    /// Fraction of transactions sent (0.0 - 1.0)
    pub traces_sample_rate: f32,
}

impl Default for SentrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dsn: String::new(),
            environment: "development".to_string(),
            debug: false,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
        }
    }
}

/// Prometheus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Register real collectors; a no-op collector is used otherwise
    pub enabled: bool,

    /// Namespace prepended to every metric name
    pub namespace: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "vgo".to_string(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL (redis://[:password@]host:port/db)
    pub url: String,

    /// Optional prefix prepended to every cache key
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Initial connection and ping timeout in seconds
    #[serde(default = "default_redis_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_redis_connect_timeout() -> u64 {
    5
}

impl RedisSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL (postgres:// or postgresql://)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections to maintain
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Recycle connections after this many seconds
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Close idle connections after this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Connect / first ping timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Interval of the background ping in seconds
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

fn default_max_connections() -> u32 {
    25
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_lifetime() -> u64 {
    30 * 60
}

fn default_idle_timeout() -> u64 {
    5 * 60
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_health_check_interval() -> u64 {
    10
}

impl DatabaseSettings {
    /// Settings with defaults for everything but the URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            health_check_interval_secs: default_health_check_interval(),
        }
    }
}

/// Storage used by the rate limiter.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    #[default]
    Memory,
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// A disabled limiter admits everything
    pub enabled: bool,

    /// Where window entries are stored
    #[serde(alias = "type")]
    pub backend: RateLimitBackend,

    /// Events allowed per window
    pub limit: u64,

    /// Window length in seconds
    pub window_secs: u64,

    /// Redis key prefix
    pub prefix: String,

    /// Dedicated Redis URL; the shared Redis connection is used when absent
    pub redis_url: Option<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Memory,
            limit: 100,
            window_secs: 60,
            prefix: "ratelimit".to_string(),
            redis_url: None,
        }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Translation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct I18nSettings {
    /// Language used when a request carries none
    pub default_language: Language,

    /// Directory holding `<code>.json` files; nothing is loaded when absent
    pub directory: Option<String>,

    /// Metadata key inspected first by the language interceptor
    pub header: String,
}

impl Default for I18nSettings {
    fn default() -> Self {
        Self {
            default_language: Language::default(),
            directory: None,
            header: "accept-language".to_string(),
        }
    }
}

/// gRPC configuration: one server, any number of named clients.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GrpcSettings {
    pub server: GrpcServerSettings,
    pub clients: HashMap<String, GrpcClientSettings>,
}

/// 4 MiB, the gRPC default message size limit
pub const DEFAULT_MAX_MSG_SIZE: usize = 4 * 1024 * 1024;

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrpcServerSettings {
    pub host: String,
    pub port: u16,

    /// Maximum decoded request size in bytes
    pub max_recv_msg_size: usize,

    /// Maximum encoded response size in bytes
    pub max_send_msg_size: usize,

    /// Per-call deadline in seconds, 0 for none
    pub request_timeout_secs: u64,

    pub keepalive: KeepAliveSettings,

    pub tls: Option<TlsSettings>,
}

impl Default for GrpcServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            max_recv_msg_size: DEFAULT_MAX_MSG_SIZE,
            max_send_msg_size: DEFAULT_MAX_MSG_SIZE,
            request_timeout_secs: 0,
            keepalive: KeepAliveSettings::default(),
            tls: None,
        }
    }
}

impl GrpcServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| t.enabled)
    }
}

/// gRPC client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrpcClientSettings {
    /// Target address (host:port or full URI)
    #[serde(alias = "address")]
    pub target: String,

    pub max_recv_msg_size: usize,
    pub max_send_msg_size: usize,

    /// Connect timeout in seconds
    pub connection_timeout_secs: u64,

    pub keepalive: KeepAliveSettings,
    pub tls: Option<TlsSettings>,
    pub retry: RetrySettings,
}

impl Default for GrpcClientSettings {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_recv_msg_size: DEFAULT_MAX_MSG_SIZE,
            max_send_msg_size: DEFAULT_MAX_MSG_SIZE,
            connection_timeout_secs: 5,
            keepalive: KeepAliveSettings::default(),
            tls: None,
            retry: RetrySettings::default(),
        }
    }
}

impl GrpcClientSettings {
    /// Client settings with defaults for everything but the target.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| t.enabled)
    }
}

/// HTTP/2 keep-alive configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepAliveSettings {
    /// Ping interval in seconds
    pub time_secs: u64,

    /// Ping acknowledgement timeout in seconds
    pub timeout_secs: u64,

    /// Keep pinging while no stream is active
    pub permit_without_stream: bool,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self {
            time_secs: 30,
            timeout_secs: 5,
            permit_without_stream: true,
        }
    }
}

impl KeepAliveSettings {
    pub fn time(&self) -> Duration {
        Duration::from_secs(self.time_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// TLS material for a server or a client.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsSettings {
    pub enabled: bool,

    /// PEM certificate (server identity, or client identity for mTLS)
    pub cert_file: String,

    /// PEM private key matching `cert_file`
    pub key_file: String,

    /// PEM CA bundle: trusted roots on clients, client CA on servers
    pub ca_file: String,

    /// Override the name checked against the server certificate
    pub server_name: String,

    /// Rejected on clients; certificates are always verified
    pub insecure_skip_verify: bool,
}

/// Client-side retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first call
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_from_yaml(yaml: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let settings = Settings::from_config(&config_from_yaml("environment: test")).unwrap();

        assert_eq!(settings.environment, "test");
        assert_eq!(settings.grpc.server.port, 9000);
        assert_eq!(settings.grpc.server.max_recv_msg_size, DEFAULT_MAX_MSG_SIZE);
        assert_eq!(settings.rate_limit.limit, 100);
        assert_eq!(settings.rate_limit.backend, RateLimitBackend::Memory);
        assert_eq!(settings.metrics.namespace, "vgo");
        assert!(settings.redis.is_none());
        assert!(settings.database.is_none());
        assert_eq!(settings.log.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_nested_sections() {
        let yaml = r#"
grpc:
  server:
    host: "127.0.0.1"
    port: 50051
    keepalive:
      time_secs: 10
  clients:
    user-service:
      address: "localhost:50052"
      retry:
        max_attempts: 5
rate_limit:
  type: redis
  limit: 10
  window_secs: 1
database:
  url: "postgresql://localhost/app"
"#;
        let settings = Settings::from_config(&config_from_yaml(yaml)).unwrap();

        assert_eq!(settings.grpc.server.addr(), "127.0.0.1:50051");
        assert_eq!(settings.grpc.server.keepalive.time_secs, 10);
        assert_eq!(settings.grpc.server.keepalive.timeout_secs, 5);

        let client = &settings.grpc.clients["user-service"];
        assert_eq!(client.target, "localhost:50052");
        assert_eq!(client.retry.max_attempts, 5);
        assert_eq!(client.retry.initial_backoff_ms, 100);

        assert_eq!(settings.rate_limit.backend, RateLimitBackend::Redis);
        let db = settings.database.unwrap();
        assert_eq!(db.max_connections, 25);
        assert_eq!(db.health_check_interval_secs, 10);
    }

    #[test]
    fn test_sentry_requires_dsn() {
        let yaml = "sentry:\n  enabled: true\n";
        let err = Settings::from_config(&config_from_yaml(yaml)).unwrap_err();
        assert!(err.to_string().contains("sentry.dsn"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = "rate_limit:\n  window_secs: 0\n";
        assert!(Settings::from_config(&config_from_yaml(yaml)).is_err());
    }

    #[test]
    fn test_server_tls_requires_key_pair() {
        let yaml = "grpc:\n  server:\n    tls:\n      enabled: true\n      cert_file: a.pem\n";
        assert!(Settings::from_config(&config_from_yaml(yaml)).is_err());
    }

    #[test]
    fn test_request_timeout_off_by_default() {
        let settings = Settings::from_config(&config_from_yaml("environment: test")).unwrap();
        assert_eq!(settings.grpc.server.request_timeout(), None);

        let yaml = "grpc:\n  server:\n    request_timeout_secs: 30\n";
        let settings = Settings::from_config(&config_from_yaml(yaml)).unwrap();
        assert_eq!(
            settings.grpc.server.request_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_insecure_skip_verify_rejected() {
        let yaml = r#"
grpc:
  clients:
    billing:
      target: "billing:443"
      tls:
        enabled: true
        insecure_skip_verify: true
"#;
        let err = Settings::from_config(&config_from_yaml(yaml)).unwrap_err();
        assert!(err.to_string().contains("billing"), "{}", err);

        // Ignored while TLS is off
        let yaml = "grpc:\n  clients:\n    billing:\n      tls:\n        insecure_skip_verify: true\n";
        assert!(Settings::from_config(&config_from_yaml(yaml)).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("definitely/not/here/config").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.yaml");
        std::fs::write(&path, "http:\n  port: 8181\nlog:\n  level: debug\n").unwrap();

        let base = dir.path().join("kit");
        let config = load_config(base.to_str().unwrap()).unwrap();
        assert_eq!(config.get_string("log.level").unwrap(), "debug");

        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.http.port, 8181);
        assert_eq!(settings.environment, "development");
    }
}
