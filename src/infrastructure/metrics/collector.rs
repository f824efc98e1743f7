//! Prometheus-backed collector with its own registry.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::{error, info};

use super::MetricsCollector;
use crate::shared::KitResult;

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Every kit metric, registered under one namespace.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    namespace: String,

    grpc_requests_total: IntCounterVec,
    grpc_request_duration_seconds: HistogramVec,

    db_connections_active: IntGauge,
    db_connections_idle: IntGauge,
    db_connections_total: IntGauge,

    business_operations_total: IntCounterVec,
    errors_total: IntCounterVec,
    auth_attempts_total: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new(namespace: &str) -> KitResult<Self> {
        let registry = Registry::new();

        let grpc_requests_total = IntCounterVec::new(
            Opts::new("grpc_requests_total", "Total number of gRPC requests").namespace(namespace),
            &["method", "status"],
        )?;

        let grpc_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_request_duration_seconds",
                "gRPC request latency in seconds",
            )
            .namespace(namespace)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method"],
        )?;

        let db_connections_active = IntGauge::with_opts(
            Opts::new("db_connections_active", "Database connections in use").namespace(namespace),
        )?;
        let db_connections_idle = IntGauge::with_opts(
            Opts::new("db_connections_idle", "Idle database connections").namespace(namespace),
        )?;
        let db_connections_total = IntGauge::with_opts(
            Opts::new("db_connections_total", "Open database connections").namespace(namespace),
        )?;

        let business_operations_total = IntCounterVec::new(
            Opts::new("business_operations_total", "Total number of business operations")
                .namespace(namespace),
            &["operation_type"],
        )?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors").namespace(namespace),
            &["error_type", "error_code"],
        )?;

        let auth_attempts_total = IntCounterVec::new(
            Opts::new("auth_attempts_total", "Total number of authentication attempts")
                .namespace(namespace),
            &["result"],
        )?;

        registry.register(Box::new(grpc_requests_total.clone()))?;
        registry.register(Box::new(grpc_request_duration_seconds.clone()))?;
        registry.register(Box::new(db_connections_active.clone()))?;
        registry.register(Box::new(db_connections_idle.clone()))?;
        registry.register(Box::new(db_connections_total.clone()))?;
        registry.register(Box::new(business_operations_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(auth_attempts_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        info!(namespace = namespace, "Prometheus metrics registered");

        Ok(Self {
            registry,
            namespace: namespace.to_string(),
            grpc_requests_total,
            grpc_request_duration_seconds,
            db_connections_active,
            db_connections_idle,
            db_connections_total,
            business_operations_total,
            errors_total,
            auth_attempts_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn record_grpc_request(&self, method: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.grpc_requests_total
            .with_label_values(&[method, status])
            .inc();
    }

    fn record_grpc_duration(&self, method: &str, duration: Duration) {
        self.grpc_request_duration_seconds
            .with_label_values(&[method])
            .observe(duration.as_secs_f64());
    }

    fn update_db_connections(&self, active: u32, idle: u32, total: u32) {
        self.db_connections_active.set(i64::from(active));
        self.db_connections_idle.set(i64::from(idle));
        self.db_connections_total.set(i64::from(total));
    }

    fn record_business_metric(&self, operation_type: &str) {
        self.business_operations_total
            .with_label_values(&[operation_type])
            .inc();
    }

    fn record_error(&self, error_type: &str, error_code: &str) {
        self.errors_total
            .with_label_values(&[error_type, error_code])
            .inc();
    }

    fn record_auth_attempt(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.auth_attempts_total.with_label_values(&[result]).inc();
    }

    fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
