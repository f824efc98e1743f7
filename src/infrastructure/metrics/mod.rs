//! Prometheus Metrics Module
//!
//! Provides metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - gRPC request counts by method and outcome
//! - gRPC request latency histograms
//! - Database connection pool gauges
//! - Business operation, error and authentication counters
//! - Process statistics (Linux)

mod collector;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::warn;

pub use collector::PrometheusMetrics;

use crate::shared::KitResult;

/// Namespace of the process-wide collector when none was configured
pub const DEFAULT_NAMESPACE: &str = "vgo";

/// Records the kit's metrics.
pub trait MetricsCollector: Send + Sync + std::fmt::Debug {
    fn record_grpc_request(&self, method: &str, success: bool);
    fn record_grpc_duration(&self, method: &str, duration: Duration);
    fn update_db_connections(&self, active: u32, idle: u32, total: u32);
    fn record_business_metric(&self, operation_type: &str);
    fn record_error(&self, error_type: &str, error_code: &str);
    fn record_auth_attempt(&self, success: bool);

    /// Text exposition format.
    fn gather(&self) -> String;
}

/// Collector that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsCollector for NoOpMetrics {
    fn record_grpc_request(&self, _method: &str, _success: bool) {}
    fn record_grpc_duration(&self, _method: &str, _duration: Duration) {}
    fn update_db_connections(&self, _active: u32, _idle: u32, _total: u32) {}
    fn record_business_metric(&self, _operation_type: &str) {}
    fn record_error(&self, _error_type: &str, _error_code: &str) {}
    fn record_auth_attempt(&self, _success: bool) {}

    fn gather(&self) -> String {
        String::new()
    }
}

static GLOBAL: OnceCell<Arc<dyn MetricsCollector>> = OnceCell::new();

/// Build the process-wide collector once; later calls return the first one.
pub fn init_global(namespace: &str) -> KitResult<Arc<dyn MetricsCollector>> {
    GLOBAL
        .get_or_try_init(|| {
            let metrics: Arc<dyn MetricsCollector> = Arc::new(PrometheusMetrics::new(namespace)?);
            Ok(metrics)
        })
        .cloned()
}

/// Install `collector` as the process-wide collector. Returns `false` when
/// one was already in place.
pub fn set_global(collector: Arc<dyn MetricsCollector>) -> bool {
    GLOBAL.set(collector).is_ok()
}

/// The process-wide collector, created with [`DEFAULT_NAMESPACE`] on first use.
pub fn global() -> Arc<dyn MetricsCollector> {
    match init_global(DEFAULT_NAMESPACE) {
        Ok(metrics) => metrics,
        Err(e) => {
            warn!("Falling back to no-op metrics: {}", e);
            Arc::new(NoOpMetrics)
        }
    }
}

/// Helper to count a business operation on the global collector
pub fn record_business_metric(operation_type: &str) {
    global().record_business_metric(operation_type);
}

/// Helper to count a business error on the global collector
pub fn record_business_error(error_type: &str, error_code: &str) {
    global().record_error(error_type, error_code);
}

/// Helper to count an authentication attempt on the global collector
pub fn record_auth(success: bool) {
    global().record_auth_attempt(success);
}

/// Helper to update database pool stats on the global collector
pub fn update_db_stats(active: u32, idle: u32, total: u32) {
    global().update_db_connections(active, idle, total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_shared() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_convenience_helpers() {
        record_business_metric("signup");
        record_business_error("validation", "E100");
        record_auth(true);
        update_db_stats(1, 1, 2);

        let text = global().gather();
        assert!(text.contains("business_operations_total"));
        assert!(text.contains("auth_attempts_total"));
    }

    #[test]
    fn test_noop_gathers_nothing() {
        let metrics = NoOpMetrics;
        metrics.record_grpc_request("/x", true);
        assert!(metrics.gather().is_empty());
    }
}
