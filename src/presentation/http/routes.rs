//! Route Configuration
//!
//! Routes served on the admin HTTP listener.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::{handlers, AdminState};
use crate::infrastructure::metrics::MetricsCollector;

/// `GET /metrics` for a single collector
pub fn metrics_router(collector: Arc<dyn MetricsCollector>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics::metrics))
        .with_state(collector)
}

/// Health probes plus `/metrics`
pub fn admin_router(state: AdminState) -> Router {
    let metrics = metrics_router(state.metrics.clone());

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .with_state(state)
        .merge(metrics)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::NoOpCache;
    use crate::infrastructure::metrics::PrometheusMetrics;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> (AdminState, Arc<PrometheusMetrics>) {
        let metrics = Arc::new(PrometheusMetrics::new("admin").unwrap());
        let state = AdminState {
            metrics: metrics.clone(),
            cache: Arc::new(NoOpCache::new()),
            database: None,
            grpc: None,
        };
        (state, metrics)
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, metrics) = state();
        metrics.record_business_metric("signup");

        let (status, body) = get_body(admin_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"admin_business_operations_total{operation_type="signup"} 1"#));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (state, _) = state();
        let router = admin_router(state);

        let (status, body) = get_body(router.clone(), "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"alive"}"#);

        let (status, body) = get_body(router, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"], serde_json::json!({}));
    }
}
