//! Admin HTTP Tests

use axum::http::StatusCode;
use service_kit::Kit;

use crate::common::{body_text, get, kit_config};

#[tokio::test]
async fn test_health_endpoints() {
    let kit = Kit::init(kit_config("kit_admin_health", "")).await.unwrap();
    let router = kit.admin_router();

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&router, "/health/live").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("alive"));
}

#[tokio::test]
async fn test_readiness_reports_grpc_only() {
    let kit = Kit::init(kit_config("kit_admin_ready", "")).await.unwrap();

    let response = get(&kit.admin_router(), "/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["grpc"]["serving"], false);
    assert!(json["checks"].get("database").is_none());
    assert!(json["checks"].get("redis").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_kit_collector() {
    let kit = Kit::init(kit_config("kit_admin_metrics", "")).await.unwrap();
    kit.metrics().record_business_metric("checkout");

    let response = get(&kit.admin_router(), "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.contains("kit_admin_metrics_business_operations_total"));
    assert!(text.contains("operation_type=\"checkout\""));
}
