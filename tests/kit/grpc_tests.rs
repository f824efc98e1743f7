//! gRPC Server Tests
//!
//! Calls go through a real listener and a client channel from the kit's own
//! client manager. No services are registered, so every call ends in the
//! router's `Unimplemented` fallback unless middleware rejects it first.

use std::time::Duration;

use service_kit::config::GrpcClientSettings;
use service_kit::Kit;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Code, Status};

use crate::common::kit_config;

const METHOD: &str = "/kit.test.Echo/Say";

async fn call(channel: Channel) -> Status {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready().await.unwrap();
    grpc.unary::<(), (), _>(
        tonic::Request::new(()),
        PathAndQuery::from_static(METHOD),
        ProstCodec::default(),
    )
    .await
    .unwrap_err()
}

async fn serving_kit(namespace: &str, extra: &str) -> Kit {
    let kit = Kit::init(kit_config(namespace, extra)).await.unwrap();
    let addr = kit
        .grpc()
        .init_server(kit.interceptor_options())
        .await
        .unwrap();
    kit.grpc().start_server().await.unwrap();
    kit.grpc()
        .add_client("self", GrpcClientSettings::with_target(addr.to_string()));
    kit
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let kit = serving_kit("kit_grpc_unknown", "").await;

    let channel = kit.grpc().client("self").await.unwrap();
    let status = call(channel).await;
    assert_eq!(status.code(), Code::Unimplemented);

    let text = kit.metrics().gather();
    assert!(text.contains(METHOD));
    assert!(text.contains("status=\"error\""));

    kit.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!kit.grpc().is_serving());
}

#[tokio::test]
async fn test_rate_limit_rejects_over_limit() {
    let kit = serving_kit(
        "kit_grpc_limited",
        "rate_limit:\n  limit: 1\n  window_secs: 60\n",
    )
    .await;

    let channel = kit.grpc().client("self").await.unwrap();
    assert_eq!(call(channel.clone()).await.code(), Code::Unimplemented);

    let status = call(channel).await;
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert!(status.message().contains("ip:127.0.0.1"));

    kit.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_disabled_rate_limit_admits_everything() {
    let kit = serving_kit(
        "kit_grpc_unlimited",
        "rate_limit:\n  enabled: false\n  limit: 1\n",
    )
    .await;

    let channel = kit.grpc().client("self").await.unwrap();
    for _ in 0..3 {
        assert_eq!(call(channel.clone()).await.code(), Code::Unimplemented);
    }

    kit.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drops_clients() {
    let kit = serving_kit("kit_grpc_clients", "").await;
    kit.grpc().client("self").await.unwrap();
    assert!(kit.grpc().clients().is_connected("self"));

    kit.shutdown(Duration::from_secs(5)).await.unwrap();

    assert!(kit.grpc().list_clients().is_empty());
    assert!(kit.grpc().client("self").await.is_err());
}
