//! Process-wide Kit Tests
//!
//! The global kit can only be set once per process, so everything lives in
//! a single test.

use service_kit::infrastructure::metrics;
use service_kit::shared::KitError;
use service_kit::startup::{global, init_global};

use crate::common::kit_config;

#[tokio::test]
async fn test_global_kit_initializes_once() {
    assert!(matches!(global(), Err(KitError::NotInitialized(_))));

    let kit = init_global(kit_config("kit_global", "")).await.unwrap();
    assert!(std::ptr::eq(kit, global().unwrap()));

    let err = init_global(kit_config("kit_global_again", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, KitError::AlreadyInitialized(_)));

    // The kit's collector backs the global metric helpers
    metrics::record_business_metric("global_op");
    assert!(kit.metrics().gather().contains("operation_type=\"global_op\""));
}
