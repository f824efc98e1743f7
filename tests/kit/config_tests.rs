//! Configuration Loading Tests

use pretty_assertions::assert_eq;
use service_kit::config::{load_config, RateLimitBackend, Settings};
use tokio_test::{assert_err, assert_ok};

use crate::common::write_config;

#[test]
fn test_load_config_from_file() {
    let (_dir, path) = write_config(
        "environment: staging\n\
         grpc:\n  server:\n    port: 7001\n  clients:\n    users:\n      target: users:50051\n\
         rate_limit:\n  type: redis\n  limit: 20\n",
    );

    let config = assert_ok!(load_config(&path));
    let settings = assert_ok!(Settings::from_config(&config));

    assert_eq!(settings.environment, "staging");
    assert_eq!(settings.grpc.server.port, 7001);
    assert_eq!(settings.grpc.clients["users"].target, "users:50051");
    assert_eq!(settings.rate_limit.backend, RateLimitBackend::Redis);
    assert_eq!(settings.rate_limit.limit, 20);
    // Untouched sections keep their defaults
    assert_eq!(settings.rate_limit.window_secs, 60);
    assert!(settings.redis.is_none());
}

#[test]
fn test_env_overrides_file() {
    let (_dir, path) = write_config("http:\n  port: 9000\n");

    std::env::set_var("VGO__HTTP__PORT", "9191");
    let config = load_config(&path);
    std::env::remove_var("VGO__HTTP__PORT");

    let settings = assert_ok!(Settings::from_config(&assert_ok!(config)));
    assert_eq!(settings.http.port, 9191);
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.yaml");
    assert_err!(load_config(&path.to_string_lossy()));
}
