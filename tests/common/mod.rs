//! Common Test Utilities
//!
//! Configuration fixtures and request helpers.

use std::path::Path;

use axum::{body::Body, http::Request, Router};
use config::{Config, File, FileFormat};
use tempfile::TempDir;
use tower::ServiceExt;

/// Logging to stdout only, Prometheus under `namespace`, gRPC on an
/// ephemeral loopback port. `extra` is appended verbatim.
pub fn kit_yaml(namespace: &str, extra: &str) -> String {
    format!(
        "log:\n  level: warn\n  directory: \"\"\n  stdout: true\n\
         metrics:\n  namespace: {namespace}\n\
         grpc:\n  server:\n    host: 127.0.0.1\n    port: 0\n\
         {extra}"
    )
}

/// Build a raw configuration without touching the filesystem.
pub fn kit_config(namespace: &str, extra: &str) -> Config {
    Config::builder()
        .add_source(File::from_str(&kit_yaml(namespace, extra), FileFormat::Yaml))
        .build()
        .unwrap()
}

/// Write `content` as `config.yaml` into a fresh directory.
///
/// Returns the directory guard and the file path.
pub fn write_config(content: &str) -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, content).unwrap();
    (dir, path.to_string_lossy().into_owned())
}

/// Write `<code>.json` translation files into a fresh directory.
pub fn write_locales(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (code, json) in files {
        write_file(dir.path(), &format!("{code}.json"), json);
    }
    dir
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// Make a GET request against a router
pub async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Read a response body as UTF-8 text
pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
