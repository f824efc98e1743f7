//! # Service Kit
//!
//! Runs the kit as a standalone process:
//! - Configuration loading (`SERVICE_KIT_CONFIG`, `VGO__*` overrides)
//! - Logging, metrics, cache, rate limiter, translator and database
//! - Admin HTTP listener (`/health`, `/metrics`)
//! - gRPC server with the standard middleware
//!
//! Runs until Ctrl-C, then shuts everything down.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use service_kit::config::{config_path, load_config};
use service_kit::startup;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = load_config(&path).with_context(|| format!("failed to load config from {path}"))?;

    let kit = startup::init_global(config).await?;
    let settings = kit.settings();

    info!(
        environment = %settings.environment,
        grpc = %settings.grpc.server.addr(),
        "Configuration loaded"
    );

    let grpc_addr = kit.grpc().init_server(kit.interceptor_options()).await?;
    kit.grpc().start_server().await?;
    info!(address = %grpc_addr, "gRPC server ready");

    let (admin_stop, admin_signal) = tokio::sync::oneshot::channel::<()>();
    let admin = if settings.http.enabled {
        let listener = TcpListener::bind(settings.http.addr())
            .await
            .with_context(|| format!("failed to bind admin listener on {}", settings.http.addr()))?;
        info!(address = %listener.local_addr()?, "Admin HTTP listener ready");

        let router = kit.admin_router();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_signal.await;
                })
                .await
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = admin_stop.send(());
    if let Some(admin) = admin {
        admin.await??;
    }

    kit.shutdown(SHUTDOWN_TIMEOUT).await?;
    Ok(())
}
