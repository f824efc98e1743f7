//! gRPC Manager
//!
//! One optional server plus the named clients, behind a shared handle.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::response::IntoResponse;
use tokio::sync::Mutex;
use tonic::body::Body;
use tonic::codegen::http::Request;
use tonic::server::NamedService;
use tonic::transport::Channel;
use tower::Service;
use tracing::{error, info};

use super::client::ClientManager;
use super::server::GrpcServer;
use crate::config::{GrpcClientSettings, GrpcSettings};
use crate::presentation::middleware::InterceptorOptions;
use crate::shared::{KitError, KitResult};

fn not_initialized() -> KitError {
    KitError::NotInitialized("gRPC server not initialized, call init_server first".into())
}

#[derive(Debug)]
pub struct GrpcManager {
    settings: GrpcSettings,
    server: Mutex<Option<GrpcServer>>,
    /// Address and serving flag of the bound server, readable while
    /// `server` is locked by a stop
    bound: OnceLock<(SocketAddr, Arc<AtomicBool>)>,
    clients: ClientManager,
}

impl GrpcManager {
    /// Create the manager and register every configured client.
    pub fn new(settings: GrpcSettings) -> Self {
        let clients = ClientManager::new();
        for (name, client) in &settings.clients {
            clients.add_client(name.clone(), client.clone());
        }

        Self {
            settings,
            server: Mutex::new(None),
            bound: OnceLock::new(),
            clients,
        }
    }

    pub fn settings(&self) -> &GrpcSettings {
        &self.settings
    }

    /// Bind the server with the given middleware. Returns the bound address.
    pub async fn init_server(&self, options: InterceptorOptions) -> KitResult<SocketAddr> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(KitError::AlreadyInitialized(
                "gRPC server already initialized".into(),
            ));
        }

        let bound = GrpcServer::bind(self.settings.server.clone(), options).await?;
        let addr = bound.local_addr();
        let _ = self.bound.set((addr, bound.serving_state()));
        *server = Some(bound);

        info!(address = %addr, "gRPC server initialized");
        Ok(addr)
    }

    pub async fn register_service<S>(&self, service: S) -> KitResult<()>
    where
        S: Service<Request<Body>, Error = Infallible> + NamedService + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        self.server
            .lock()
            .await
            .as_mut()
            .ok_or_else(not_initialized)?
            .register_service(service)
    }

    pub async fn start_server(&self) -> KitResult<()> {
        self.server
            .lock()
            .await
            .as_mut()
            .ok_or_else(not_initialized)?
            .start()
    }

    /// Gracefully stop the server; a no-op when none was initialized.
    pub async fn stop_server(&self, timeout: Duration) -> KitResult<()> {
        match self.server.lock().await.as_mut() {
            Some(server) => server.stop(timeout).await,
            None => Ok(()),
        }
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.bound.get().map(|(addr, _)| *addr)
    }

    /// False once a stop has begun, even while it is still draining.
    pub fn is_serving(&self) -> bool {
        self.bound
            .get()
            .is_some_and(|(_, serving)| serving.load(Ordering::Acquire))
    }

    pub async fn client(&self, name: &str) -> KitResult<Channel> {
        self.clients.client(name).await
    }

    pub fn add_client(&self, name: impl Into<String>, settings: GrpcClientSettings) {
        self.clients.add_client(name, settings);
    }

    /// Close the client's channel and forget its configuration.
    pub fn remove_client(&self, name: &str) -> KitResult<()> {
        let result = self.clients.close_client(name);
        self.clients.remove_config(name);
        result
    }

    pub fn list_clients(&self) -> Vec<String> {
        self.clients.list_clients()
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Stop the server, then drop every client.
    pub async fn close(&self, timeout: Duration) -> KitResult<()> {
        let result = self.stop_server(timeout).await;
        if let Err(e) = &result {
            error!(error = %e, "Failed to stop gRPC server");
        }

        self.clients.close_all();
        info!("gRPC manager closed");
        result
    }
}
