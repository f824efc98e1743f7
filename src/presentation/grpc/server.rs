//! gRPC Server
//!
//! Owns the bound listener, the route table and the serve task.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::Body;
use tonic::codegen::http::Request;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tower::Service;
use tracing::{info, warn};

use crate::config::{GrpcServerSettings, TlsSettings};
use crate::presentation::middleware::InterceptorOptions;
use crate::shared::{KitError, KitResult};

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

pub struct GrpcServer {
    settings: GrpcServerSettings,
    options: InterceptorOptions,
    tls: Option<ServerTlsConfig>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    routes: RoutesBuilder,
    services: Vec<&'static str>,
    running: Option<Running>,
    serving: Arc<AtomicBool>,
}

impl std::fmt::Debug for GrpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcServer")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .field("services", &self.services)
            .field("running", &self.running.is_some())
            .finish()
    }
}

/// Read a PEM file, naming it in the error.
pub(crate) async fn read_pem(kind: &str, path: &str) -> KitResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| KitError::Tls(format!("failed to read {kind} file {path}: {e}")))
}

async fn load_server_tls(tls: &TlsSettings) -> KitResult<ServerTlsConfig> {
    if tls.cert_file.is_empty() || tls.key_file.is_empty() {
        return Err(KitError::Tls(
            "cert_file and key_file are required for server TLS".into(),
        ));
    }

    let cert = read_pem("cert", &tls.cert_file).await?;
    let key = read_pem("key", &tls.key_file).await?;
    let mut config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if !tls.ca_file.is_empty() {
        let ca = read_pem("ca", &tls.ca_file).await?;
        config = config.client_ca_root(Certificate::from_pem(ca));
    }
    if tls.insecure_skip_verify {
        warn!("insecure_skip_verify has no effect on a gRPC server");
    }

    Ok(config)
}

impl GrpcServer {
    /// Bind the listener and load TLS material. Nothing is served until
    /// [`GrpcServer::start`].
    pub async fn bind(settings: GrpcServerSettings, options: InterceptorOptions) -> KitResult<Self> {
        let addr = settings.addr();

        let tls = match settings.tls.as_ref().filter(|t| t.enabled) {
            Some(tls) => Some(load_server_tls(tls).await?),
            None => None,
        };

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            KitError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to listen on {addr}: {e}"),
            ))
        })?;
        let local_addr = listener.local_addr()?;

        info!(address = %local_addr, tls = tls.is_some(), "gRPC server bound");

        Ok(Self {
            settings,
            options,
            tls,
            listener: Some(listener),
            local_addr,
            routes: RoutesBuilder::default(),
            services: Vec::new(),
            running: None,
            serving: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Add a tonic service to the route table. Must be called before
    /// [`GrpcServer::start`].
    pub fn register_service<S>(&mut self, service: S) -> KitResult<()>
    where
        S: Service<Request<Body>, Error = Infallible> + NamedService + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        if self.listener.is_none() {
            return Err(KitError::AlreadyInitialized(format!(
                "cannot register {} on a started server",
                S::NAME
            )));
        }

        self.routes.add_service(service);
        self.services.push(S::NAME);
        info!(service = S::NAME, "Registered gRPC service");
        Ok(())
    }

    /// Spawn the serve loop on the bound listener.
    pub fn start(&mut self) -> KitResult<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| KitError::AlreadyInitialized("gRPC server already started".into()))?;

        let keepalive = &self.settings.keepalive;
        let mut builder = Server::builder()
            .http2_keepalive_interval(Some(keepalive.time()))
            .http2_keepalive_timeout(Some(keepalive.timeout()));

        if let Some(timeout) = self.settings.request_timeout() {
            builder = builder.timeout(timeout);
        }

        if let Some(tls) = self.tls.clone() {
            builder = builder.tls_config(tls)?;
        }

        let routes = std::mem::take(&mut self.routes).routes();
        let router = builder.layer(self.options.layer()).add_routes(routes);

        let (shutdown, signal) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);
        let serving = self.serving.clone();
        serving.store(true, Ordering::Release);
        let handle = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = signal.await;
                })
                .await;
            serving.store(false, Ordering::Release);
            result
        });

        info!(
            address = %self.local_addr,
            tls_enabled = self.tls.is_some(),
            services = ?self.services,
            "Starting gRPC server"
        );

        self.running = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Stop accepting calls and wait up to `timeout` for in-flight calls.
    ///
    /// On timeout the serve task is aborted and
    /// [`KitError::ShutdownTimeout`] is returned. Stopping a server that is
    /// not running is a no-op.
    pub async fn stop(&mut self, timeout: Duration) -> KitResult<()> {
        let Some(Running { shutdown, mut handle }) = self.running.take() else {
            return Ok(());
        };

        info!("Stopping gRPC server");
        self.serving.store(false, Ordering::Release);
        let _ = shutdown.send(());

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => {
                info!("gRPC server stopped gracefully");
                result.map_err(KitError::from)
            }
            Ok(Err(e)) => Err(KitError::Internal(format!("gRPC server task failed: {e}"))),
            Err(_) => {
                warn!(timeout = ?timeout, "gRPC server stop timed out, forcing stop");
                handle.abort();
                Err(KitError::ShutdownTimeout(timeout))
            }
        }
    }

    /// True from [`GrpcServer::start`] until a stop begins or the serve
    /// loop exits.
    pub fn is_running(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Shared view of [`GrpcServer::is_running`] that needs no access to
    /// the server.
    pub fn serving_state(&self) -> Arc<AtomicBool> {
        self.serving.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn settings(&self) -> &GrpcServerSettings {
        &self.settings
    }

    /// Names of the registered services.
    pub fn services(&self) -> &[&'static str] {
        &self.services
    }
}
