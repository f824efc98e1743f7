//! Admin HTTP
//!
//! Health probes and Prometheus exposition on a separate listener.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::infrastructure::cache::Cache;
use crate::infrastructure::database::PostgresStore;
use crate::infrastructure::metrics::MetricsCollector;
use crate::presentation::grpc::GrpcManager;

pub use routes::{admin_router, metrics_router};

/// State shared by the admin handlers
#[derive(Clone)]
pub struct AdminState {
    pub metrics: Arc<dyn MetricsCollector>,
    pub cache: Arc<dyn Cache>,
    pub database: Option<Arc<PostgresStore>>,
    pub grpc: Option<Arc<GrpcManager>>,
}
