//! Prometheus exposition handler.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse};

use crate::infrastructure::metrics::MetricsCollector;

/// Content type of the Prometheus text format
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn metrics(State(collector): State<Arc<dyn MetricsCollector>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], collector.gather())
}
