//! Kit Error Types
//!
//! Centralized error handling for every adapter, with conversions into
//! gRPC statuses and Axum responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Result alias used throughout the crate
pub type KitResult<T> = Result<T, KitError>;

/// Kit error type
#[derive(Debug, thiserror::Error)]
pub enum KitError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC status: {0}")]
    Status(#[from] tonic::Status),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl From<KitError> for tonic::Status {
    fn from(err: KitError) -> Self {
        match err {
            KitError::Status(status) => status,
            KitError::NotFound(msg) => tonic::Status::not_found(msg),
            KitError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            KitError::NotInitialized(msg) => tonic::Status::failed_precondition(msg),
            other => {
                tracing::error!("Internal error: {}", other);
                tonic::Status::internal("internal server error")
            }
        }
    }
}

impl IntoResponse for KitError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            KitError::NotFound(msg) => (StatusCode::NOT_FOUND, 10001, msg.clone()),
            KitError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, 10002, msg.clone()),
            KitError::NotInitialized(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, 10003, msg.clone())
            }
            KitError::Status(s) if s.code() == tonic::Code::ResourceExhausted => {
                (StatusCode::TOO_MANY_REQUESTS, 10006, "Rate limited".into())
            }
            other => {
                tracing::error!("Internal error: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
        };

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_grpc_not_found() {
        let status: tonic::Status = KitError::NotFound("client x".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert_eq!(status.message(), "client x");
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let status: tonic::Status = KitError::Internal("secret detail".into()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert_eq!(status.message(), "internal server error");
    }

    #[test]
    fn test_status_passthrough() {
        let status: tonic::Status =
            KitError::Status(tonic::Status::resource_exhausted("slow down")).into();
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
    }

    #[test]
    fn test_http_response_status() {
        let response = KitError::InvalidArgument("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
