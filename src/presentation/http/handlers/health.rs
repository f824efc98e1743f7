//! Health Check Handlers
//!
//! Liveness and readiness probes for the admin listener.
//!
//! # Endpoints
//! - `GET /health` - Basic health check
//! - `GET /health/live` - Liveness probe (is the process running?)
//! - `GET /health/ready` - Readiness probe (are the backing services reachable?)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::Instant;

use crate::presentation::http::AdminState;

/// Process start time for uptime calculation
static STARTED: Lazy<Instant> = Lazy::new(Instant::now);
static STARTED_AT: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Pin the start time (call during startup)
pub fn init_start_time() {
    Lazy::force(&STARTED);
    Lazy::force(&STARTED_AT);
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: HealthChecks,
}

/// Checks for the services this process was configured with
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ServiceHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ServiceHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcHealth>,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    fn timed(start: Instant, degraded_after_ms: u64) -> Self {
        let latency = start.elapsed().as_millis() as u64;
        Self {
            status: if latency < degraded_after_ms {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            latency_ms: Some(latency),
            message: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrpcHealth {
    pub serving: bool,
    pub clients: usize,
}

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// Readiness probe; 503 when the database is unreachable
pub async fn readiness(State(state): State<AdminState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let redis = check_redis(&state).await;
    let grpc = match &state.grpc {
        Some(grpc) => Some(GrpcHealth {
            serving: grpc.is_serving(),
            clients: grpc.list_clients().len(),
        }),
        None => None,
    };

    let status = determine_overall_status(database.as_ref(), redis.as_ref());

    let response = ReadinessResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: STARTED.elapsed().as_secs(),
        started_at: STARTED_AT.to_rfc3339(),
        checks: HealthChecks {
            database,
            redis,
            grpc,
        },
    };

    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

async fn check_database(state: &AdminState) -> Option<ServiceHealth> {
    let store = state.database.as_ref()?;
    let start = Instant::now();
    Some(match store.health_check().await {
        Ok(()) => ServiceHealth::timed(start, 100),
        Err(e) => ServiceHealth::failed(format!("Database connection failed: {}", e)),
    })
}

/// Only a Redis-backed cache is checked; the no-op cache has nothing to reach.
async fn check_redis(state: &AdminState) -> Option<ServiceHealth> {
    if state.cache.connection().is_none() {
        return None;
    }
    let start = Instant::now();
    Some(match state.cache.ping().await {
        Ok(()) => ServiceHealth::timed(start, 50),
        Err(e) => ServiceHealth::failed(format!("Redis connection failed: {}", e)),
    })
}

fn determine_overall_status(
    database: Option<&ServiceHealth>,
    redis: Option<&ServiceHealth>,
) -> HealthStatus {
    let database = database.map(|h| h.status);
    let redis = redis.map(|h| h.status);

    if database == Some(HealthStatus::Unhealthy) {
        return HealthStatus::Unhealthy;
    }

    if database == Some(HealthStatus::Degraded)
        || matches!(redis, Some(HealthStatus::Unhealthy | HealthStatus::Degraded))
    {
        return HealthStatus::Degraded;
    }

    HealthStatus::Healthy
}
