//! Infrastructure Layer
//!
//! Adapters over external services:
//! - Cache (Redis)
//! - Database (PostgreSQL)
//! - Metrics (Prometheus)
//! - Rate limiting (Redis or in-memory)

pub mod cache;
pub mod database;
pub mod metrics;
pub mod ratelimit;
