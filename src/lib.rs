//! # Service Kit
//!
//! Infrastructure adapters for gRPC services, wired together by one
//! initialization routine:
//! - Translations with `Accept-Language` negotiation
//! - gRPC server and named clients with a middleware stack
//! - Redis cache and a sliding-window rate limiter
//! - Prometheus metrics and an admin HTTP listener
//! - PostgreSQL pool with a health monitor
//! - Structured logging mirrored to Sentry
//!
//! ## Module Structure
//!
//! ```text
//! service_kit/
//! +-- config/         Layered configuration (file + VGO__* env)
//! +-- i18n/           Languages and the translator
//! +-- infrastructure/ Cache, database, metrics and rate limiter adapters
//! +-- presentation/   gRPC lifecycle, gRPC middleware, admin HTTP
//! +-- shared/         Errors and request ids
//! +-- telemetry       Logger and Sentry
//! +-- startup         The Kit
//! ```

// Configuration module
pub mod config;

// Translations
pub mod i18n;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - gRPC and admin HTTP
pub mod presentation;

// Shared utilities
pub mod shared;

// Kit initialization
pub mod startup;

// Telemetry and observability
pub mod telemetry;

pub use startup::Kit;
