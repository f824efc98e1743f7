//! HTTP Handlers
//!
//! Handlers for the admin listener.

pub mod health;
pub mod metrics;
