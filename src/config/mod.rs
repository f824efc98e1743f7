//! # Configuration Module
//!
//! This module handles kit configuration loading and management.
//! Configuration is loaded from:
//! - A configuration file (`config/config.yaml` by default, or the path in
//!   `SERVICE_KIT_CONFIG`, given without extension)
//! - Environment variables (prefixed with VGO__)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use service_kit::config::{load_config, Settings};
//!
//! let raw = load_config("config/config")?;
//! let settings = Settings::from_config(&raw)?;
//! println!("gRPC will listen on {}", settings.grpc.server.addr());
//! ```

mod settings;

pub use settings::*;
