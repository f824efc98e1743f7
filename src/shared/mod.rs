//! Shared Utilities
//!
//! Common utilities used across all adapters.

pub mod error;
pub mod request_id;

pub use error::{ErrorResponse, KitError, KitResult};
pub use request_id::{generate_request_id, metadata_value, request_id, REQUEST_ID_HEADER};
