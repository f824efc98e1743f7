//! gRPC Lifecycle
//!
//! Server and client management on top of tonic:
//! - [`GrpcServer`]: bound listener, route table, graceful stop
//! - [`ClientManager`]: named, lazily connected channels
//! - [`GrpcManager`]: both behind one handle
//! - retry policy for client calls (see [`RetrySettings::retry`])
//! - `with_message_limits!`: configured message sizes for generated code
//!
//! [`RetrySettings::retry`]: crate::config::RetrySettings::retry

pub mod client;
pub mod manager;
pub mod retry;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{build_endpoint, normalize_target, ClientManager};
pub use manager::GrpcManager;
pub use retry::{is_retryable, RETRYABLE_CODES};
pub use server::GrpcServer;

/// Apply `max_recv_msg_size` and `max_send_msg_size` from server or client
/// settings to a tonic-generated server or client, or to a raw
/// `tonic::server::Grpc` / `tonic::client::Grpc`.
///
/// ```ignore
/// let users = with_message_limits!(UsersServer::new(users), settings.grpc.server);
/// kit.grpc().register_service(users).await?;
/// ```
#[macro_export]
macro_rules! with_message_limits {
    ($target:expr, $settings:expr) => {{
        let settings = &$settings;
        $target
            .max_decoding_message_size(settings.max_recv_msg_size)
            .max_encoding_message_size(settings.max_send_msg_size)
    }};
}
