//! Presentation Layer
//!
//! gRPC server and clients, their middleware, and the admin HTTP listener.

pub mod grpc;
pub mod http;
pub mod middleware;
