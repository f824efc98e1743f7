//! Kit Integration Tests

mod admin_tests;
mod config_tests;
mod global_tests;
mod grpc_tests;
mod i18n_tests;
