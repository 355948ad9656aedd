//! HTTP server for the journal gateway.

pub mod config;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod request;
pub mod response;
pub mod stream;

pub use config::{CliArgs, GatewayConfig, TlsPaths};
pub use http::GatewayServer;
