//! Infrastructure layer for wsbridge-server.
//!
//! Everything that touches the network or the file system:
//!
//! - `http_server`: axum router, shared state, serve loop
//! - `sse_routes`: the two SSE bridge routes
//! - `publisher`: item stream → SSE response
//! - `ws_echo`: the `/ws/datetime` echo endpoint
//! - `config_file`: the optional TOML configuration file

pub mod config_file;
pub mod http_server;
pub mod publisher;
pub mod sse_routes;
pub mod ws_echo;

pub use config_file::{ConfigError, FileConfig};
pub use http_server::{router, run_server, serve, AppState};
