//! Domain layer for wsbridge-server.
//!
//! Plain configuration types: no sockets, no file access, no async.  The
//! infrastructure layer and `main.rs` are responsible for filling them in.

pub mod config;

pub use config::{BridgeSettings, Features, ServerConfig, WEBSOCKET_URL_PROPERTY};
