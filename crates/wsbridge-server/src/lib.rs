//! wsbridge-server library crate.
//!
//! HTTP service that republishes an upstream WebSocket exchange as
//! Server-Sent Events, plus the WebSocket echo endpoint it can bridge to.
//!
//! # Architecture
//!
//! ```text
//! HTTP client (SSE)                 WebSocket client
//!        ↕                                 ↕
//! [wsbridge-server]
//!   ├── domain/           ServerConfig, Features (from profiles)
//!   ├── application/      echo protocol, index page
//!   └── infrastructure/
//!         ├── http_server  axum router + serve loop
//!         ├── sse_routes   /sse/datetime (buffered), /custom/sse/datetime (direct)
//!         ├── publisher    stream → text/event-stream
//!         ├── ws_echo      /ws/datetime
//!         └── config_file  TOML file
//!        ↕
//! upstream WebSocket server (wsbridge-core executor)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and constants from `wsbridge-core`.
//! - `infrastructure` depends on all other layers plus `axum` and
//!   `wsbridge-core`.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: echo protocol and index page.
pub mod application;

/// Infrastructure layer: HTTP server, routes and configuration file.
pub mod infrastructure;
