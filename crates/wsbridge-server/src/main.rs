//! wsbridge-server: entry point.
//!
//! Serves the WebSocket date-time echo endpoint and the SSE routes that
//! bridge to it (or to any other upstream speaking the same protocol).
//!
//! # Usage
//!
//! ```text
//! wsbridge-server [OPTIONS]
//!
//! Options:
//!   --server-port <PORT>                     HTTP port [default: 8080]
//!   --server-bind <IP>                       Bind address [default: 0.0.0.0]
//!   --profiles <LIST>                        Comma-separated profiles [default: websocket,sse]
//!   --bridge-websocket-url <URL>             Upstream base URL (required by the SSE routes)
//!   --bridge-websocket-sub-protocol <NAME>   Sub-protocol requested from the upstream
//!   --bridge-connect-timeout <SECS>          Upstream handshake timeout [default: 10]
//!   --bridge-buffer-capacity <N>             Bound the buffered route's queue [default: unbounded]
//!   --config <FILE>                          TOML configuration file
//! ```
//!
//! # Precedence
//!
//! Command-line arguments win over environment variables, which win over the
//! TOML file, which wins over the built-in defaults.
//!
//! | Variable                        | TOML key                                 |
//! |---------------------------------|------------------------------------------|
//! | `SERVER_PORT`                   | `[server] port`                          |
//! | `SERVER_BIND`                   | `[server] bind`                          |
//! | `ACTIVE_PROFILES`               | `[server] profiles`                      |
//! | `BRIDGE_WEBSOCKET_URL`          | `[bridge.websocket] url`                 |
//! | `BRIDGE_WEBSOCKET_SUB_PROTOCOL` | `[bridge.websocket] sub-protocol`        |
//! | `BRIDGE_CONNECT_TIMEOUT`        | `[bridge.websocket] connect-timeout-secs`|
//! | `BRIDGE_BUFFER_CAPACITY`        | `[bridge] buffer-capacity`               |
//! | `WSBRIDGE_CONFIG`               | (path of the file itself)                |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use wsbridge_server::domain::config::{DEFAULT_BIND, DEFAULT_PORT};
use wsbridge_server::domain::{BridgeSettings, Features, ServerConfig};
use wsbridge_server::infrastructure::{run_server, ConfigError, FileConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket to Server-Sent-Events bridge.
///
/// Every setting is optional here so that unset values can fall back to the
/// configuration file before the defaults apply.
#[derive(Debug, Parser)]
#[command(
    name = "wsbridge-server",
    about = "Republishes an upstream WebSocket exchange as Server-Sent Events",
    version
)]
struct Cli {
    /// HTTP port to listen on [default: 8080].
    #[arg(long, env = "SERVER_PORT")]
    server_port: Option<u16>,

    /// IP address to bind to [default: 0.0.0.0].
    #[arg(long, env = "SERVER_BIND")]
    server_bind: Option<String>,

    /// Active profiles, comma separated: `websocket`, `sse`.
    #[arg(long, env = "ACTIVE_PROFILES", value_delimiter = ',')]
    profiles: Option<Vec<String>>,

    /// Base URL of the upstream WebSocket server, e.g. `http://localhost:8080`.
    ///
    /// `/ws/datetime` is appended to it.  Without it the SSE routes answer 500.
    #[arg(long, env = "BRIDGE_WEBSOCKET_URL")]
    bridge_websocket_url: Option<String>,

    /// Sub-protocol requested from the upstream during the handshake.
    #[arg(long, env = "BRIDGE_WEBSOCKET_SUB_PROTOCOL")]
    bridge_websocket_sub_protocol: Option<String>,

    /// Upstream handshake timeout in seconds [default: 10].
    #[arg(long, env = "BRIDGE_CONNECT_TIMEOUT")]
    bridge_connect_timeout: Option<u64>,

    /// Maximum number of replies queued by `/sse/datetime` [default: unbounded].
    ///
    /// When the queue is full the stream ends with an error event.
    #[arg(long, env = "BRIDGE_BUFFER_CAPACITY")]
    bridge_buffer_capacity: Option<usize>,

    /// TOML configuration file.
    #[arg(long, env = "WSBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the parsed arguments over `file` and the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid bind address, an upstream URL that is
    /// not an HTTP(S) or WebSocket URL, or a zero timeout or capacity.
    fn into_server_config(self, file: FileConfig) -> Result<ServerConfig, ConfigError> {
        let port = self.server_port.or(file.server.port).unwrap_or(DEFAULT_PORT);
        let bind = self
            .server_bind
            .or(file.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let ip: IpAddr = bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(format!("{bind}:{port}")))?;

        let features = match self.profiles.or(file.server.profiles) {
            Some(profiles) => Features::from_profiles(profiles),
            None => Features::default(),
        };

        let websocket_url = non_empty(self.bridge_websocket_url.or(file.bridge.websocket.url))
            .map(parse_upstream_url)
            .transpose()?;

        let connect_timeout_secs = self
            .bridge_connect_timeout
            .or(file.bridge.websocket.connect_timeout_secs);
        let connect_timeout = match connect_timeout_secs {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "bridge.websocket.connect-timeout-secs",
                    reason: "must be at least 1 second".into(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => BridgeSettings::default().connect_timeout,
        };

        let buffer_capacity = self.bridge_buffer_capacity.or(file.bridge.buffer_capacity);
        if buffer_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "bridge.buffer-capacity",
                reason: "must be at least 1".into(),
            });
        }

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, port),
            features,
            bridge: BridgeSettings {
                websocket_url,
                sub_protocol: non_empty(
                    self.bridge_websocket_sub_protocol
                        .or(file.bridge.websocket.sub_protocol),
                ),
                connect_timeout,
                buffer_capacity,
            },
        })
    }
}

/// Blank values (e.g. `BRIDGE_WEBSOCKET_URL=`) count as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_upstream_url(value: String) -> Result<Url, ConfigError> {
    let url = match Url::parse(value.trim()) {
        Ok(url) => url,
        Err(source) => return Err(ConfigError::InvalidUrl { value, source }),
    };
    // Reject what the routes would reject, but at startup.
    wsbridge_core::datetime_endpoint(&url).map_err(|e| ConfigError::InvalidValue {
        key: "bridge.websocket.url",
        reason: e.to_string(),
    })?;
    Ok(url)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` selects the level; `info` when absent or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("failed to load configuration file {}", path.display()))?,
        None => FileConfig::default(),
    };
    let config = cli
        .into_server_config(file)
        .context("invalid configuration")?;

    info!(
        "wsbridge-server starting: bind={}, upstream={}",
        config.bind_addr,
        config
            .bridge
            .websocket_url
            .as_ref()
            .map_or("<unset>", Url::as_str)
    );
    if config.features.sse && config.bridge.websocket_url.is_none() {
        warn!("bridge.websocket.url is not set; the SSE routes will answer 500");
    }

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("wsbridge-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
