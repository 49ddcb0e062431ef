//! Server configuration types.
//!
//! [`ServerConfig`] holds every runtime setting once all sources (CLI,
//! environment, TOML file, defaults) have been merged.  Merging happens in
//! `main.rs`; this module only describes the result and its defaults.
//!
//! The active profiles are not kept as strings: they are turned into
//! [`Features`] flags up front and the router is built from those flags.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;
use url::Url;
use wsbridge_core::executor::DEFAULT_CONNECT_TIMEOUT;
use wsbridge_core::{datetime_endpoint, BridgeError, ExecutorConfig};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Profile enabling the WebSocket echo endpoint.
pub const WEBSOCKET_PROFILE: &str = "websocket";

/// Profile enabling both SSE bridge routes.
pub const SSE_PROFILE: &str = "sse";

/// Profiles active when none are configured.
pub const DEFAULT_PROFILES: [&str; 2] = [WEBSOCKET_PROFILE, SSE_PROFILE];

/// Name of the upstream base URL property, as reported when it is missing.
pub const WEBSOCKET_URL_PROPERTY: &str = "bridge.websocket.url";

// ── Features ──────────────────────────────────────────────────────────────────

/// Route groups enabled for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// `GET /ws/datetime`.
    pub websocket: bool,
    /// `GET /sse/datetime` and `GET /custom/sse/datetime`.
    pub sse: bool,
}

impl Features {
    /// Every route group enabled.
    pub fn all() -> Self {
        Self {
            websocket: true,
            sse: true,
        }
    }

    /// Reads profile names; unknown names are logged and ignored.
    ///
    /// Names are matched case-insensitively after trimming, so
    /// `"websocket, SSE"` split on commas enables both groups.
    pub fn from_profiles<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut features = Self {
            websocket: false,
            sse: false,
        };
        for profile in profiles {
            let name = profile.as_ref().trim();
            if name.eq_ignore_ascii_case(WEBSOCKET_PROFILE) {
                features.websocket = true;
            } else if name.eq_ignore_ascii_case(SSE_PROFILE) {
                features.sse = true;
            } else if !name.is_empty() {
                warn!("ignoring unknown profile '{name}'");
            }
        }
        features
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::from_profiles(DEFAULT_PROFILES)
    }
}

// ── Bridge settings ───────────────────────────────────────────────────────────

/// Settings for the upstream side of the SSE routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Base URL of the upstream WebSocket server (`http`, `https`, `ws` or
    /// `wss`).  Optional at startup; the SSE routes fail with HTTP 500 while
    /// it is absent.
    pub websocket_url: Option<Url>,

    /// Sub-protocol requested from the upstream.
    pub sub_protocol: Option<String>,

    /// Upper bound on the upstream handshake.
    pub connect_timeout: Duration,

    /// Capacity of the buffered route's queue; `None` means unbounded.
    pub buffer_capacity: Option<usize>,
}

impl BridgeSettings {
    /// The `/ws/datetime` endpoint under the configured base URL.
    ///
    /// # Errors
    ///
    /// [`BridgeError::MissingConfiguration`] when no base URL is configured,
    /// [`BridgeError::InvalidEndpoint`] when it cannot be mapped to a
    /// WebSocket URL.
    pub fn datetime_endpoint(&self) -> Result<Url, BridgeError> {
        let base = self
            .websocket_url
            .as_ref()
            .ok_or(BridgeError::MissingConfiguration(WEBSOCKET_URL_PROPERTY))?;
        datetime_endpoint(base)
    }

    /// Executor settings derived from these bridge settings.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            sub_protocol: self.sub_protocol.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            websocket_url: None,
            sub_protocol: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer_capacity: None,
        }
    }
}

// ── Server config ─────────────────────────────────────────────────────────────

/// All runtime configuration for the server.
///
/// Built once at startup and shared through an `Arc` in the router state.
///
/// # Example
///
/// ```rust
/// use wsbridge_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert!(cfg.features.websocket && cfg.features.sse);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// Route groups to mount.
    pub features: Features,

    /// Upstream settings for the SSE routes.
    pub bridge: BridgeSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            features: Features::default(),
            bridge: BridgeSettings::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
