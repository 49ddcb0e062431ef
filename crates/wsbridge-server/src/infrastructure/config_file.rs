//! Optional TOML configuration file.
//!
//! Every key is optional; values given here are overridden by command-line
//! arguments and environment variables, and fall back to the built-in
//! defaults when absent.
//!
//! ```toml
//! [server]
//! port = 8080
//! bind = "0.0.0.0"
//! profiles = ["websocket", "sse"]
//!
//! [bridge]
//! buffer-capacity = 256
//!
//! [bridge.websocket]
//! url = "http://localhost:8080"
//! sub-protocol = "datetime.v1"
//! connect-timeout-secs = 10
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Bind host and port do not form a socket address.
    #[error("invalid bind address: '{0}'")]
    InvalidBindAddress(String),

    /// The upstream base URL is not a URL.
    #[error("invalid bridge.websocket.url '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    /// A numeric setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub bridge: BridgeSection,
}

/// `[server]`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub profiles: Option<Vec<String>>,
}

/// `[bridge]`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct BridgeSection {
    pub buffer_capacity: Option<usize>,
    pub websocket: WebSocketSection,
}

/// `[bridge.websocket]`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct WebSocketSection {
    pub url: Option<String>,
    pub sub_protocol: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}
