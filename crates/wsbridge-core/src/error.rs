//! Error types shared by the executor, the sink and both bridges.
//!
//! [`BridgeError`] is the error carried by every published stream.  Client
//! disconnects are absent: a consumer going away is modelled as
//! the output stream being dropped, which runs the cancellation path instead
//! of an error path.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the bridging core.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The upstream WebSocket handshake failed (network error, non-101
    /// response, sub-protocol mismatch, unsupported scheme).
    #[error("WebSocket handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },

    /// The handshake did not complete within the configured timeout.
    #[error("WebSocket handshake with {endpoint} timed out after {timeout:?}")]
    HandshakeTimeout { endpoint: String, timeout: Duration },

    /// The configured sub-protocol is not a valid header value.
    #[error("invalid WebSocket sub-protocol: {0:?}")]
    InvalidSubProtocol(String),

    /// A read or write failed on an established session.
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// A frame was written after the session had been closed.
    #[error("WebSocket session already closed")]
    SessionClosed,

    /// The peer sent something the exchange does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A required configuration property is absent.
    #[error("missing configuration property: '{0}'")]
    MissingConfiguration(&'static str),

    /// The upstream base URL cannot be turned into a WebSocket endpoint.
    #[error("invalid WebSocket endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// A bounded bridge sink filled up.
    #[error("bridge buffer overflow: capacity of {capacity} items exceeded")]
    BufferOverflow { capacity: usize },

    /// The upstream exchange panicked before reaching a terminal state.
    #[error("upstream exchange panicked: {0}")]
    UpstreamPanicked(String),

    /// A bridge sink was subscribed to more than once.
    #[error("bridge sink already has a subscriber")]
    AlreadySubscribed,
}

/// Why [`crate::BridgeSink::emit`] (or a terminal signal) was not accepted.
///
/// `Terminated` and `Cancelled` are no-ops: the item is discarded and the
/// sink state is unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    /// The sink already completed or failed.
    #[error("sink already terminated")]
    Terminated,

    /// The consumer dropped its stream.
    #[error("sink consumer cancelled")]
    Cancelled,

    /// A bounded sink was full; the sink has been failed with
    /// [`BridgeError::BufferOverflow`].
    #[error("sink buffer full")]
    Overflow,
}
