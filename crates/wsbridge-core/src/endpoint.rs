//! Upstream endpoint derivation.
//!
//! The configured base URL may be written with an HTTP scheme
//! (`http://host:8080`) or a WebSocket one (`ws://host:8080`).  Endpoints are
//! built by appending path segments to whatever path the base already has, and
//! HTTP schemes are rewritten to their WebSocket counterparts.

use url::Url;

use crate::error::BridgeError;

/// Path segments of the date-time echo endpoint.
pub const DATETIME_PATH: [&str; 2] = ["ws", "datetime"];

/// Rewrites `http` to `ws` and `https` to `wss`; other schemes are kept.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidEndpoint`] when the scheme is neither HTTP(S)
/// nor WebSocket.
pub fn to_websocket_scheme(mut url: Url) -> Result<Url, BridgeError> {
    let target = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url),
        other => {
            return Err(BridgeError::InvalidEndpoint {
                url: url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            })
        }
    };
    // Switching between two special schemes is always accepted by `url`.
    if url.set_scheme(target).is_err() {
        return Err(BridgeError::InvalidEndpoint {
            url: url.to_string(),
            reason: format!("cannot rewrite scheme to '{target}'"),
        });
    }
    Ok(url)
}

/// Appends `segments` to the path of `base` and normalises the scheme.
///
/// A trailing slash on the base path does not produce an empty segment:
/// both `ws://h/api` and `ws://h/api/` yield `ws://h/api/ws/datetime`.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidEndpoint`] for URLs that cannot carry a path
/// (e.g. `mailto:`) or use an unsupported scheme.
pub fn with_path_segments(base: &Url, segments: &[&str]) -> Result<Url, BridgeError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url.path_segments_mut().map_err(|()| BridgeError::InvalidEndpoint {
            url: base.to_string(),
            reason: "URL cannot be a base".to_string(),
        })?;
        path.pop_if_empty().extend(segments);
    }
    to_websocket_scheme(url)
}

/// The `/ws/datetime` endpoint under `base`.
pub fn datetime_endpoint(base: &Url) -> Result<Url, BridgeError> {
    with_path_segments(base, &DATETIME_PATH)
}
