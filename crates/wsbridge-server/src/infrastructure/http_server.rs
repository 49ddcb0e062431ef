//! HTTP server: router construction and the serve loop.
//!
//! The router is assembled from [`Features`](crate::domain::Features): route
//! groups whose profile is inactive are simply not mounted and answer 404.
//!
//! | Route                      | Mounted when       |
//! |----------------------------|--------------------|
//! | `GET /`                    | always (308)       |
//! | `GET /index.html`          | always             |
//! | `GET /ws/datetime`         | `websocket` active |
//! | `GET /sse/datetime`        | `sse` active       |
//! | `GET /custom/sse/datetime` | `sse` active       |
//!
//! Shutdown follows the same flag as the rest of the process: `main.rs`
//! clears `running` on Ctrl+C and the server stops accepting connections,
//! letting open responses finish.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{HeaderMap, Uri};
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use wsbridge_core::WebSocketExecutor;

use crate::application::render_index;
use crate::domain::ServerConfig;
use crate::infrastructure::{sse_routes, ws_echo};

/// How often the shutdown flag is checked.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Set by TLS-terminating proxies to the scheme the client used.
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub executor: WebSocketExecutor,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let executor = WebSocketExecutor::new(config.bridge.executor_config());
        Self {
            config: Arc::new(config),
            executor,
        }
    }
}

/// Builds the router for the enabled features.
pub fn router(state: AppState) -> Router {
    let features = state.config.features;

    let mut app = Router::new()
        .route("/", get(redirect_to_index))
        .route("/index.html", get(index));

    if features.websocket {
        app = app.route("/ws/datetime", get(ws_echo::datetime_socket));
    }
    if features.sse {
        app = app
            .route("/sse/datetime", get(sse_routes::buffered_datetime))
            .route("/custom/sse/datetime", get(sse_routes::direct_datetime));
    }

    app.with_state(state)
}

/// Serves `config` on an already bound `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(AppState::new(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

/// Binds the configured address and serves until `running` is cleared.
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.bind_addr))?;
    let local_addr = listener.local_addr().context("listener has no local address")?;

    info!(
        "listening on {local_addr} (websocket: {}, sse: {})",
        config.features.websocket, config.features.sse
    );
    info!("GO TO http://localhost:{}/", local_addr.port());

    serve(listener, config, wait_until_stopped(running)).await
}

async fn wait_until_stopped(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
    info!("shutdown requested; no longer accepting connections");
}

// ── Index routes ──────────────────────────────────────────────────────────────

async fn redirect_to_index() -> Redirect {
    Redirect::permanent("/index.html")
}

async fn index(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Html<String> {
    let fallback = format!("localhost:{}", state.config.bind_addr.port());
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(&fallback);
    Html(render_index(host, is_secure(&uri, &headers), state.config.features))
}

/// Whether the client reached us over HTTPS, either directly (absolute
/// request URI) or through a TLS-terminating proxy (`X-Forwarded-Proto`).
fn is_secure(uri: &Uri, headers: &HeaderMap) -> bool {
    let forwarded = headers
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim);
    match forwarded {
        Some(proto) => proto.eq_ignore_ascii_case("https"),
        None => uri.scheme_str() == Some("https"),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with_proto(proto: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
        headers
    }

    #[test]
    fn test_plain_request_is_not_secure() {
        let uri: Uri = "/index.html".parse().unwrap();
        assert!(!is_secure(&uri, &HeaderMap::new()));
    }

    #[test]
    fn test_absolute_https_uri_is_secure() {
        let uri: Uri = "https://demo.example/index.html".parse().unwrap();
        assert!(is_secure(&uri, &HeaderMap::new()));
    }

    #[test]
    fn test_forwarded_proto_takes_precedence() {
        let relative: Uri = "/index.html".parse().unwrap();
        let absolute: Uri = "https://demo.example/index.html".parse().unwrap();

        assert!(is_secure(&relative, &headers_with_proto("HTTPS")));
        assert!(is_secure(&relative, &headers_with_proto("https, http")));
        assert!(!is_secure(&absolute, &headers_with_proto("http")));
    }
}
