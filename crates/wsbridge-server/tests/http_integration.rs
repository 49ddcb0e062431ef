//! End-to-end tests for the HTTP surface.
//!
//! Router-level checks go through `tower::ServiceExt::oneshot`; everything
//! involving a live WebSocket or an SSE body runs a real server on an
//! ephemeral port.  The SSE routes are exercised both against the server's
//! own echo endpoint and against a fake upstream that counts closed sessions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};
use tower::ServiceExt;
use url::Url;

use wsbridge_server::domain::{BridgeSettings, Features, ServerConfig};
use wsbridge_server::infrastructure::{router, serve, AppState};

const WAIT: Duration = Duration::from_secs(5);
const FAST: &str = "delay=PT0.05S";

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config_with_upstream(upstream: Option<Url>) -> ServerConfig {
    ServerConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        features: Features::all(),
        bridge: BridgeSettings {
            websocket_url: upstream,
            connect_timeout: Duration::from_secs(2),
            ..BridgeSettings::default()
        },
    }
}

/// A server running on an ephemeral port until dropped.
struct TestServer {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    /// Starts a server whose SSE routes bridge to `upstream`.
    async fn start(upstream: Option<Url>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, config_with_upstream(upstream)).await
    }

    /// Starts a server whose SSE routes bridge to its own echo endpoint.
    async fn start_self_bridged() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let own = Url::parse(&format!("http://{addr}")).unwrap();
        Self::serve(listener, config_with_upstream(Some(own))).await
    }

    async fn serve(listener: TcpListener, config: ServerConfig) -> Self {
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = serve(listener, config, async {
                let _ = shutdown_rx.await;
            })
            .await;
        });
        Self {
            addr,
            _shutdown: shutdown_tx,
        }
    }

    fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn ws(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }
}

/// Fake upstream replying `reply-{n}` to every request and counting closed
/// sessions.
struct FakeUpstream {
    url: Url,
    closed: Arc<AtomicUsize>,
}

impl FakeUpstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    let mut replies = 0u32;
                    while let Some(Ok(message)) = ws.next().await {
                        match message {
                            Message::Text(_) => {
                                replies += 1;
                                if ws.send(Message::Text(format!("reply-{replies}"))).await.is_err() {
                                    break;
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        Self { url, closed }
    }

    async fn wait_for_closed(&self, expected: usize) {
        timeout(WAIT, async {
            while self.closed.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("upstream session was not closed");
    }
}

/// Reads `count` SSE events (blank-line separated blocks, comments skipped).
async fn read_events(response: reqwest::Response, count: usize) -> Vec<String> {
    let mut body = response.bytes_stream();
    let mut buffer = String::new();
    let mut events = Vec::new();
    while events.len() < count {
        let chunk = timeout(WAIT, body.next())
            .await
            .expect("timed out waiting for an SSE event")
            .expect("SSE body ended early")
            .unwrap();
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        while let Some(end) = buffer.find("\n\n") {
            let block: String = buffer.drain(..end + 2).collect();
            let block = block.trim_end().to_string();
            if !block.starts_with(':') {
                events.push(block);
            }
        }
    }
    events.truncate(count);
    events
}

fn data_of(event: &str) -> &str {
    event
        .strip_prefix("data: ")
        .unwrap_or_else(|| panic!("not a data event: {event:?}"))
}

async fn oneshot_get(config: ServerConfig, uri: &str) -> axum::response::Response {
    router(AppState::new(config))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

// ── Index ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_redirects_permanently_to_index() {
    let response = oneshot_get(config_with_upstream(None), "/").await;

    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/index.html");
}

#[tokio::test]
async fn test_index_links_use_request_host() {
    // Arrange
    let app = router(AppState::new(config_with_upstream(None)));
    let request = Request::builder()
        .uri("/index.html")
        .header(header::HOST, "demo.local:8080")
        .body(Body::empty())
        .unwrap();

    // Act
    let response = app.oneshot(request).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("ws://demo.local:8080/ws/datetime"));
    assert!(html.contains("http://demo.local:8080/sse/datetime"));
}

#[tokio::test]
async fn test_index_links_follow_forwarded_https() {
    // Arrange
    let app = router(AppState::new(config_with_upstream(None)));
    let request = Request::builder()
        .uri("/index.html")
        .header(header::HOST, "demo.example")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();

    // Act
    let response = app.oneshot(request).await.unwrap();

    // Assert
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("wss://demo.example/ws/datetime"));
    assert!(html.contains("https://demo.example/sse/datetime"));
    assert!(!html.contains("http://demo.example"));
}

#[tokio::test]
async fn test_inactive_profiles_are_not_mounted() {
    let mut config = config_with_upstream(None);
    config.features = Features::from_profiles(["websocket"]);

    let sse = oneshot_get(config.clone(), "/sse/datetime").await;
    let custom = oneshot_get(config.clone(), "/custom/sse/datetime").await;

    assert_eq!(sse.status(), StatusCode::NOT_FOUND);
    assert_eq!(custom.status(), StatusCode::NOT_FOUND);

    config.features = Features::from_profiles(["sse"]);
    let ws = oneshot_get(config, "/ws/datetime").await;
    assert_eq!(ws.status(), StatusCode::NOT_FOUND);
}

// ── Missing configuration ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_upstream_url_fails_fast_with_500() {
    for uri in ["/sse/datetime", "/custom/sse/datetime"] {
        let response = oneshot_get(config_with_upstream(None), uri).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "missing configuration property: 'bridge.websocket.url'"
        );
    }
}

// ── WebSocket echo ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_echo_answers_with_rfc3339_timestamp() {
    // Arrange
    let server = TestServer::start(None).await;
    let (mut ws, _) = connect_async(server.ws("/ws/datetime")).await.unwrap();

    // Act
    ws.send(Message::Text("What time is it ?".into())).await.unwrap();
    let reply = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();

    // Assert
    let Message::Text(text) = reply else {
        panic!("expected a text frame, got {reply:?}");
    };
    assert!(DateTime::parse_from_rfc3339(&text).is_ok(), "{text}");
}

#[tokio::test]
async fn test_echo_answers_each_request_in_order() {
    let server = TestServer::start(None).await;
    let (mut ws, _) = connect_async(server.ws("/ws/datetime")).await.unwrap();

    for _ in 0..3 {
        ws.send(Message::Text("What time is it ?".into())).await.unwrap();
    }
    let mut stamps = Vec::new();
    for _ in 0..3 {
        let Message::Text(text) = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap() else {
            panic!("expected a text frame");
        };
        stamps.push(DateTime::parse_from_rfc3339(&text).unwrap());
    }

    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn test_echo_closes_with_1011_on_unknown_request() {
    let server = TestServer::start(None).await;
    let (mut ws, _) = connect_async(server.ws("/ws/datetime")).await.unwrap();

    ws.send(Message::Text("hello".into())).await.unwrap();
    let reply = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();

    let Message::Close(Some(frame)) = reply else {
        panic!("expected a close frame, got {reply:?}");
    };
    assert_eq!(frame.code, CloseCode::Error);
    assert_eq!(frame.reason, "I do not understand");
}

// ── SSE bridges ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_buffered_route_republishes_echo_timestamps() {
    // Arrange
    let server = TestServer::start_self_bridged().await;

    // Act
    let response = reqwest::get(server.http(&format!("/sse/datetime?{FAST}")))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let events = read_events(response, 3).await;
    for event in &events {
        assert!(DateTime::parse_from_rfc3339(data_of(event)).is_ok(), "{event}");
    }
}

#[tokio::test]
async fn test_direct_route_republishes_echo_timestamps() {
    let server = TestServer::start_self_bridged().await;

    let response = reqwest::get(server.http(&format!("/custom/sse/datetime?{FAST}")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let events = read_events(response, 3).await;
    for event in &events {
        assert!(DateTime::parse_from_rfc3339(data_of(event)).is_ok(), "{event}");
    }
}

#[tokio::test]
async fn test_both_routes_keep_upstream_order() {
    let upstream = FakeUpstream::start().await;
    let server = TestServer::start(Some(upstream.url.clone())).await;

    for route in ["/sse/datetime", "/custom/sse/datetime"] {
        let response = reqwest::get(server.http(&format!("{route}?{FAST}")))
            .await
            .unwrap();

        let events = read_events(response, 3).await;
        let data: Vec<&str> = events.iter().map(|e| data_of(e)).collect();

        assert_eq!(data, vec!["reply-1", "reply-2", "reply-3"], "{route}");
    }
}

#[tokio::test]
async fn test_client_disconnect_closes_upstream_session() {
    let upstream = FakeUpstream::start().await;
    let server = TestServer::start(Some(upstream.url.clone())).await;

    for (closed, route) in [(1, "/sse/datetime"), (2, "/custom/sse/datetime")] {
        // Arrange: one event proves the upstream session is live.
        let response = reqwest::get(server.http(&format!("{route}?{FAST}")))
            .await
            .unwrap();
        let events = read_events(response, 1).await;
        assert_eq!(data_of(&events[0]), "reply-1");

        // Act: `read_events` consumed and dropped the response.

        // Assert
        upstream.wait_for_closed(closed).await;
    }
}

#[tokio::test]
async fn test_unreachable_upstream_yields_error_event_and_ends() {
    // Arrange: an address nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    drop(listener);
    let server = TestServer::start(Some(dead)).await;

    for route in ["/sse/datetime", "/custom/sse/datetime"] {
        // Act
        let response = reqwest::get(server.http(route)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body = timeout(WAIT, response.text())
            .await
            .expect("response must end after the error event")
            .unwrap();

        // Assert
        assert!(body.starts_with("event: error\ndata: "), "{route}: {body}");
        assert!(body.contains("handshake"), "{route}: {body}");
    }
}
