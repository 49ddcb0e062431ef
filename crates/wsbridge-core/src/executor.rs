//! WebSocket executor: handshake, session handler, scoped close.
//!
//! [`WebSocketExecutor::connect`] ties the whole life of an upstream
//! connection to the stream it returns:
//!
//! ```text
//! connect(endpoint, handler)
//!   │  handshake ──✗──► stream yields BridgeError::Handshake, handler never runs
//!   │     ✓
//!   ▼
//! handler(session) ──► items forwarded to the caller
//!   │
//!   ├─ handler stream ends        ─► close (awaited), stream ends
//!   ├─ handler stream yields Err  ─► close (awaited), Err forwarded, stream ends
//!   └─ caller drops the stream    ─► CloseGuard::drop schedules the close
//! ```
//!
//! Closing is guarded by the session's single-assignment flag, so whichever
//! of the three paths gets there first wins and the others are no-ops.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, Stream, StreamExt, TryStreamExt};
use tokio_tungstenite::{connect_async, tungstenite};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info};
use url::Url;

use crate::error::BridgeError;
use crate::session::{HandshakeInfo, SessionCloser, WebSocketSession};

/// Default upper bound on the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings applied to every connection made by an executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Sub-protocol requested through `Sec-WebSocket-Protocol`.
    pub sub_protocol: Option<String>,
    /// Maximum time allowed for TCP connect + upgrade.
    pub connect_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sub_protocol: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Maps an established session to the stream the caller will consume.
///
/// Implemented for every `FnOnce(WebSocketSession) -> impl Stream`, so plain
/// closures are the usual way to write one.
pub trait SessionHandler<V>: Send + 'static {
    /// The produced stream.
    type Output: Stream<Item = Result<V, BridgeError>> + Send + 'static;

    /// Takes ownership of the session and produces the output stream.
    fn handle(self, session: WebSocketSession) -> Self::Output;
}

impl<V, F, S> SessionHandler<V> for F
where
    F: FnOnce(WebSocketSession) -> S + Send + 'static,
    S: Stream<Item = Result<V, BridgeError>> + Send + 'static,
{
    type Output = S;

    fn handle(self, session: WebSocketSession) -> S {
        self(session)
    }
}

/// Zero-payload completion of an upstream exchange.
///
/// Resolves to `Ok(())` when the exchange finished, or to the error that
/// ended it.  Dropping the signal before it resolves cancels the exchange and
/// closes its session.
pub struct LifecycleSignal(BoxFuture<'static, Result<(), BridgeError>>);

impl LifecycleSignal {
    /// Wraps any future as a lifecycle signal.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        Self(future.boxed())
    }
}

impl Future for LifecycleSignal {
    type Output = Result<(), BridgeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

/// Opens upstream WebSocket sessions.
///
/// Cheap to clone; holds configuration only.  Every call to
/// [`connect`](Self::connect) or [`execute`](Self::execute) makes at most one
/// connection attempt and never retries.
#[derive(Debug, Clone, Default)]
pub struct WebSocketExecutor {
    config: ExecutorConfig,
}

impl WebSocketExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Connects to `endpoint` and streams whatever `handler` produces.
    ///
    /// Nothing happens until the returned stream is first polled.  The session
    /// is closed exactly once when the stream completes, fails, or is dropped.
    pub fn connect<V, H>(&self, endpoint: Url, handler: H) -> BoxStream<'static, Result<V, BridgeError>>
    where
        V: Send + 'static,
        H: SessionHandler<V>,
    {
        let config = self.config.clone();
        async_stream::try_stream! {
            let session = handshake(&endpoint, &config).await?;
            let guard = CloseGuard::new(session.closer());
            let output = handler.handle(session);
            futures_util::pin_mut!(output);

            while let Some(item) = output.next().await {
                match item {
                    Ok(value) => yield value,
                    Err(e) => {
                        debug!("session {}: handler failed: {e}", guard.closer.id());
                        guard.close().await;
                        Err::<(), BridgeError>(e)?;
                    }
                }
            }
            guard.close().await;
        }
        .boxed()
    }

    /// Connects to `endpoint` and runs `handler` to completion.
    ///
    /// The zero-payload form of [`connect`](Self::connect): the returned
    /// signal resolves with the handler's result, after the session has been
    /// closed.
    pub fn execute<F, Fut>(&self, endpoint: Url, handler: F) -> LifecycleSignal
    where
        F: FnOnce(WebSocketSession) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        let exchange = self.connect(endpoint, move |session: WebSocketSession| {
            stream::once(handler(session))
                .try_filter_map(|()| futures_util::future::ready(Ok(None::<Infallible>)))
        });
        LifecycleSignal::new(async move {
            let mut exchange = exchange;
            match exchange.next().await {
                None => Ok(()),
                Some(Ok(never)) => match never {},
                Some(Err(e)) => Err(e),
            }
        })
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

async fn handshake(endpoint: &Url, config: &ExecutorConfig) -> Result<WebSocketSession, BridgeError> {
    let handshake_error = |source: tungstenite::Error| BridgeError::Handshake {
        endpoint: endpoint.to_string(),
        source,
    };

    let mut request = endpoint.as_str().into_client_request().map_err(handshake_error)?;
    if let Some(protocol) = &config.sub_protocol {
        let value = HeaderValue::from_str(protocol)
            .map_err(|_| BridgeError::InvalidSubProtocol(protocol.clone()))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    debug!("connecting to {endpoint}");
    let (stream, response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| BridgeError::HandshakeTimeout {
            endpoint: endpoint.to_string(),
            timeout: config.connect_timeout,
        })?
        .map_err(handshake_error)?;

    let headers = response.headers().clone();
    let protocol = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let session = WebSocketSession::new(
        HandshakeInfo {
            uri: endpoint.clone(),
            headers,
            protocol,
        },
        stream,
    );
    info!(
        "session {}: connected to {endpoint} (sub-protocol: {})",
        session.id(),
        session.info().protocol.as_deref().unwrap_or("none")
    );
    Ok(session)
}

// ── Scoped close ──────────────────────────────────────────────────────────────

/// Closes the session when the executor's stream is dropped mid-flight.
struct CloseGuard {
    closer: SessionCloser,
}

impl CloseGuard {
    fn new(closer: SessionCloser) -> Self {
        Self { closer }
    }

    async fn close(&self) {
        self.closer.close().await;
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if self.closer.is_closed() {
            return;
        }
        debug!("session {}: output dropped, closing", self.closer.id());
        // Outside a runtime the halves are simply dropped, which still tears
        // the TCP connection down.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let closer = self.closer.clone();
            runtime.spawn(async move {
                closer.close().await;
            });
        }
    }
}
