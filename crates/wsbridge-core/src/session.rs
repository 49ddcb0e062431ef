//! One live upstream WebSocket connection.
//!
//! A [`WebSocketSession`] is created by the executor after a successful
//! handshake and handed to the session handler.  The handler splits it into a
//! [`SessionWriter`] (the write side, cloneable) and a [`SessionReader`] (the
//! read side, a stream of text payloads).
//!
//! The executor keeps a [`SessionCloser`] for the same connection.  Whatever
//! the handler does with the two halves, closing is the executor's job and
//! happens exactly once.
//!
//! ```text
//!                 ┌──────────── SessionWriter ──┐
//! WebSocketStream ┤  Arc<Mutex<SplitSink>> ─────┼── SessionCloser (executor)
//!                 └──────────── SessionReader ──┘
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::BridgeError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// How long a close handshake may take before the connection is just dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// What the handshake established.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// The endpoint that was connected to.
    pub uri: Url,
    /// Headers of the `101 Switching Protocols` response.
    pub headers: HeaderMap,
    /// The `Sec-WebSocket-Protocol` chosen by the server, if any.
    pub protocol: Option<String>,
}

/// An established upstream WebSocket connection.
pub struct WebSocketSession {
    id: Uuid,
    info: HandshakeInfo,
    writer: SessionWriter,
    reader: SessionReader,
}

impl WebSocketSession {
    pub(crate) fn new(info: HandshakeInfo, stream: WsStream) -> Self {
        let id = Uuid::new_v4();
        let (sink, source) = stream.split();
        let writer = SessionWriter {
            id,
            sink: Arc::new(Mutex::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let reader = SessionReader {
            id,
            source,
            done: false,
        };
        Self {
            id,
            info,
            writer,
            reader,
        }
    }

    /// Identifier used in log messages.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handshake details: endpoint, response headers, negotiated sub-protocol.
    pub fn info(&self) -> &HandshakeInfo {
        &self.info
    }

    /// Separates the write side from the read side so both can be driven
    /// concurrently.
    pub fn split(self) -> (SessionWriter, SessionReader) {
        (self.writer, self.reader)
    }

    pub(crate) fn closer(&self) -> SessionCloser {
        SessionCloser {
            id: self.id,
            sink: Arc::clone(&self.writer.sink),
            closed: Arc::clone(&self.writer.closed),
        }
    }
}

// ── Write side ────────────────────────────────────────────────────────────────

/// Write side of a session.
///
/// Cloning is cheap; clones share the underlying sink behind an async mutex so
/// frames from different tasks are never interleaved mid-write.
#[derive(Clone)]
pub struct SessionWriter {
    id: Uuid,
    sink: Arc<Mutex<WsSink>>,
    closed: Arc<AtomicBool>,
}

impl SessionWriter {
    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SessionClosed`] once the session has been closed, or
    /// [`BridgeError::Transport`] when the write fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::SessionClosed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Sends every frame of `frames`, in order, and resolves once the last one
    /// has been written.  Stops at the first failure.
    pub async fn send<S>(&self, frames: S) -> Result<(), BridgeError>
    where
        S: Stream<Item = String>,
    {
        futures_util::pin_mut!(frames);
        let mut sent = 0u64;
        while let Some(frame) = frames.next().await {
            self.send_text(frame).await?;
            sent += 1;
        }
        debug!("session {}: all {sent} frames sent", self.id);
        Ok(())
    }

    /// Whether the executor already closed the session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── Read side ─────────────────────────────────────────────────────────────────

/// Read side of a session: a stream of text payloads in receipt order.
///
/// Binary frames are decoded as (lossy) UTF-8 text.  Control frames are
/// skipped.  The stream ends when the peer closes normally and yields one
/// [`BridgeError::Protocol`] when the peer closes with an error code.
pub struct SessionReader {
    id: Uuid,
    source: WsSource,
    done: bool,
}

impl Stream for SessionReader {
    type Item = Result<String, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            let message = match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(message) => message,
            };
            match message {
                Some(Ok(WsMessage::Text(text))) => return Poll::Ready(Some(Ok(text))),
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Poll::Ready(Some(Ok(String::from_utf8_lossy(&bytes).into_owned())))
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    this.done = true;
                    match frame {
                        Some(frame)
                            if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) =>
                        {
                            let code = u16::from(frame.code);
                            warn!(
                                "session {}: peer closed with code {code}: {}",
                                this.id, frame.reason
                            );
                            return Poll::Ready(Some(Err(BridgeError::Protocol(format!(
                                "upstream closed the session ({code}): {}",
                                frame.reason
                            )))));
                        }
                        _ => {
                            debug!("session {}: peer closed the session", this.id);
                            return Poll::Ready(None);
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("session {}: read side ended", this.id);
                    this.done = true;
                }
                Some(Err(e)) => {
                    warn!("session {}: read failed: {e}", this.id);
                    this.done = true;
                    return Poll::Ready(Some(Err(BridgeError::Transport(e))));
                }
            }
        }
    }
}

// ── Closing ───────────────────────────────────────────────────────────────────

/// Executor-side handle that closes the session exactly once.
#[derive(Clone)]
pub(crate) struct SessionCloser {
    id: Uuid,
    sink: Arc<Mutex<WsSink>>,
    closed: Arc<AtomicBool>,
}

impl SessionCloser {
    /// Sends a close frame and shuts the write side down.
    ///
    /// Returns `false` when the session had already been closed; the second
    /// and later calls do nothing.
    pub(crate) async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let result = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;
        match result {
            Ok(Ok(())) | Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                info!("session {}: closed", self.id);
            }
            Ok(Err(e)) => warn!("session {}: close failed: {e}", self.id),
            Err(_) => warn!(
                "session {}: close handshake timed out after {CLOSE_TIMEOUT:?}",
                self.id
            ),
        }
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }
}
