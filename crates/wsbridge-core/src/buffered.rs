//! Buffered bridge: upstream lifecycle → sink → output stream.
//!
//! The upstream exchange runs as its own task (the *lifecycle subscription*)
//! and pushes items into a [`BridgeSink`] as a side effect.  The bridge only
//! wires the two ends together:
//!
//! ```text
//! LifecycleSignal ──Ok──► sink.complete()
//!        │        ──Err─► sink.fail(cause)
//!        │        ──panic► sink.fail(UpstreamPanicked)
//!        │
//!        └── aborted when the output stream ends or is dropped
//!
//! BridgeSink ─────────────────────────────► BufferedStream (output)
//! ```
//!
//! Aborting the subscription drops the lifecycle future, which drops the
//! executor stream inside it and thereby closes the upstream session even if
//! the upstream never ends on its own (e.g. the SSE client disconnected while
//! the WebSocket was still live).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{FutureExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::PeriodicRequest;
use crate::error::BridgeError;
use crate::executor::LifecycleSignal;
use crate::session::WebSocketSession;
use crate::sink::{BridgeSink, SinkStream};

/// The upstream side of the buffered strategy, written as a session handler
/// for [`WebSocketExecutor::execute`](crate::WebSocketExecutor::execute).
///
/// Drives `request` on the write side and emits every decoded reply into
/// `sink`.  Resolves as soon as either side finishes: the sends fail, or the
/// read side ends or fails.  A sink that stops accepting items (consumer
/// gone, or overflow) also ends the exchange.
pub async fn exchange<V, D>(
    session: WebSocketSession,
    request: PeriodicRequest,
    sink: BridgeSink<V>,
    mut decode: D,
) -> Result<(), BridgeError>
where
    D: FnMut(String) -> Result<V, BridgeError>,
{
    let id = session.id();
    let (writer, mut reader) = session.split();

    let send = request.drive(writer);
    let receive = async {
        while let Some(payload) = reader.next().await {
            let value = decode(payload?)?;
            if let Err(rejected) = sink.emit(value) {
                debug!("session {id}: bridge sink rejected a reply ({rejected}); stopping");
                break;
            }
        }
        Ok::<(), BridgeError>(())
    };

    tokio::select! {
        sent = send => {
            debug!("session {id}: send side finished first");
            sent
        }
        received = receive => {
            debug!("session {id}: receive side finished first");
            received
        }
    }
}

/// Binds `upstream` to `sink` and returns the sink's items as the output.
///
/// Must be called within a Tokio runtime: the lifecycle subscription is
/// spawned immediately.
///
/// # Errors
///
/// [`BridgeError::AlreadySubscribed`] when `sink` already has a consumer; the
/// upstream is not started in that case.
pub fn bridge<V>(upstream: LifecycleSignal, sink: BridgeSink<V>) -> Result<BufferedStream<V>, BridgeError>
where
    V: Send + 'static,
{
    let items = sink.subscribe()?;

    let subscription = tokio::spawn(async move {
        let outcome = match AssertUnwindSafe(upstream).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(BridgeError::UpstreamPanicked(panic_message(panic.as_ref()))),
        };
        match outcome {
            Ok(()) => {
                debug!("upstream exchange completed");
                if sink.complete().is_err() {
                    debug!("bridge sink already terminated; completion ignored");
                }
            }
            Err(e) => {
                warn!("upstream exchange failed: {e}");
                if let Err(rejected) = sink.fail(e) {
                    debug!("bridge sink already terminated ({rejected}); failure ignored");
                }
            }
        }
    });

    Ok(BufferedStream {
        items,
        subscription: Some(subscription),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Output of the buffered bridge.
///
/// Yields the sink's items (and its failure, if any).  Ending or dropping it
/// disposes the upstream lifecycle subscription.
pub struct BufferedStream<V> {
    items: SinkStream<V>,
    subscription: Option<JoinHandle<()>>,
}

impl<V> BufferedStream<V> {
    fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if !subscription.is_finished() {
                debug!("disposing upstream lifecycle subscription");
            }
            subscription.abort();
        }
    }
}

impl<V> Stream for BufferedStream<V> {
    type Item = Result<V, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let next = Pin::new(&mut this.items).poll_next(cx);
        if let Poll::Ready(None) = next {
            this.dispose();
        }
        next
    }
}

impl<V> Drop for BufferedStream<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}
