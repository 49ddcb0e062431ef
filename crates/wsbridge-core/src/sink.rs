//! Manually driven, single-consumer item queue.
//!
//! A [`BridgeSink`] is the hand-off point of the buffered bridge: the upstream
//! read path pushes items with [`emit`](BridgeSink::emit), the lifecycle
//! subscription ends it with [`complete`](BridgeSink::complete) or
//! [`fail`](BridgeSink::fail), and the SSE response drains it through the
//! [`SinkStream`] obtained from [`subscribe`](BridgeSink::subscribe).
//!
//! # Terminal state
//!
//! Exactly one of *complete*, *fail* or *cancel* (the consumer dropping its
//! stream) wins.  The sender lives behind a mutex together with the terminal
//! flag, so an emit can never slip in after the terminal transition, and the
//! transition itself can never be rejected by a concurrent emit.  Every later
//! call returns an [`EmitError`] and changes nothing.
//!
//! # Capacity
//!
//! The default sink is unbounded: a slow consumer makes the queue grow and
//! nothing is ever dropped.  A bounded sink fails with
//! [`BridgeError::BufferOverflow`] when full; the consumer still receives
//! every item queued before the overflow, followed by the error.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::{BridgeError, EmitError};

/// Producer handle of a bridge queue.  Clones share the same queue.
pub struct BridgeSink<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for BridgeSink<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<V> {
    state: Mutex<SinkState<V>>,
    receiver: Mutex<Option<Receiver<V>>>,
}

struct SinkState<V> {
    sender: Option<Sender<V>>,
    end: Option<End>,
    failure: Option<BridgeError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Completed,
    Failed,
    Cancelled,
}

impl End {
    fn rejection(self) -> EmitError {
        match self {
            End::Completed | End::Failed => EmitError::Terminated,
            End::Cancelled => EmitError::Cancelled,
        }
    }
}

enum Sender<V> {
    Unbounded(mpsc::UnboundedSender<V>),
    Bounded {
        tx: mpsc::Sender<V>,
        capacity: usize,
    },
}

enum Receiver<V> {
    Unbounded(mpsc::UnboundedReceiver<V>),
    Bounded(mpsc::Receiver<V>),
}

impl<V> Receiver<V> {
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<V>> {
        match self {
            Receiver::Unbounded(rx) => rx.poll_recv(cx),
            Receiver::Bounded(rx) => rx.poll_recv(cx),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V> BridgeSink<V> {
    /// A sink that buffers without limit.
    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_parts(Sender::Unbounded(tx), Receiver::Unbounded(rx))
    }

    /// A sink holding at most `capacity` undelivered items (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self::from_parts(Sender::Bounded { tx, capacity }, Receiver::Bounded(rx))
    }

    /// [`bounded`](Self::bounded) when a capacity is given, otherwise
    /// [`unbounded`](Self::unbounded).
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    fn from_parts(sender: Sender<V>, receiver: Receiver<V>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SinkState {
                    sender: Some(sender),
                    end: None,
                    failure: None,
                }),
                receiver: Mutex::new(Some(receiver)),
            }),
        }
    }

    /// Queues one item.
    ///
    /// # Errors
    ///
    /// - [`EmitError::Terminated`] after complete/fail.
    /// - [`EmitError::Cancelled`] once the consumer dropped its stream.
    /// - [`EmitError::Overflow`] when a bounded sink is full; the sink is
    ///   failed with [`BridgeError::BufferOverflow`] at the same time.
    pub fn emit(&self, item: V) -> Result<(), EmitError> {
        let mut state = lock(&self.shared.state);
        if let Some(end) = state.end {
            return Err(end.rejection());
        }
        let result = match &state.sender {
            None => return Err(EmitError::Terminated),
            Some(Sender::Unbounded(tx)) => tx.send(item).map_err(|_| EmitError::Cancelled),
            Some(Sender::Bounded { tx, capacity }) => match tx.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Closed(_)) => Err(EmitError::Cancelled),
                Err(TrySendError::Full(_)) => {
                    let capacity = *capacity;
                    debug!("bridge sink full ({capacity} items); failing");
                    state.terminate(End::Failed, Some(BridgeError::BufferOverflow { capacity }));
                    return Err(EmitError::Overflow);
                }
            },
        };
        if result == Err(EmitError::Cancelled) {
            state.terminate(End::Cancelled, None);
        }
        result
    }

    /// Ends the queue normally.  The consumer drains what is queued, then ends.
    pub fn complete(&self) -> Result<(), EmitError> {
        lock(&self.shared.state).try_terminate(End::Completed, None)
    }

    /// Ends the queue with `error`, delivered after the queued items.
    pub fn fail(&self, error: BridgeError) -> Result<(), EmitError> {
        lock(&self.shared.state).try_terminate(End::Failed, Some(error))
    }

    /// Whether complete, fail or cancel already happened.
    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.state).end.is_some()
    }

    /// Takes the consumer side of the queue.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadySubscribed`] on every call after the first.
    pub fn subscribe(&self) -> Result<SinkStream<V>, BridgeError> {
        let receiver = lock(&self.shared.receiver)
            .take()
            .ok_or(BridgeError::AlreadySubscribed)?;
        Ok(SinkStream {
            receiver,
            shared: Arc::clone(&self.shared),
            finished: false,
        })
    }

    fn cancel(&self) {
        let mut state = lock(&self.shared.state);
        if state.end.is_none() {
            debug!("bridge sink consumer went away");
            state.terminate(End::Cancelled, None);
        }
    }
}

impl<V> SinkState<V> {
    fn try_terminate(&mut self, end: End, failure: Option<BridgeError>) -> Result<(), EmitError> {
        if let Some(previous) = self.end {
            return Err(previous.rejection());
        }
        self.terminate(end, failure);
        Ok(())
    }

    /// Dropping the only sender closes the channel once it is drained.
    fn terminate(&mut self, end: End, failure: Option<BridgeError>) {
        self.end = Some(end);
        self.failure = failure;
        self.sender = None;
    }
}

// ── Consumer side ─────────────────────────────────────────────────────────────

/// Consumer side of a [`BridgeSink`]: every queued item in order, then the
/// failure (if the sink was failed), then the end of the stream.
///
/// Dropping it cancels the sink.
pub struct SinkStream<V> {
    receiver: Receiver<V>,
    shared: Arc<Shared<V>>,
    finished: bool,
}

impl<V> Stream for SinkStream<V> {
    type Item = Result<V, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(None) => {
                this.finished = true;
                let failure = lock(&this.shared.state).failure.take();
                Poll::Ready(failure.map(Err))
            }
        }
    }
}

impl<V> Drop for SinkStream<V> {
    fn drop(&mut self) {
        BridgeSink {
            shared: Arc::clone(&self.shared),
        }
        .cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[tokio::test]
    async fn test_items_then_completion() {
        // Arrange
        let sink = BridgeSink::unbounded();
        let stream = sink.subscribe().unwrap();

        // Act
        sink.emit("a").unwrap();
        sink.emit("b").unwrap();
        sink.complete().unwrap();

        // Assert: items in order, then the end of the stream.
        let items: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failure_is_delivered_after_queued_items() {
        let sink = BridgeSink::unbounded();
        let mut stream = sink.subscribe().unwrap();

        sink.emit(1).unwrap();
        sink.fail(BridgeError::Protocol("boom".into())).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(msg) if msg == "boom"));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_consumer_waits_until_an_item_arrives() {
        let sink = BridgeSink::unbounded();
        let mut stream = task::spawn(sink.subscribe().unwrap());

        assert_pending!(stream.poll_next());

        sink.emit(7).unwrap();
        assert!(stream.is_woken());
        let item = assert_ready!(stream.poll_next());
        assert_eq!(item.map(Result::unwrap), Some(7));

        sink.complete().unwrap();
        let end = assert_ready!(stream.poll_next());
        assert!(end.is_none());
    }

    #[test]
    fn test_emit_after_complete_is_rejected() {
        let sink = BridgeSink::unbounded();
        let _stream = sink.subscribe().unwrap();

        sink.complete().unwrap();

        assert_eq!(sink.emit("late"), Err(EmitError::Terminated));
    }

    #[test]
    fn test_second_completion_is_a_no_op() {
        let sink: BridgeSink<()> = BridgeSink::unbounded();

        assert_eq!(sink.complete(), Ok(()));
        assert_eq!(sink.complete(), Err(EmitError::Terminated));
        assert_eq!(
            sink.fail(BridgeError::SessionClosed),
            Err(EmitError::Terminated)
        );
        assert!(sink.is_terminated());
    }

    #[tokio::test]
    async fn test_first_terminal_signal_wins() {
        let sink: BridgeSink<u8> = BridgeSink::unbounded();
        let stream = sink.subscribe().unwrap();

        sink.fail(BridgeError::SessionClosed).unwrap();
        assert_eq!(sink.complete(), Err(EmitError::Terminated));

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(BridgeError::SessionClosed)));
    }

    #[test]
    fn test_dropping_the_consumer_cancels_the_sink() {
        let sink = BridgeSink::unbounded();
        let stream = sink.subscribe().unwrap();

        drop(stream);

        assert_eq!(sink.emit(1), Err(EmitError::Cancelled));
        assert_eq!(sink.complete(), Err(EmitError::Cancelled));
        assert!(sink.is_terminated());
    }

    #[test]
    fn test_second_subscription_is_rejected() {
        let sink: BridgeSink<u8> = BridgeSink::unbounded();
        let _first = sink.subscribe().unwrap();

        assert!(matches!(
            sink.subscribe(),
            Err(BridgeError::AlreadySubscribed)
        ));
    }

    #[test]
    fn test_unbounded_sink_never_rejects_for_volume() {
        let sink = BridgeSink::unbounded();
        let _stream = sink.subscribe().unwrap();

        for i in 0..10_000 {
            sink.emit(i).unwrap();
        }
        assert!(!sink.is_terminated());
    }

    #[tokio::test]
    async fn test_bounded_sink_fails_on_overflow() {
        // Arrange: room for two undelivered items.
        let sink = BridgeSink::bounded(2);
        let stream = sink.subscribe().unwrap();
        sink.emit(1).unwrap();
        sink.emit(2).unwrap();

        // Act
        let overflow = sink.emit(3);

        // Assert: the queued items survive, then the overflow error ends it.
        assert_eq!(overflow, Err(EmitError::Overflow));
        assert_eq!(sink.emit(4), Err(EmitError::Terminated));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &1);
        assert_eq!(items[1].as_ref().unwrap(), &2);
        assert!(matches!(
            items[2],
            Err(BridgeError::BufferOverflow { capacity: 2 })
        ));
    }

    #[test]
    fn test_with_capacity_zero_is_clamped() {
        let sink = BridgeSink::with_capacity(Some(0));
        let _stream = sink.subscribe().unwrap();
        assert_eq!(sink.emit('x'), Ok(()));
        assert_eq!(sink.emit('y'), Err(EmitError::Overflow));
    }

    #[tokio::test]
    async fn test_completion_from_another_task() {
        let sink = BridgeSink::unbounded();
        let stream = sink.subscribe().unwrap();

        let producer = sink.clone();
        tokio::spawn(async move {
            for i in 0..100 {
                producer.emit(i).unwrap();
                tokio::task::yield_now().await;
            }
            producer.complete().unwrap();
        });

        let items: Vec<u32> = stream.map(Result::unwrap).collect().await;
        assert_eq!(items, (0..100).collect::<Vec<_>>());
    }
}
