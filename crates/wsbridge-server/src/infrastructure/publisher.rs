//! SSE publisher: item stream → `text/event-stream` response.
//!
//! | Stream event | SSE output                                  |
//! |--------------|---------------------------------------------|
//! | `Ok(item)`   | `data: <item>` (one event per item)         |
//! | `Err(e)`     | `event: error` / `data: <e>`, response ends |
//! | end          | response ends                               |
//! | idle         | keep-alive comment every 15 s               |
//!
//! The source stream is owned by the response body.  When the client
//! disconnects, hyper drops the body, which drops the source stream and runs
//! its cancellation path (closing the upstream session).

use std::convert::Infallible;
use std::fmt::Display;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};
use wsbridge_core::BridgeError;

/// Interval between keep-alive comments on an idle stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Event name used for the terminal error event.
pub const ERROR_EVENT: &str = "error";

/// Publishes `items` as Server-Sent Events.
pub fn publish<S, V>(items: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Result<V, BridgeError>> + Send + 'static,
    V: Display + Send + 'static,
{
    let events = async_stream::stream! {
        futures_util::pin_mut!(items);
        let mut published = 0u64;
        while let Some(item) = items.next().await {
            match item {
                Ok(value) => {
                    published += 1;
                    yield Ok::<_, Infallible>(Event::default().data(value.to_string()));
                }
                Err(e) => {
                    warn!("SSE stream failed after {published} events: {e}");
                    yield Ok(Event::default().event(ERROR_EVENT).data(e.to_string()));
                    break;
                }
            }
        }
        debug!("SSE stream finished after {published} events");
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
