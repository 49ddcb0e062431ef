//! Periodic request driver.
//!
//! Emits the same request frame once per [`Delay`].  The first frame goes out
//! one full delay after the driver starts (not immediately), and a tick that
//! is missed because the writer was slow pushes the following ticks back
//! instead of firing a burst.
//!
//! Stopping the driver is just dropping it: the interval timer lives inside
//! the frame stream, so no send happens after the drop and nothing blocks.

use futures_util::{Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::warn;

use crate::delay::Delay;
use crate::error::BridgeError;
use crate::session::SessionWriter;

/// Request understood by the date-time echo endpoint.
pub const DATETIME_REQUEST: &str = "What time is it ?";

/// A request frame repeated at a fixed cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicRequest {
    delay: Delay,
    payload: String,
    limit: Option<u64>,
}

impl PeriodicRequest {
    /// Sends `payload` every `delay`, for as long as the session is open.
    pub fn new(delay: Delay, payload: impl Into<String>) -> Self {
        Self {
            delay,
            payload: payload.into(),
            limit: None,
        }
    }

    /// The date-time request at the given cadence.
    pub fn datetime(delay: Delay) -> Self {
        Self::new(delay, DATETIME_REQUEST)
    }

    /// Stops after `count` frames.
    pub fn with_limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn delay(&self) -> Delay {
        self.delay
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The frames, one per tick.
    pub fn frames(&self) -> impl Stream<Item = String> + Send + 'static {
        let mut period = self.delay.as_duration();
        let now = Instant::now();
        let start = match now.checked_add(period) {
            Some(start) => start,
            None => {
                warn!("delay {} is beyond the timer range; using {}", self.delay, Delay::DEFAULT);
                period = Delay::DEFAULT.as_duration();
                now + period
            }
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let payload = self.payload.clone();
        let ticks = IntervalStream::new(ticker).map(move |_| payload.clone());
        match self.limit {
            Some(count) => ticks.take(usize::try_from(count).unwrap_or(usize::MAX)).left_stream(),
            None => ticks.right_stream(),
        }
    }

    /// Writes every frame to `writer`.
    ///
    /// Resolves with `Ok(())` once all frames were issued (only reachable with
    /// a limit), or with the first write error.
    pub async fn drive(self, writer: SessionWriter) -> Result<(), BridgeError> {
        writer.send(self.frames()).await
    }
}
