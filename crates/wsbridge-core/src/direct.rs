//! Direct merge bridge: session reads and periodic sends in one stream.
//!
//! The output is produced by polling the session's read side and the
//! periodic driver together, with no queue in between.  The reader is only
//! polled when the consumer asks for the next item, so a slow consumer stops
//! reading from the socket and the backpressure lands on the transport
//! instead of in memory.
//!
//! Termination follows the read side:
//!
//! | Event                       | Output                               |
//! |-----------------------------|--------------------------------------|
//! | frame received              | decoded item                         |
//! | read side ends              | end of stream                        |
//! | read side fails             | error item, end of stream            |
//! | all sends issued            | nothing; keep reading                |
//! | a send fails                | error item, end of stream            |

use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::driver::PeriodicRequest;
use crate::error::BridgeError;
use crate::session::WebSocketSession;

enum Step {
    Frame(Option<Result<String, BridgeError>>),
    Sent(Result<(), BridgeError>),
}

/// Merges `session`'s inbound payloads (decoded with `decode`) with the
/// completion of `request` driven on its write side.
///
/// Meant to be returned from a session handler, so that the executor closes
/// the session when this stream ends or is dropped.
pub fn bridge<V, D>(
    session: WebSocketSession,
    request: PeriodicRequest,
    mut decode: D,
) -> impl Stream<Item = Result<V, BridgeError>> + Send + 'static
where
    V: Send + 'static,
    D: FnMut(String) -> Result<V, BridgeError> + Send + 'static,
{
    let id = session.id();
    let (writer, mut reader) = session.split();

    async_stream::try_stream! {
        let sends = request.drive(writer);
        futures_util::pin_mut!(sends);
        let mut sending = true;

        loop {
            let step = tokio::select! {
                frame = reader.next() => Step::Frame(frame),
                sent = &mut sends, if sending => Step::Sent(sent),
            };
            match step {
                Step::Frame(Some(payload)) => {
                    let value = decode(payload?)?;
                    yield value;
                }
                Step::Frame(None) => {
                    debug!("session {id}: read side exhausted");
                    break;
                }
                Step::Sent(result) => {
                    sending = false;
                    result?;
                    debug!("session {id}: all requests issued; still reading");
                }
            }
        }
    }
}
