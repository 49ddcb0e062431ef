//! # wsbridge-core
//!
//! Bridging core for republishing an upstream WebSocket exchange as a
//! downstream stream of items (served as Server-Sent Events by
//! `wsbridge-server`).
//!
//! # Architecture overview
//!
//! ```text
//!                       ┌─────────────────────────────┐
//!  endpoint + handler ─►│ executor  (handshake, close)│
//!                       └──────────────┬──────────────┘
//!                                      │ WebSocketSession
//!              ┌───────────────────────┴───────────────────────┐
//!              ▼                                               ▼
//!   buffered::bridge                                   direct::bridge
//!   LifecycleSignal + BridgeSink                       reader ⊕ PeriodicRequest
//!   (queue between upstream and output)                (no queue, transport backpressure)
//!              │                                               │
//!              └──────────────► Stream<Result<V, BridgeError>> ◄┘
//! ```
//!
//! - **`executor`** – opens one connection per call and scopes the session
//!   to the returned stream: the session is closed exactly once, whether the
//!   stream completes, fails or is dropped.
//! - **`driver`** – the periodic request frame.
//! - **`sink`** / **`buffered`** – manually driven queue and the bridge that
//!   ties its completion to the upstream lifecycle.
//! - **`direct`** – merges reads and sends without a queue.
//! - **`delay`** / **`endpoint`** – request parameters.

pub mod buffered;
pub mod delay;
pub mod direct;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod session;
pub mod sink;

pub use buffered::BufferedStream;
pub use delay::{Delay, DelayParseError};
pub use driver::{PeriodicRequest, DATETIME_REQUEST};
pub use endpoint::datetime_endpoint;
pub use error::{BridgeError, EmitError};
pub use executor::{ExecutorConfig, LifecycleSignal, SessionHandler, WebSocketExecutor};
pub use session::{HandshakeInfo, SessionReader, SessionWriter, WebSocketSession};
pub use sink::{BridgeSink, SinkStream};
