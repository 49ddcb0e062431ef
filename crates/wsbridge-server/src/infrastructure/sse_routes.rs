//! SSE bridge routes.
//!
//! Both routes connect to `<bridge.websocket.url>/ws/datetime`, send the
//! date-time request every `delay` (ISO-8601 duration query parameter,
//! default one second) and republish every reply as one SSE event.  They
//! differ only in how replies reach the response:
//!
//! - `GET /sse/datetime`: buffered. The upstream exchange runs as its own
//!   task and pushes into a [`BridgeSink`]; the response drains the sink.
//! - `GET /custom/sse/datetime`: direct. The response polls the upstream
//!   session itself, so a slow client slows reads from the socket.
//!
//! A missing upstream URL is reported before any connection attempt.  Upstream
//! failures after that point (including a failed handshake) arrive as an
//! `error` event on an already-open SSE response.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use wsbridge_core::{
    buffered, direct, BridgeError, BridgeSink, Delay, PeriodicRequest, WebSocketSession,
};

use crate::infrastructure::http_server::AppState;
use crate::infrastructure::publisher::publish;

/// Query string accepted by both routes.
#[derive(Debug, Default, Deserialize)]
pub struct DelayQuery {
    /// ISO-8601 duration such as `PT2S`; invalid or absent means one second.
    pub delay: Option<String>,
}

impl DelayQuery {
    fn request(&self) -> PeriodicRequest {
        PeriodicRequest::datetime(Delay::from_query(self.delay.as_deref()))
    }
}

/// Failure of an SSE route before the event stream starts.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Bridge(
                BridgeError::MissingConfiguration(_)
                | BridgeError::InvalidEndpoint { .. }
                | BridgeError::InvalidSubProtocol(_)
                | BridgeError::AlreadySubscribed,
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Bridge(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!("SSE route failed ({status}): {self}");
        (status, self.to_string()).into_response()
    }
}

/// `GET /sse/datetime`
pub async fn buffered_datetime(
    State(state): State<AppState>,
    Query(query): Query<DelayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = state.config.bridge.datetime_endpoint()?;
    let request = query.request();
    info!(
        "buffered SSE bridge to {endpoint}, one request every {}",
        request.delay()
    );

    let sink = BridgeSink::with_capacity(state.config.bridge.buffer_capacity);
    let producer = sink.clone();
    let upstream = state.executor.execute(endpoint, move |session| {
        buffered::exchange(session, request, producer, Ok)
    });
    let output = buffered::bridge(upstream, sink)?;

    Ok(publish(output))
}

/// `GET /custom/sse/datetime`
pub async fn direct_datetime(
    State(state): State<AppState>,
    Query(query): Query<DelayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = state.config.bridge.datetime_endpoint()?;
    let request = query.request();
    info!(
        "direct SSE bridge to {endpoint}, one request every {}",
        request.delay()
    );

    let output = state
        .executor
        .connect(endpoint, move |session: WebSocketSession| {
            direct::bridge(session, request, Ok)
        });

    Ok(publish(output))
}
