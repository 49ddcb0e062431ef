//! `GET /ws/datetime`: the date-time echo endpoint.
//!
//! Every inbound text frame is answered with one outbound frame, in order.
//! An unrecognised request closes the session with code 1011 and the reason
//! `I do not understand`.  The session also ends when the peer closes it.
//!
//! The configured bridge sub-protocol is offered during the upgrade, so the
//! server can act as its own upstream when one is configured.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::application::datetime::{self, answer};
use crate::infrastructure::http_server::AppState;

/// Upgrades the request and runs the echo session.
pub async fn datetime_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.protocols(state.config.bridge.sub_protocol.clone())
        .on_upgrade(run_session)
}

async fn run_session(mut socket: WebSocket) {
    debug!("WebSocket session opened");
    while let Some(message) = socket.recv().await {
        let request = match message {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket receive failed: {e}");
                break;
            }
        };

        match answer(&request, datetime::now()) {
            Ok(reply) => {
                if let Err(e) = socket.send(Message::Text(reply.into())).await {
                    warn!("WebSocket send failed: {e}");
                    break;
                }
            }
            Err(e) => {
                warn!("closing WebSocket session: {e} ({request:?})");
                let frame = CloseFrame {
                    code: close_code::ERROR,
                    reason: e.to_string().into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
    info!("WebSocket session closed");
}
