//! HTTP and WebSocket front end for searchbus gateway

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use searchbus_protocol::{Failure, ReplyFrame, RequestFrame};
use tokio::sync::watch;

use crate::bootstrap::BootstrapState;
use crate::bus::MessageBus;
use crate::metrics;

/// Shared state of the HTTP front end
#[derive(Clone)]
pub struct AppState {
    bus: Arc<dyn MessageBus>,
    address: String,
    request_timeout: Duration,
    readiness: watch::Receiver<BootstrapState>,
}

impl AppState {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        address: impl Into<String>,
        request_timeout: Duration,
        readiness: watch::Receiver<BootstrapState>,
    ) -> Self {
        Self {
            bus,
            address: address.into(),
            request_timeout,
            readiness,
        }
    }
}

/// Build the main router for the gateway
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_export))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// 200 once bootstrap is ready, 503 before that or after a failure
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let current = *state.readiness.borrow();
    let status = if current == BootstrapState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, current.as_str())
}

async fn metrics_export() -> Response {
    match metrics::export() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Metrics export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// WebSocket handler
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Send one text frame through the bus and build the reply frame.
pub async fn handle_frame(state: &AppState, text: &str) -> ReplyFrame {
    let frame: RequestFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(error = %err, "Invalid request frame");
            let failure = Failure::new(format!("Invalid request frame: {err}"));
            return ReplyFrame::from_reply(None, Err(failure));
        }
    };

    let reply = state
        .bus
        .send(&state.address, frame.body, state.request_timeout)
        .await
        .map_err(Failure::from);
    ReplyFrame::from_reply(frame.id, reply)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                tracing::debug!(bytes = text.len(), "Request frame received");
                let reply = handle_frame(&state, &text).await;
                let encoded = match serde_json::to_string(&reply) {
                    Ok(encoded) => encoded,
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to encode reply frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(encoded)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!("Client disconnected");
                break;
            }
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }
}
