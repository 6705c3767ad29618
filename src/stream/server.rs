//! The WebSocket streaming endpoint.
//!
//! `GET /ws/stream` upgrades to a WebSocket carrying the inbound frame JSON
//! and outbound envelopes described in [`crate::stream::protocol`]. Each
//! connection task owns its [`ConnectionState`]; outbound envelopes from the
//! workers arrive through an mpsc channel, so workers never touch the socket
//! directly.

use crate::config::Config;
use crate::stream::connection::ConnectionState;
use crate::stream::coordinator::Coordinator;
use crate::stream::protocol::Envelope;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    /// The inference coordinator.
    pub coordinator: Arc<Coordinator>,
    /// Full application configuration.
    pub config: Arc<Config>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/stream", get(ws_handler))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> crate::error::AppResult<()> {
    let addr = state.config.server.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "streaming server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(std::io::Error::other)?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(64);
    state.coordinator.register(client_id, outbound_tx);

    let mut connection = ConnectionState::new(&state.config.pipeline, &state.config.server);

    // Explicit Calibrating state on connect instead of silently consuming
    // the first N frames.
    if send_envelope(&mut sender, &connection.initial_status())
        .await
        .is_err()
    {
        state.coordinator.deregister(client_id);
        return;
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = connection.handle_text(text.as_str());
                        if let Some(envelope) = outcome.reply {
                            if send_envelope(&mut sender, &envelope).await.is_err() {
                                break;
                            }
                        }
                        if let Some(payload) = outcome.payload {
                            state.coordinator.submit(client_id, payload).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(%client_id, "client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames are ignored.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%client_id, error = %e, "websocket error");
                        break;
                    }
                }
            }
            envelope = outbound_rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        if send_envelope(&mut sender, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.coordinator.deregister(client_id);
}

async fn send_envelope(
    sender: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), ()> {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize envelope");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
