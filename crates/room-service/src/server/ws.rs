//! WebSocket transport for signaling sessions.
//!
//! One task per connection owns the socket and its [`SignalingSession`].
//! Inbound frames are handled one at a time; room notifications queue on the
//! peer's outbox while a request is in flight and are flushed between
//! frames.

use super::ServerState;
use crate::actors::Notification;
use crate::errors::RoomError;
use crate::signaling::{ClientFrame, Request, Response, SignalingSession};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Notifications buffered per peer before new ones are dropped.
const OUTBOX_BUFFER: usize = 256;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let peer_id = format!("peer-{}", Uuid::new_v4());
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Notification>(OUTBOX_BUFFER);
    let mut session = SignalingSession::new(peer_id.as_str(), state.registry.clone(), outbox_tx);
    let (mut sink, mut stream) = socket.split();

    info!(target: "room.signaling", peer_id = %peer_id, "Client connected");

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                debug!(target: "room.signaling", peer_id = %peer_id, "Server shutting down, closing connection");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            Some(notification) = outbox_rx.recv() => {
                if send_json(&mut sink, &notification).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(response) = handle_text(&mut session, &text).await {
                        if send_json(&mut sink, &response).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    let error = RoomError::InvalidRequest("binary frames are not supported".to_string());
                    if send_json(&mut sink, &Response::failure(None, &error)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping and pong are answered by axum.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(target: "room.signaling", peer_id = %peer_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
        }
    }

    session.disconnect().await;
    info!(target: "room.signaling", peer_id = %peer_id, "Client disconnected");
}

/// Parse and handle one text frame. Returns `None` for fire-and-forget
/// requests.
async fn handle_text(session: &mut SignalingSession, text: &str) -> Option<Response> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => return Some(Response::failure(None, &e)),
    };

    let request = match Request::parse(&frame.method, frame.params) {
        Ok(request) => request,
        Err(e) => return Some(Response::failure(frame.id, &e)),
    };

    let expects_response = request.expects_response();
    let result = session.handle(request).await;
    if !expects_response {
        return None;
    }

    Some(match result {
        Ok(value) => Response::success(frame.id, value),
        Err(e) => Response::failure(frame.id, &e),
    })
}

async fn send_json<T: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(payload) {
        Ok(text) => text,
        Err(e) => {
            warn!(target: "room.signaling", error = %e, "Failed to serialize outbound frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await
}
