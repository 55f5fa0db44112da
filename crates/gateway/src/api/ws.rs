//! WebSocket message loop: each text frame is a message request, each
//! reply the same transport payload as the HTTP route.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsMessage {
    message: String,
    session_id: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "websocket receive error");
                break;
            }
        };
        match frame {
            Message::Text(raw) => {
                let reply = match serde_json::from_str::<WsMessage>(&raw) {
                    Ok(request) if !request.message.trim().is_empty() => {
                        state
                            .orchestrator
                            .process_message(
                                request.message.trim(),
                                request.session_id.trim(),
                                request.user_id.as_deref().filter(|id| !id.is_empty()),
                                request.channel.as_deref().unwrap_or("ws"),
                            )
                            .await
                    }
                    _ => serde_json::json!({
                        "error": "expected {\"message\", \"sessionId\"}",
                    }),
                };
                let encoded = reply.to_string();
                if socket.send(Message::Text(encoded)).await.is_err() {
                    break;
                }
            }
            Message::Ping(payload) => {
                if socket.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
