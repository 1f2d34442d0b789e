//! WebSocket handler for protocol sessions.
//!
//! Each frame is one protocol message. Replies are queued through the
//! connection manager and written by a dedicated task, so they leave in the
//! order the handlers produced them. A frame the server cannot answer ends
//! the connection, which fails the client's session.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use syncdb_engine::Message;
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::AppState;

use super::process_message;

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection with the manager
/// 2. Spawns a task to forward outgoing messages
/// 3. Processes incoming messages in a loop
/// 4. Closes the socket on disconnect or on the first rejected frame
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_manager = state.conn_manager.clone();
    let conn_id = conn_manager.register(tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg.encode() {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(WsMessage::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
        let _ = ws_sender.send(WsMessage::Close(None)).await;
    });

    while let Some(result) = ws_receiver.next().await {
        let text = match result {
            Ok(WsMessage::Text(text)) => text.as_str().to_string(),
            Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(conn_id = %conn_id, "non-UTF-8 binary frame dropped");
                    continue;
                }
            },
            Ok(WsMessage::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
                continue;
            }
            Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        };

        if let Err(e) = handle_frame(&state, &conn_id, &text).await {
            tracing::warn!(conn_id = %conn_id, "closing connection: {}", e);
            break;
        }
    }

    // Dropping the registered sender lets the writer flush and send a close frame
    conn_manager.unregister(&conn_id);
    let _ = send_task.await;

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

async fn handle_frame(state: &AppState, conn_id: &str, text: &str) -> Result<()> {
    let message = Message::decode(text)?;
    tracing::debug!(conn_id = %conn_id, kind = message.kind(), "message received");

    for reply in process_message(state, message).await? {
        if !state.conn_manager.send_to(conn_id, reply) {
            return Err(AppError::Internal(format!(
                "connection {conn_id} stopped accepting replies"
            )));
        }
    }
    Ok(())
}
