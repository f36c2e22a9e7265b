//! WebSocket handler for live waitlist counts.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::waitlist::WAITLIST;
use crate::websocket::{ClientMessage, ServerMessage};
use crate::AppState;

use super::handle_count;

/// Handle an established WebSocket connection.
///
/// The connection is registered with the manager, subscribed to the
/// waitlist collection, and answers `ping` and `count` until it closes.
pub async fn handle_waitlist_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_manager = state.conn_manager.clone();
    let conn_id = conn_manager.register(tx);
    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    let subscription = {
        let conn_manager = conn_manager.clone();
        let conn_id = conn_id.clone();
        state.store.subscribe(WAITLIST, move |records| {
            conn_manager.send_to(&conn_id, ServerMessage::Count {
                count: records.len(),
            });
        })
    };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => ServerMessage::Pong,
                    Ok(ClientMessage::Count) => ServerMessage::Count {
                        count: handle_count(&state.store).await.count,
                    },
                    Err(e) => ServerMessage::error(format!("Invalid message format: {}", e)),
                };
                conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    subscription.unsubscribe();
    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}
