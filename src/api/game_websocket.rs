use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};

use crate::auth::AuthenticatedUser;
use crate::game::protocol::ErrorNotice;
use crate::game::{ClientEvent, Connection, GameCoordinator, ServerEvent};

pub async fn handle_game_websocket(
    websocket: WebSocket,
    user: AuthenticatedUser,
    coordinator: Arc<GameCoordinator>,
) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let connection = coordinator.connect(user, tx);
    let connection_id = connection.id.clone();
    tracing::info!(connection_id = %connection_id, "Game WebSocket connection established");

    // Spawn task to send messages to client
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    // Events are handled on their own task so the sweep below runs even if a
    // handler panics.
    let receive_coordinator = coordinator.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(message) => {
                    if message.is_close() {
                        break;
                    }
                    handle_websocket_message(&receive_coordinator, &connection, message).await;
                }
                Err(e) => {
                    tracing::error!(connection_id = %connection.id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    });

    if let Err(e) = receive_task.await {
        tracing::error!(
            connection_id = %connection_id,
            error = %e,
            "Game WebSocket receive task failed"
        );
    }

    coordinator.disconnect(&connection_id).await;
    coordinator.release(&connection_id);
    sender_task.abort();
    tracing::info!(connection_id = %connection_id, "Game WebSocket connection closed");
}

async fn handle_websocket_message(
    coordinator: &GameCoordinator,
    connection: &Connection,
    message: Message,
) {
    let Ok(text) = message.to_str() else {
        return;
    };
    tracing::debug!(connection_id = %connection.id, "Received game message: {}", text);

    match ClientEvent::parse(text) {
        Ok(event) => coordinator.handle_event(connection, event).await,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection.id,
                error = %e,
                raw_message = %text,
                "Failed to parse game message"
            );
            let notice = ServerEvent::Error(ErrorNotice {
                message: e.to_string(),
            });
            if let Err(e) = connection.send(&notice) {
                tracing::error!(error = %e, "Failed to report malformed message");
            }
        }
    }
}
