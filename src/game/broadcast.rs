//! Per-room fan-out to connection outboxes.
//!
//! Each connection owns an unbounded outbox drained by its WebSocket writer
//! task. A room's subscriber set maps connection ids to those outboxes; an
//! event is serialized once and cloned into every outbox.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use super::protocol::ServerEvent;
use super::room::ConnectionId;

pub type Outbox = mpsc::UnboundedSender<Message>;

#[derive(Default)]
pub struct Broadcaster {
    rooms: Arc<RwLock<HashMap<String, HashMap<ConnectionId, Outbox>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, room_id: &str, connection_id: &str, outbox: Outbox) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string(), outbox);
    }

    pub async fn unsubscribe(&self, room_id: &str, connection_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(subscribers) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = subscribers.remove(connection_id).is_some();
        if subscribers.is_empty() {
            rooms.remove(room_id);
        }
        removed
    }

    /// Drops the connection from every room channel. Returns the rooms it left.
    pub async fn unsubscribe_all(&self, connection_id: &str) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|room_id, subscribers| {
            if subscribers.remove(connection_id).is_some() {
                left.push(room_id.clone());
            }
            !subscribers.is_empty()
        });
        left
    }

    /// Forgets every subscription to `room_id`.
    pub async fn drop_room(&self, room_id: &str) {
        self.rooms.write().await.remove(room_id);
    }

    /// Delivers to every subscriber of `room_id`, sender included.
    pub async fn to_room(&self, room_id: &str, event: &ServerEvent) -> usize {
        self.fan_out(room_id, None, event).await
    }

    /// Delivers to every subscriber of `room_id` except `sender`.
    pub async fn to_room_except(&self, room_id: &str, sender: &str, event: &ServerEvent) -> usize {
        self.fan_out(room_id, Some(sender), event).await
    }

    async fn fan_out(&self, room_id: &str, skip: Option<&str>, event: &ServerEvent) -> usize {
        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "Failed to serialize room event");
                return 0;
            }
        };

        let rooms = self.rooms.read().await;
        let Some(subscribers) = rooms.get(room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, outbox) in subscribers {
            if Some(connection_id.as_str()) == skip {
                continue;
            }
            // A closed outbox belongs to a connection mid-disconnect; its sweep
            // removes the subscription.
            if outbox.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(
                    room_id = %room_id,
                    connection_id = %connection_id,
                    "Dropping event for closed connection"
                );
            }
        }
        delivered
    }
}
