use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use super::room::Room;

pub type SharedRoom = Arc<Mutex<Room>>;

/// Maps room ids to live room state.
///
/// Handlers lock a room's mutex for the whole read-modify-broadcast sequence;
/// the registry lock is only held to look rooms up or insert them.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `room_id`, creating it if absent. Concurrent callers
    /// for the same id all observe the same instance.
    pub async fn get_or_create(&self, room_id: &str) -> SharedRoom {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(Mutex::new(Room::new(room_id)));
        rooms.insert(room_id.to_string(), room.clone());
        tracing::info!(room_id = %room_id, "Room created");
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Closes and removes the room. The room is closed before it leaves the map,
    /// so a handler that locks it afterwards sees it closed rather than joining
    /// an unregistered room.
    pub async fn delete(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_id) else {
            return false;
        };
        room.lock().await.close();
        rooms.remove(room_id);
        tracing::info!(room_id = %room_id, "Room deleted");
        true
    }

    pub async fn all(&self) -> Vec<SharedRoom> {
        self.rooms.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Removes rooms that have had no participants for `timeout`. Rooms whose
    /// lock is busy are in use and skipped this round.
    pub async fn reap_idle(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut reaped = Vec::new();

        rooms.retain(|room_id, room| match room.try_lock() {
            Ok(mut state) if state.is_idle(timeout, now) => {
                state.close();
                reaped.push(room_id.clone());
                false
            }
            _ => true,
        });

        for room_id in &reaped {
            tracing::info!(room_id = %room_id, "Reaped idle room");
        }
        reaped
    }
}
