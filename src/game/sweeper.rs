use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::broadcast::Broadcaster;
use super::now_millis;
use super::protocol::{Presence, ServerEvent};
use super::registry::RoomRegistry;

/// Cleans up after connections that went away without leaving their rooms.
pub struct DisconnectSweeper {
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl DisconnectSweeper {
    pub fn new(registry: Arc<RoomRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// Removes `connection_id` from every room it participates in and notifies
    /// the remaining members. Returns the number of rooms it was removed from;
    /// a repeated sweep finds nothing and sends nothing.
    pub async fn sweep(&self, connection_id: &str) -> usize {
        self.broadcaster.unsubscribe_all(connection_id).await;

        let mut swept = 0;
        for room in self.registry.all().await {
            let mut state = room.lock().await;
            if state.is_closed() {
                continue;
            }
            let Some(participant) = state.leave(connection_id) else {
                continue;
            };
            swept += 1;

            let room_id = state.id().to_string();
            tracing::info!(
                room_id = %room_id,
                connection_id = %connection_id,
                user_id = %participant.user_id,
                "Swept disconnected participant"
            );

            self.broadcaster
                .to_room(&room_id, &ServerEvent::ParticipantsList(state.participants_list()))
                .await;
            self.broadcaster
                .to_room_except(
                    &room_id,
                    connection_id,
                    &ServerEvent::UserLeft(Presence {
                        user_id: participant.user_id,
                        timestamp: now_millis(),
                    }),
                )
                .await;
        }
        swept
    }
}

/// Periodically drops rooms that have stayed empty for `idle_timeout`, along
/// with their broadcast channels.
pub fn spawn_room_reaper(
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
    idle_timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tracing::info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        interval_secs = interval.as_secs(),
        "Room reaper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(idle_timeout, Instant::now()).await;
            for room_id in &reaped {
                broadcaster.drop_room(room_id).await;
            }
            if !reaped.is_empty() {
                tracing::debug!(count = reaped.len(), "Reaper pass removed rooms");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_sweep_removes_from_all_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let sweeper = DisconnectSweeper::new(registry.clone(), broadcaster.clone());

        for room_id in ["R1", "R2"] {
            let room = registry.get_or_create(room_id).await;
            let mut state = room.lock().await;
            state.join("c1", "u1", 1);
            state.join("c2", "u2", 2);
            state.set_typing("u1", true);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.subscribe("R1", "c2", tx).await;

        assert_eq!(sweeper.sweep("c1").await, 2);
        for room_id in ["R1", "R2"] {
            let room = registry.get(room_id).await.unwrap();
            let state = room.lock().await;
            assert!(!state.is_participant("c1"));
            assert!(state.is_participant("c2"));
            assert!(!state.is_typing("u1"));
        }

        let first: serde_json::Value =
            serde_json::from_str(rx.try_recv().unwrap().to_str().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(rx.try_recv().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(first["event"], "participantsList");
        assert_eq!(second["event"], "userLeft");
        assert_eq!(second["data"]["userId"], "u1");
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let sweeper = DisconnectSweeper::new(registry.clone(), broadcaster.clone());

        registry.get_or_create("R1").await.lock().await.join("c1", "u1", 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.subscribe("R1", "observer", tx).await;

        assert_eq!(sweeper.sweep("c1").await, 1);
        while rx.try_recv().is_ok() {}

        assert_eq!(sweeper.sweep("c1").await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reaper_removes_idle_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new());
        registry.get_or_create("R1").await;
        // A subscription left behind by a connection that never joined.
        let (tx, _rx) = mpsc::unbounded_channel();
        broadcaster.subscribe("R1", "stale", tx).await;

        let handle = spawn_room_reaper(
            registry.clone(),
            broadcaster.clone(),
            Duration::from_millis(0),
            Duration::from_millis(10),
        );
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty().await);
        let event = ServerEvent::UserLeft(Presence { user_id: "u1".into(), timestamp: 1 });
        assert_eq!(broadcaster.to_room("R1", &event).await, 0);
        handle.abort();
    }
}
