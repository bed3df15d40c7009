use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use rand::Rng;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use super::broadcast::{Broadcaster, Outbox};
use super::connection::Connection;
use super::now_millis;
use super::protocol::{
    AnswerValidated, ClientEvent, MarkMessageAsRead, MessageRead, Presence, ScoreUpdated,
    SendAnswer, SendMessage, ServerEvent, TypingIndicator, TypingNotice, UpdateScore,
    ValidateAnswer,
};
use super::registry::RoomRegistry;
use super::room::Room;
use super::sweeper::{spawn_room_reaper, DisconnectSweeper};
use crate::auth::AuthenticatedUser;

/// Points awarded for a correct answer when the validator names none.
pub const DEFAULT_POINTS: i64 = 10;

/// Counters exposed on the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CoordinatorStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Applies client events to room state and fans the results out.
///
/// Every handler holds the target room's lock from lookup through the last
/// broadcast, so each event is atomic with respect to others on that room and
/// subscribers see a room's events in the order they were applied.
pub struct GameCoordinator {
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
    sweeper: DisconnectSweeper,
    next_connection: AtomicU64,
    live_connections: AtomicUsize,
}

impl GameCoordinator {
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new());
        Arc::new(Self {
            sweeper: DisconnectSweeper::new(registry.clone(), broadcaster.clone()),
            registry,
            broadcaster,
            next_connection: AtomicU64::new(1),
            live_connections: AtomicUsize::new(0),
        })
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn start_room_reaper(&self, idle_timeout: Duration, interval: Duration) -> JoinHandle<()> {
        spawn_room_reaper(
            self.registry.clone(),
            self.broadcaster.clone(),
            idle_timeout,
            interval,
        )
    }

    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            rooms: self.registry.len().await,
            connections: self.live_connections.load(Ordering::Relaxed),
        }
    }

    /// Registers an authenticated link and assigns it a unique connection id.
    pub fn connect(&self, user: AuthenticatedUser, outbox: Outbox) -> Connection {
        let seq = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        let id = format!("{:x}-{:08x}", seq, suffix);

        self.live_connections.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            connection_id = %id,
            user_id = ?user.user_id,
            role = ?user.role,
            "Connection registered"
        );
        Connection::new(id, user, outbox)
    }

    /// Runs the disconnect sweep. Safe to call more than once per connection.
    pub async fn disconnect(&self, connection_id: &str) {
        let swept = self.sweeper.sweep(connection_id).await;
        if swept > 0 {
            tracing::info!(
                connection_id = %connection_id,
                rooms = swept,
                "Connection swept from rooms"
            );
        }
    }

    /// Releases the connection's slot in the live counters.
    pub fn release(&self, connection_id: &str) {
        self.live_connections.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(connection_id = %connection_id, "Connection released");
    }

    pub async fn handle_event(&self, connection: &Connection, event: ClientEvent) {
        tracing::debug!(
            connection_id = %connection.id,
            event = event.name(),
            "Dispatching client event"
        );

        match event {
            ClientEvent::JoinGame(room_id) => self.join_game(connection, &room_id).await,
            ClientEvent::LeaveGame(room_id) => self.leave_game(connection, &room_id).await,
            ClientEvent::SendAnswer(payload) => self.send_answer(connection, payload).await,
            ClientEvent::ValidateAnswer(payload) => self.validate_answer(payload).await,
            ClientEvent::UpdateScore(payload) => self.update_score(payload).await,
            ClientEvent::SendMessage(payload) => self.send_message(connection, payload).await,
            ClientEvent::Typing(payload) => self.set_typing(connection, payload, true).await,
            ClientEvent::StopTyping(payload) => self.set_typing(connection, payload, false).await,
            ClientEvent::MarkMessageAsRead(payload) => {
                self.mark_message_as_read(connection, payload).await
            }
        }
    }

    /// Locks an existing, open room. Missing rooms are silently ignored.
    async fn lock_room(&self, room_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let Some(room) = self.registry.get(room_id).await else {
            tracing::debug!(room_id = %room_id, "Ignoring event for unknown room");
            return None;
        };
        let state = room.lock_owned().await;
        if state.is_closed() {
            tracing::debug!(room_id = %room_id, "Ignoring event for closed room");
            return None;
        }
        Some(state)
    }

    pub async fn join_game(&self, connection: &Connection, room_id: &str) {
        let user_id = connection.identity();

        // A room can be reaped between lookup and lock; retry onto a fresh one.
        let mut state = loop {
            let room = self.registry.get_or_create(room_id).await;
            let state = room.lock_owned().await;
            if !state.is_closed() {
                break state;
            }
        };

        self.broadcaster
            .subscribe(room_id, &connection.id, connection.outbox.clone())
            .await;
        let now = now_millis();
        state.join(&connection.id, &user_id, now);

        tracing::info!(
            room_id = %room_id,
            connection_id = %connection.id,
            user_id = %user_id,
            participants = state.participant_count(),
            "Participant joined room"
        );

        self.broadcast_snapshot(&state).await;
        self.broadcaster
            .to_room_except(
                room_id,
                &connection.id,
                &ServerEvent::UserJoined(Presence {
                    user_id,
                    timestamp: now,
                }),
            )
            .await;
    }

    pub async fn leave_game(&self, connection: &Connection, room_id: &str) {
        let Some(mut state) = self.lock_room(room_id).await else {
            return;
        };

        self.broadcaster.unsubscribe(room_id, &connection.id).await;

        let Some(participant) = state.leave(&connection.id) else {
            return;
        };

        tracing::info!(
            room_id = %room_id,
            connection_id = %connection.id,
            user_id = %participant.user_id,
            "Participant left room"
        );

        self.broadcaster
            .to_room(room_id, &ServerEvent::ParticipantsList(state.participants_list()))
            .await;
        self.broadcaster
            .to_room_except(
                room_id,
                &connection.id,
                &ServerEvent::UserLeft(Presence {
                    user_id: participant.user_id,
                    timestamp: now_millis(),
                }),
            )
            .await;
    }

    pub async fn send_answer(&self, connection: &Connection, payload: SendAnswer) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let user_id = state.resolve_user(&connection.id, &connection.identity());
        let answer = state.submit_answer(&user_id, payload.answer, now_millis());

        tracing::debug!(
            room_id = %payload.game_id,
            answer_id = %answer.id,
            user_id = %user_id,
            "Answer submitted"
        );

        self.broadcaster
            .to_room(&payload.game_id, &ServerEvent::NewAnswer(answer))
            .await;
        self.broadcaster
            .to_room(&payload.game_id, &ServerEvent::AnswersList(state.answers_list()))
            .await;
    }

    pub async fn validate_answer(&self, payload: ValidateAnswer) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let now = now_millis();
        let points = payload.points.unwrap_or(DEFAULT_POINTS);
        let Some(validation) =
            state.validate_answer(&payload.answer_id, payload.is_correct, points, now)
        else {
            tracing::debug!(
                room_id = %payload.game_id,
                answer_id = %payload.answer_id,
                "Ignoring validation for unknown answer"
            );
            return;
        };

        tracing::info!(
            room_id = %payload.game_id,
            answer_id = %validation.answer_id,
            user_id = %validation.user_id,
            is_correct = validation.is_correct,
            "Answer validated"
        );

        let room_id = payload.game_id.as_str();
        if let Some((delta, total)) = validation.awarded {
            self.broadcaster
                .to_room(
                    room_id,
                    &ServerEvent::ScoreUpdated(ScoreUpdated {
                        user_id: validation.user_id.clone(),
                        score: delta,
                        total_score: total,
                        timestamp: now,
                    }),
                )
                .await;
        }
        self.broadcaster
            .to_room(
                room_id,
                &ServerEvent::AnswerValidated(AnswerValidated {
                    answer_id: validation.answer_id,
                    is_correct: validation.is_correct,
                    timestamp: now,
                }),
            )
            .await;
        self.broadcaster
            .to_room(room_id, &ServerEvent::ScoresList(state.scores_list()))
            .await;
        self.broadcaster
            .to_room(room_id, &ServerEvent::AnswersList(state.answers_list()))
            .await;
    }

    /// Direct score adjustment, independent of any answer.
    pub async fn update_score(&self, payload: UpdateScore) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let total = state.adjust_score(&payload.user_id, payload.score);
        tracing::info!(
            room_id = %payload.game_id,
            user_id = %payload.user_id,
            delta = payload.score,
            total,
            "Score adjusted"
        );

        self.broadcaster
            .to_room(
                &payload.game_id,
                &ServerEvent::ScoreUpdated(ScoreUpdated {
                    user_id: payload.user_id,
                    score: payload.score,
                    total_score: total,
                    timestamp: now_millis(),
                }),
            )
            .await;
        self.broadcaster
            .to_room(&payload.game_id, &ServerEvent::ScoresList(state.scores_list()))
            .await;
    }

    pub async fn send_message(&self, connection: &Connection, payload: SendMessage) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let user_id = state.resolve_user(&connection.id, &connection.identity());
        let message = state.post_message(&user_id, payload.content, now_millis());

        self.broadcaster
            .to_room(&payload.game_id, &ServerEvent::NewMessage(message))
            .await;
    }

    /// Typing indicators use the server-side identity; a client-supplied
    /// `userId` is ignored.
    pub async fn set_typing(&self, connection: &Connection, payload: TypingIndicator, typing: bool) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let user_id = state.resolve_user(&connection.id, &connection.identity());
        if let Some(claimed) = payload.user_id.as_deref() {
            if claimed != user_id {
                tracing::warn!(
                    room_id = %payload.game_id,
                    connection_id = %connection.id,
                    claimed = %claimed,
                    user_id = %user_id,
                    "Ignoring client-supplied typing identity"
                );
            }
        }

        state.set_typing(&user_id, typing);
        let notice = TypingNotice { user_id };
        let event = if typing {
            ServerEvent::UserTyping(notice)
        } else {
            ServerEvent::UserStoppedTyping(notice)
        };
        self.broadcaster
            .to_room_except(&payload.game_id, &connection.id, &event)
            .await;
    }

    pub async fn mark_message_as_read(&self, connection: &Connection, payload: MarkMessageAsRead) {
        let Some(mut state) = self.lock_room(&payload.game_id).await else {
            return;
        };

        let user_id = state.resolve_user(&connection.id, &connection.identity());
        if !state.mark_read(&payload.message_id, &user_id) {
            tracing::debug!(
                room_id = %payload.game_id,
                message_id = %payload.message_id,
                "Ignoring read receipt for unknown message"
            );
            return;
        }

        self.broadcaster
            .to_room(
                &payload.game_id,
                &ServerEvent::MessageRead(MessageRead {
                    message_id: payload.message_id,
                    user_id,
                    timestamp: now_millis(),
                }),
            )
            .await;
    }

    async fn broadcast_snapshot(&self, state: &Room) {
        let room_id = state.id();
        self.broadcaster
            .to_room(room_id, &ServerEvent::ParticipantsList(state.participants_list()))
            .await;
        self.broadcaster
            .to_room(room_id, &ServerEvent::ScoresList(state.scores_list()))
            .await;
        self.broadcaster
            .to_room(room_id, &ServerEvent::AnswersList(state.answers_list()))
            .await;
        self.broadcaster
            .to_room(room_id, &ServerEvent::ChatHistory(state.chat_history()))
            .await;
    }
}
