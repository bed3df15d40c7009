use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub type ConnectionId = String;

/// Identity used for a connection whose credential carries no user id.
pub fn guest_identity(connection_id: &str) -> String {
    format!("guest-{}", connection_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Active,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub joined_at: u64,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub joined_at: u64,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub user_id: String,
    pub score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Pending,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub user_id: String,
    pub answer: serde_json::Value,
    pub status: AnswerStatus,
    pub submitted_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub timestamp: u64,
    pub status: MessageStatus,
    pub read_by: BTreeSet<String>,
}

/// Result of validating a pending answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub answer_id: String,
    pub user_id: String,
    pub is_correct: bool,
    /// `(delta, new total)` when points were awarded.
    pub awarded: Option<(i64, i64)>,
}

/// State of one live game session.
///
/// Answers and messages are append-only, so their positions are stable and
/// double as the lookup index.
#[derive(Debug)]
pub struct Room {
    id: String,
    participants: HashMap<ConnectionId, Participant>,
    scores: HashMap<String, i64>,
    answers: Vec<Answer>,
    answer_index: HashMap<String, usize>,
    messages: Vec<ChatMessage>,
    message_index: HashMap<String, usize>,
    typing_users: BTreeSet<String>,
    next_seq: u64,
    last_activity: Instant,
    closed: bool,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participants: HashMap::new(),
            scores: HashMap::new(),
            answers: Vec::new(),
            answer_index: HashMap::new(),
            messages: Vec::new(),
            message_index: HashMap::new(),
            typing_users: BTreeSet::new(),
            next_seq: 1,
            last_activity: Instant::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn next_id(&mut self, prefix: &str) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        format!("{}-{}", prefix, seq)
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn ensure_score(&mut self, user_id: &str) -> i64 {
        *self.scores.entry(user_id.to_string()).or_insert(0)
    }

    /// Inserts or refreshes the membership of `connection_id`. Returns true if the
    /// connection was not already a participant.
    pub fn join(&mut self, connection_id: &str, user_id: &str, now: u64) -> bool {
        self.touch();
        self.ensure_score(user_id);
        self.participants
            .insert(
                connection_id.to_string(),
                Participant {
                    user_id: user_id.to_string(),
                    joined_at: now,
                    status: ParticipantStatus::Active,
                },
            )
            .is_none()
    }

    /// Removes the membership of `connection_id`, clearing its typing flag.
    pub fn leave(&mut self, connection_id: &str) -> Option<Participant> {
        let participant = self.participants.remove(connection_id)?;
        self.typing_users.remove(&participant.user_id);
        self.touch();
        Some(participant)
    }

    pub fn is_participant(&self, connection_id: &str) -> bool {
        self.participants.contains_key(connection_id)
    }

    /// The participant's user identity, or `fallback` for non-members.
    pub fn resolve_user(&self, connection_id: &str, fallback: &str) -> String {
        self.participants
            .get(connection_id)
            .map(|p| p.user_id.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn submit_answer(&mut self, user_id: &str, answer: serde_json::Value, now: u64) -> Answer {
        self.touch();
        self.ensure_score(user_id);

        let entry = Answer {
            id: self.next_id("ans"),
            user_id: user_id.to_string(),
            answer,
            status: AnswerStatus::Pending,
            submitted_at: now,
            validated_at: None,
        };
        self.answer_index.insert(entry.id.clone(), self.answers.len());
        self.answers.push(entry.clone());
        entry
    }

    /// Marks an answer correct or incorrect, awarding `points` to its author when
    /// correct. Unknown answer ids return `None`.
    pub fn validate_answer(
        &mut self,
        answer_id: &str,
        is_correct: bool,
        points: i64,
        now: u64,
    ) -> Option<Validation> {
        let idx = *self.answer_index.get(answer_id)?;
        let answer = &mut self.answers[idx];
        answer.status = if is_correct {
            AnswerStatus::Correct
        } else {
            AnswerStatus::Incorrect
        };
        answer.validated_at = Some(now);
        let user_id = answer.user_id.clone();

        let awarded = is_correct.then(|| (points, self.adjust_score(&user_id, points)));
        self.touch();

        Some(Validation {
            answer_id: answer_id.to_string(),
            user_id,
            is_correct,
            awarded,
        })
    }

    /// Applies a signed delta and returns the new total. Totals saturate at the
    /// `i64` bounds.
    pub fn adjust_score(&mut self, user_id: &str, delta: i64) -> i64 {
        let total = self.scores.entry(user_id.to_string()).or_insert(0);
        *total = total.saturating_add(delta);
        *total
    }

    pub fn score(&self, user_id: &str) -> Option<i64> {
        self.scores.get(user_id).copied()
    }

    pub fn post_message(&mut self, user_id: &str, content: String, now: u64) -> ChatMessage {
        self.touch();

        let message = ChatMessage {
            id: self.next_id("msg"),
            user_id: user_id.to_string(),
            content,
            timestamp: now,
            status: MessageStatus::Sent,
            read_by: BTreeSet::from([user_id.to_string()]),
        };
        self.message_index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message.clone());
        message
    }

    /// Records `user_id` as a reader. Unknown message ids return false.
    pub fn mark_read(&mut self, message_id: &str, user_id: &str) -> bool {
        let Some(&idx) = self.message_index.get(message_id) else {
            return false;
        };
        let message = &mut self.messages[idx];
        message.read_by.insert(user_id.to_string());
        message.status = MessageStatus::Read;
        true
    }

    pub fn set_typing(&mut self, user_id: &str, typing: bool) {
        if typing {
            self.typing_users.insert(user_id.to_string());
        } else {
            self.typing_users.remove(user_id);
        }
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing_users.contains(user_id)
    }

    pub fn participants_list(&self) -> Vec<ParticipantView> {
        let mut list: Vec<ParticipantView> = self
            .participants
            .iter()
            .map(|(connection_id, p)| ParticipantView {
                connection_id: connection_id.clone(),
                user_id: p.user_id.clone(),
                joined_at: p.joined_at,
                status: p.status,
            })
            .collect();
        list.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        list
    }

    pub fn scores_list(&self) -> Vec<ScoreEntry> {
        let mut list: Vec<ScoreEntry> = self
            .scores
            .iter()
            .map(|(user_id, score)| ScoreEntry {
                user_id: user_id.clone(),
                score: *score,
            })
            .collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn answers_list(&self) -> Vec<Answer> {
        self.answers.clone()
    }

    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// True when the room has had no participants for at least `timeout`.
    pub fn is_idle(&self, timeout: Duration, now: Instant) -> bool {
        self.is_empty() && now.saturating_duration_since(self.last_activity) >= timeout
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
