use serde::{Deserialize, Serialize};
use warp::ws::Message;

use super::room::{Answer, ChatMessage, ParticipantView, ScoreEntry};
use crate::error::{GameError, Result};

/// Events sent by clients, framed as `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinGame(String),
    LeaveGame(String),
    SendAnswer(SendAnswer),
    ValidateAnswer(ValidateAnswer),
    UpdateScore(UpdateScore),
    SendMessage(SendMessage),
    Typing(TypingIndicator),
    StopTyping(TypingIndicator),
    MarkMessageAsRead(MarkMessageAsRead),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| GameError::MalformedEvent(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinGame(_) => "joinGame",
            ClientEvent::LeaveGame(_) => "leaveGame",
            ClientEvent::SendAnswer(_) => "sendAnswer",
            ClientEvent::ValidateAnswer(_) => "validateAnswer",
            ClientEvent::UpdateScore(_) => "updateScore",
            ClientEvent::SendMessage(_) => "sendMessage",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stopTyping",
            ClientEvent::MarkMessageAsRead(_) => "markMessageAsRead",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAnswer {
    pub game_id: String,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAnswer {
    pub game_id: String,
    pub answer_id: String,
    pub is_correct: bool,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScore {
    pub game_id: String,
    pub user_id: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub game_id: String,
    pub content: String,
}

/// `userId` is accepted for older clients but never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessageAsRead {
    pub game_id: String,
    pub message_id: String,
}

/// Events pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ParticipantsList(Vec<ParticipantView>),
    ScoresList(Vec<ScoreEntry>),
    AnswersList(Vec<Answer>),
    ChatHistory(Vec<ChatMessage>),
    UserJoined(Presence),
    UserLeft(Presence),
    NewAnswer(Answer),
    AnswerValidated(AnswerValidated),
    ScoreUpdated(ScoreUpdated),
    NewMessage(ChatMessage),
    UserTyping(TypingNotice),
    UserStoppedTyping(TypingNotice),
    MessageRead(MessageRead),
    Error(ErrorNotice),
}

impl ServerEvent {
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerValidated {
    pub answer_id: String,
    pub is_correct: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdated {
    pub user_id: String,
    pub score: i64,
    pub total_score: i64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRead {
    pub message_id: String,
    pub user_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
}
