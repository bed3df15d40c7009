use thiserror::Error;

/// Error types for the live game server
#[derive(Debug, Error)]
pub enum GameError {
    /// Handshake errors
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Protocol errors
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigurationParseFailed(String),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using GameError
pub type Result<T> = std::result::Result<T, GameError>;

impl GameError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        GameError::Internal(msg.into())
    }

    /// Helper to create credential errors
    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        GameError::InvalidCredential(msg.into())
    }

    /// True for errors raised while authenticating a handshake
    pub fn is_auth(&self) -> bool {
        matches!(self, GameError::MissingCredential | GameError::InvalidCredential(_))
    }
}

impl warp::reject::Reject for GameError {}
