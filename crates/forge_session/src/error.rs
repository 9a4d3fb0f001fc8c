//! Error types for the session coordinator.

use thiserror::Error;

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by collaborators, configuration and artifact export.
///
/// None of these ever escape a driver task: the chat and build drivers turn
/// them into `Phase::Error` plus a human-readable turn.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Generation returned no files")]
    EmptyResult,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
