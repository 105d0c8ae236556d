// ABOUTME: Domain error taxonomy shared by every orchestration component.
// ABOUTME: Maps one-to-one onto the HTTP error responses the boundary emits.

use thiserror::Error;

/// Failure taxonomy for chat orchestration.
///
/// `Identity` and `Transport` wrap external-service failures and propagate
/// without retries; a single failed call fails the whole operation.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("identity service error: {0}")]
    Identity(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }

    pub fn identity(what: impl Into<String>) -> Self {
        Self::Identity(what.into())
    }

    pub fn transport(what: impl Into<String>) -> Self {
        Self::Transport(what.into())
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
