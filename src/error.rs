//! Typed failure taxonomy for room operations.
//!
//! Everything here is recoverable by the sender except [`RoomError::RoomNotFound`]
//! and a destroyed room, which are terminal for that session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("message not valid in phase {phase}")]
    InvalidTransition { phase: &'static str },
    #[error("host-only action")]
    AuthorizationDenied,
    #[error("session no longer valid")]
    SessionInvalid,
    #[error("room is full")]
    RoomFull,
    #[error("room no longer exists")]
    RoomNotFound,
    #[error("claimed symbol is not a match")]
    ValidationFailed,
}

/// Stable wire identifiers, matched by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidTransition,
    AuthorizationDenied,
    SessionInvalid,
    RoomFull,
    RoomNotFound,
    ValidationFailed,
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            RoomError::AuthorizationDenied => ErrorCode::AuthorizationDenied,
            RoomError::SessionInvalid => ErrorCode::SessionInvalid,
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::RoomNotFound => ErrorCode::RoomNotFound,
            RoomError::ValidationFailed => ErrorCode::ValidationFailed,
        }
    }
}
