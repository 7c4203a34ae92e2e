use thiserror::Error;

use crate::models::{RecordViolation, SessionId};
use crate::store::StoreError;

/// Why a turn could not be processed.
///
/// Gateway failures never show up here: every step has a fallback.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {0} is already complete; start a new session to revise it")]
    SessionAlreadyComplete(SessionId),

    #[error("session {0} is not waiting for an answer")]
    NotAwaitingInput(SessionId),

    #[error("feature record failed validation: {0}")]
    MalformedRecord(RecordViolation),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl TurnError {
    /// Stable status string reported to collaborators.
    pub fn status(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionAlreadyComplete(_) => "session_already_complete",
            Self::NotAwaitingInput(_) => "not_awaiting_input",
            Self::MalformedRecord(_) => "malformed_record",
            Self::Store(_) => "internal_error",
        }
    }

    /// True for errors caused by the caller rather than by the assistant.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::SessionAlreadyComplete(_) | Self::NotAwaitingInput(_)
        )
    }
}
