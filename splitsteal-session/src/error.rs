use splitsteal_core::{LedgerError, SessionId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Not a participant in session {0}")]
    NotAParticipant(SessionId),

    #[error("No choice selected")]
    NoChoiceSelected,

    #[error("Choice already committed")]
    AlreadyCommitted,

    #[error("Choice already revealed")]
    AlreadyRevealed,

    #[error("Reveal secret lost for session {0}")]
    SecretLost(SessionId),

    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("Session view torn down")]
    TornDown,

    #[error("Submission task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedNotification(msg.into())
    }
}
