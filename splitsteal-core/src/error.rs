use crate::types::SessionId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Transient read error: {0}")]
    TransientRead(String),

    #[error("Transient submit error: {0}")]
    TransientSubmit(String),

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Operation reverted: {0}")]
    Reverted(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn transient_read(msg: impl Into<String>) -> Self {
        Self::TransientRead(msg.into())
    }

    pub fn transient_submit(msg: impl Into<String>) -> Self {
        Self::TransientSubmit(msg.into())
    }

    pub fn reverted(msg: impl Into<String>) -> Self {
        Self::Reverted(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Network-level failures that may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRead(_) | Self::TransientSubmit(_))
    }
}
