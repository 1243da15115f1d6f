use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client-side tuning for one session view. Endpoints are not part of it:
/// the caller hands the orchestrator already-connected collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub fetch_retries: u32,
    pub retry_delay: Duration,
    pub event_log_capacity: usize,
    pub secret_persistence: SecretPersistence,
}

/// Where the pending reveal secret lives between commit and reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretPersistence {
    /// Process memory only. A restart before reveal loses the secret.
    Memory,
    /// Sealed under a passphrase in a local SQLite database.
    Encrypted { db_path: PathBuf },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fetch_retries: 3,
            retry_delay: Duration::from_millis(500),
            event_log_capacity: 32,
            secret_persistence: SecretPersistence::Memory,
        }
    }
}

impl ClientConfig {
    pub fn with_encrypted_secrets(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.secret_persistence = SecretPersistence::Encrypted {
            db_path: db_path.into(),
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_log_capacity == 0 {
            return Err(LedgerError::config(
                "Event log capacity must be greater than 0",
            ));
        }

        if self.retry_delay.is_zero() {
            return Err(LedgerError::config("Retry delay must be greater than 0"));
        }

        if let SecretPersistence::Encrypted { db_path } = &self.secret_persistence {
            if db_path.as_os_str().is_empty() {
                return Err(LedgerError::config("Secret database path cannot be empty"));
            }
        }

        Ok(())
    }
}
