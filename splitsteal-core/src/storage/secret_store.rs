use crate::commitment::{Secret, SECRET_LEN};
use crate::error::{LedgerError, Result};
use crate::storage::encryption::{self, Sealed};
use crate::storage::Storage;
use crate::types::{AccountId, Choice, SessionId};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Passphrase-sealed copy of the reveal secret, so a restart between commit
/// and reveal does not strand the participant.
pub struct SecretVault {
    storage: Arc<Storage>,
    passphrase: String,
}

impl SecretVault {
    /// Opens (or creates) the vault database at `db_path`.
    pub async fn open(db_path: &Path, passphrase: impl Into<String>) -> Result<Self> {
        let storage = Storage::new(db_path).await?;
        Ok(Self::new(Arc::new(storage), passphrase))
    }

    pub fn new(storage: Arc<Storage>, passphrase: impl Into<String>) -> Self {
        Self {
            storage,
            passphrase: passphrase.into(),
        }
    }

    pub async fn save(
        &self,
        session_id: SessionId,
        account: &AccountId,
        choice: Choice,
        secret: &Secret,
    ) -> Result<()> {
        let mut plaintext = Vec::with_capacity(1 + SECRET_LEN);
        plaintext.push(choice.code());
        plaintext.extend_from_slice(secret.as_bytes());
        let sealed = encryption::seal(&plaintext, &self.passphrase)?;

        let conn = self.storage.get_connection().await;
        conn.execute(
            "INSERT OR REPLACE INTO pending_secrets (session_id, account, salt, nonce, sealed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.0 as i64,
                account.as_str(),
                sealed.salt,
                sealed.nonce,
                sealed.ciphertext,
                Utc::now().timestamp(),
            ],
        )?;

        tracing::debug!("Sealed reveal secret for session {}", session_id);
        Ok(())
    }

    pub async fn load(
        &self,
        session_id: SessionId,
        account: &AccountId,
    ) -> Result<Option<(Choice, Secret)>> {
        let sealed = {
            let conn = self.storage.get_connection().await;
            conn.query_row(
                "SELECT salt, nonce, sealed FROM pending_secrets WHERE session_id = ?1 AND account = ?2",
                params![session_id.0 as i64, account.as_str()],
                |row| {
                    Ok(Sealed {
                        salt: row.get(0)?,
                        nonce: row.get(1)?,
                        ciphertext: row.get(2)?,
                    })
                },
            )
            .optional()?
        };

        let Some(sealed) = sealed else {
            return Ok(None);
        };

        let plaintext = encryption::open(&sealed, &self.passphrase)?;
        let (code, secret) = plaintext
            .split_first()
            .ok_or_else(|| LedgerError::crypto("Sealed secret is empty"))?;
        let choice = Choice::try_from(*code)?;
        let secret = Secret::from_slice(secret)?;

        Ok(Some((choice, secret)))
    }

    pub async fn remove(&self, session_id: SessionId, account: &AccountId) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "DELETE FROM pending_secrets WHERE session_id = ?1 AND account = ?2",
            params![session_id.0 as i64, account.as_str()],
        )?;
        Ok(())
    }
}
