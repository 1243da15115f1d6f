use crate::error::{LedgerError, Result};
use crate::types::Choice;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SECRET_LEN: usize = 32;

/// Trait for commitment schemes
///
/// Both sides of a session must agree on the scheme: the client commits with
/// it and the authoritative side verifies reveals with it.
pub trait CommitmentScheme: Send + Sync {
    fn commit(&self, choice: Choice, secret: &Secret) -> Commitment;

    fn verify(&self, choice: Choice, secret: &Secret, commitment: &Commitment) -> bool {
        self.commit(choice, secret) == *commitment
    }
}

/// Binding digest of a choice and a secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Commitment([u8; 32]);

impl Commitment {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Commitment> for String {
    fn from(commitment: Commitment) -> Self {
        commitment.to_hex()
    }
}

impl TryFrom<String> for Commitment {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        decode_32(&value).map(Self)
    }
}

/// The hiding half of a commitment. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SECRET_LEN] = bytes.try_into().map_err(|_| {
            LedgerError::crypto(format!(
                "secret must be {} bytes, got {}",
                SECRET_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        decode_32(value).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

fn decode_32(value: &str) -> Result<[u8; 32]> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped)
        .map_err(|e| LedgerError::crypto(format!("invalid hex: {}", e)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| LedgerError::crypto(format!("expected 32 bytes, got {}", bytes.len())))
}
