//! splitsteal core - types and collaborator interfaces for split-or-steal sessions
//!
//! This library holds everything the session client shares with the
//! authoritative side: the session data model, the commitment scheme both
//! sides agree on, the snapshot/event/signing interfaces, and an in-memory
//! ledger that plays the contract's role in tests and demos.

pub mod commitment;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

pub use commitment::{Commitment, CommitmentScheme, Secret, Sha256Commitment};
pub use config::{ClientConfig, SecretPersistence};
pub use error::{LedgerError, Result};
pub use ledger::memory::{LedgerFaults, MemoryLedger};
pub use ledger::{
    EventStream, NotificationKind, Operation, RawNotification, Receipt, RemoteGameSnapshot,
    Signer, Subscription,
};
pub use storage::{SecretVault, Storage};
pub use types::{AccountId, Amount, Choice, Role, Session, SessionId, Settlement, Stage};
