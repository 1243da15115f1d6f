//! Split-or-steal session client
//!
//! Keeps a local view of one commit-reveal session in step with the
//! authoritative ledger. Each notification triggers a fresh snapshot read;
//! the UI phase is derived from that snapshot alone. The secret behind a
//! commitment never leaves this process except in the reveal.

pub mod error;
pub mod lobby;
pub mod notification;
pub mod orchestrator;
pub mod outcome;
pub mod participant;
pub mod phase;

pub use error::{Result, SessionError};
pub use lobby::{create_session, join_session};
pub use notification::{decode_settlement, decode_settlement_for, EventLog, NotificationRecord};
pub use orchestrator::{
    OrchestratorState, SessionContext, SessionOrchestrator, SessionStatus, SessionView,
};
pub use outcome::{classify, resolve, Classification, Outcome};
pub use participant::{LocalParticipant, LocalSecret, ParticipantState};
pub use phase::{derive, Phase, Seat};
