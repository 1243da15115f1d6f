//! Interfaces to the authoritative side: snapshot reads, event
//! subscriptions and signed writes.

pub mod memory;

use crate::commitment::{Commitment, Secret};
use crate::error::Result;
use crate::types::{AccountId, Amount, Choice, Session, SessionId, Settlement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Read-only queries against session state. Calls never mutate anything and
/// may be repeated freely.
#[async_trait]
pub trait RemoteGameSnapshot: Send + Sync {
    async fn fetch(&self, session_id: SessionId) -> Result<Session>;

    /// Choices and payouts of a finished session. `Ok(None)` when the session
    /// is not finished or the backend cannot answer this query.
    async fn fetch_settlement(&self, _session_id: SessionId) -> Result<Option<Settlement>> {
        Ok(None)
    }
}

#[async_trait]
pub trait EventStream: Send + Sync {
    async fn subscribe(&self, session_id: SessionId) -> Result<Subscription>;
}

/// Authenticated account plus the ability to submit signed operations.
#[async_trait]
pub trait Signer: Send + Sync {
    fn account_id(&self) -> AccountId;

    async fn submit(&self, operation: Operation) -> Result<Receipt>;
}

#[derive(Debug, Clone)]
pub enum Operation {
    CreateSession {
        bet: Amount,
    },
    JoinSession {
        session_id: SessionId,
        stake: Amount,
    },
    Commit {
        session_id: SessionId,
        commitment: Commitment,
    },
    Reveal {
        session_id: SessionId,
        choice: Choice,
        secret: Secret,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateSession { .. } => "create-session",
            Operation::JoinSession { .. } => "join-session",
            Operation::Commit { .. } => "commit",
            Operation::Reveal { .. } => "reveal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_id: String,
    /// Set for session creation.
    pub session_id: Option<SessionId>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Created,
    Joined,
    Committed,
    Revealed,
    Finished,
}

impl NotificationKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, NotificationKind::Finished)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::Created => "SessionCreated",
            NotificationKind::Joined => "PlayerJoined",
            NotificationKind::Committed => "ChoiceCommitted",
            NotificationKind::Revealed => "ChoiceRevealed",
            NotificationKind::Finished => "SessionFinished",
        };
        f.write_str(name)
    }
}

/// A push event as delivered by the transport. The payload is untyped; only
/// the terminal kind is ever decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNotification {
    pub kind: NotificationKind,
    pub session_id: SessionId,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl RawNotification {
    pub fn new(kind: NotificationKind, session_id: SessionId, payload: serde_json::Value) -> Self {
        Self {
            kind,
            session_id,
            payload,
            received_at: Utc::now(),
        }
    }
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Live subscription to one session's notifications.
///
/// Delivery is a single queue. Once `unsubscribe` returns nothing further is
/// handed out, including anything already buffered. Dropping unsubscribes.
pub struct Subscription {
    id: Uuid,
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<RawNotification>,
    on_close: Option<CloseHook>,
    closed: bool,
}

impl Subscription {
    pub fn new(
        session_id: SessionId,
        rx: mpsc::UnboundedReceiver<RawNotification>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), session_id, rx, on_close)
    }

    pub fn with_id(
        id: Uuid,
        session_id: SessionId,
        rx: mpsc::UnboundedReceiver<RawNotification>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            session_id,
            rx,
            on_close: Some(Box::new(on_close)),
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits for the next notification. `None` once unsubscribed or when the
    /// transport has gone away.
    pub async fn recv(&mut self) -> Option<RawNotification> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RawNotification> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        while self.rx.try_recv().is_ok() {}

        if let Some(hook) = self.on_close.take() {
            hook();
        }

        tracing::debug!(
            "Subscription {} for session {} closed",
            self.id,
            self.session_id
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("closed", &self.closed)
            .finish()
    }
}
