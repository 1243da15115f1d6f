use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splitsteal_core::{
    AccountId, Amount, Choice, NotificationKind, RawNotification, Session, Settlement,
};
use std::collections::VecDeque;

/// Terminal payload as emitted by the contract. Accepts either a JSON object
/// or the positional argument list in field order.
#[derive(Debug, Deserialize)]
struct FinishedPayload {
    participant_a: AccountId,
    participant_b: AccountId,
    choice_a: u8,
    choice_b: u8,
    payout_a: Amount,
    payout_b: Amount,
}

/// Reads a settlement out of a terminal notification.
pub fn decode_settlement(notification: &RawNotification) -> Result<Settlement> {
    if !notification.kind.is_terminal() {
        return Err(SessionError::malformed(format!(
            "{} carries no settlement",
            notification.kind
        )));
    }

    let payload: FinishedPayload = serde_json::from_value(notification.payload.clone())
        .map_err(|e| SessionError::malformed(format!("{}: {}", notification.kind, e)))?;

    let choice_a = Choice::try_from(payload.choice_a)
        .map_err(|e| SessionError::malformed(format!("choice_a: {}", e)))?;
    let choice_b = Choice::try_from(payload.choice_b)
        .map_err(|e| SessionError::malformed(format!("choice_b: {}", e)))?;

    if payload.participant_a.is_empty() || payload.participant_b.is_empty() {
        return Err(SessionError::malformed("settlement names an empty seat"));
    }

    Ok(Settlement {
        participant_a: payload.participant_a,
        participant_b: payload.participant_b,
        choice_a,
        choice_b,
        payout_a: payload.payout_a,
        payout_b: payload.payout_b,
    })
}

/// Decodes a terminal notification and checks that it settles the seats of
/// `session` in order. A payload naming other accounts, or the two seats
/// swapped, is treated as malformed.
pub fn decode_settlement_for(
    notification: &RawNotification,
    session: &Session,
) -> Result<Settlement> {
    let settlement = decode_settlement(notification)?;
    if settlement.participant_a != session.participant_a
        || settlement.participant_b != session.participant_b
    {
        return Err(SessionError::malformed(format!(
            "settlement seats {} / {} do not match session {}",
            settlement.participant_a, settlement.participant_b, session.id
        )));
    }
    Ok(settlement)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for NotificationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.kind, self.timestamp.format("%H:%M:%S"))
    }
}

/// Most recent notifications, oldest first. Holds at most `capacity` entries.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<NotificationRecord>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: NotificationRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<NotificationRecord> {
        self.entries.iter().cloned().collect()
    }
}
