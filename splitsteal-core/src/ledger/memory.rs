//! In-process stand-in for the split-or-steal contract.
//!
//! Enforces the same rules the contract does and pushes notifications to
//! subscribers, with switches for the transport faults the session client
//! has to survive.

use crate::commitment::{Commitment, CommitmentScheme, Sha256Commitment};
use crate::error::{LedgerError, Result};
use crate::ledger::{
    EventStream, NotificationKind, Operation, RawNotification, Receipt, RemoteGameSnapshot,
    Signer, Subscription,
};
use crate::types::{AccountId, Amount, Choice, Session, SessionId, Settlement, Stage};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fault switches. All off by default.
#[derive(Debug, Clone, Default)]
pub struct LedgerFaults {
    /// Number of upcoming `fetch` calls that fail with a transient error.
    pub failing_reads: u32,
    /// Deliver every notification twice.
    pub duplicate_delivery: bool,
    /// Strip the payouts from the terminal notification.
    pub malformed_finished: bool,
    /// Drop notifications instead of delivering them.
    pub suppress_notifications: bool,
    /// Reject the next submission as if the user declined to sign.
    pub reject_next_submit: bool,
    /// Fail the next submission with a transient error before it lands.
    pub drop_next_submit: bool,
    /// Apply the next submission but fail with a transient error, as when
    /// the connection drops before the receipt arrives.
    pub lose_next_receipt: bool,
    /// Answer `fetch_settlement` with `None` like a backend without the query.
    pub no_settlement_query: bool,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    commitment_a: Option<Commitment>,
    commitment_b: Option<Commitment>,
    choice_a: Option<Choice>,
    choice_b: Option<Choice>,
    settlement: Option<Settlement>,
}

struct LedgerState {
    next_session: u64,
    next_tx: u64,
    sessions: HashMap<SessionId, SessionEntry>,
    subscribers: HashMap<Uuid, (SessionId, mpsc::UnboundedSender<RawNotification>)>,
    faults: LedgerFaults,
    fetch_count: u64,
}

#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    scheme: Arc<dyn CommitmentScheme>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_scheme(Arc::new(Sha256Commitment))
    }

    pub fn with_scheme(scheme: Arc<dyn CommitmentScheme>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                next_session: 1,
                next_tx: 1,
                sessions: HashMap::new(),
                subscribers: HashMap::new(),
                faults: LedgerFaults::default(),
                fetch_count: 0,
            })),
            scheme,
        }
    }

    pub fn scheme(&self) -> Arc<dyn CommitmentScheme> {
        self.scheme.clone()
    }

    /// Signing handle acting as `account`.
    pub fn signer(&self, account: AccountId) -> LedgerSigner {
        LedgerSigner {
            ledger: self.clone(),
            account,
        }
    }

    pub fn set_faults(&self, faults: LedgerFaults) {
        self.state.lock().faults = faults;
    }

    pub fn update_faults(&self, f: impl FnOnce(&mut LedgerFaults)) {
        f(&mut self.state.lock().faults);
    }

    pub fn fetch_count(&self) -> u64 {
        self.state.lock().fetch_count
    }

    pub fn subscriber_count(&self, session_id: SessionId) -> usize {
        self.state
            .lock()
            .subscribers
            .values()
            .filter(|(id, _)| *id == session_id)
            .count()
    }

    /// Pushes an arbitrary notification to a session's subscribers.
    pub fn inject(&self, notification: RawNotification) {
        let mut state = self.state.lock();
        deliver(&mut state, notification);
    }

    fn apply(&self, account: &AccountId, operation: Operation) -> Result<Receipt> {
        let lose_receipt = {
            let mut state = self.state.lock();
            if std::mem::take(&mut state.faults.reject_next_submit) {
                return Err(LedgerError::UserRejected);
            }
            if std::mem::take(&mut state.faults.drop_next_submit) {
                return Err(LedgerError::transient_submit("simulated send failure"));
            }
            std::mem::take(&mut state.faults.lose_next_receipt)
        };

        let receipt = self.execute(account, operation)?;
        if lose_receipt {
            tracing::debug!("Dropping receipt for {}", receipt.tx_id);
            return Err(LedgerError::transient_submit("receipt lost in transit"));
        }
        Ok(receipt)
    }

    fn execute(&self, account: &AccountId, operation: Operation) -> Result<Receipt> {
        let mut state = self.state.lock();

        let tx_id = format!("0x{:064x}", state.next_tx);
        state.next_tx += 1;

        let mut created = None;
        match operation {
            Operation::CreateSession { bet } => {
                if bet == Amount::ZERO {
                    return Err(LedgerError::reverted("bet must be positive"));
                }
                pot_of(bet)?;
                let id = SessionId(state.next_session);
                state.next_session += 1;

                state.sessions.insert(
                    id,
                    SessionEntry {
                        session: Session {
                            id,
                            bet_amount: bet,
                            participant_a: account.clone(),
                            participant_b: AccountId::empty(),
                            stage: Stage::Open,
                            committed_a: false,
                            committed_b: false,
                            revealed_a: false,
                            revealed_b: false,
                        },
                        commitment_a: None,
                        commitment_b: None,
                        choice_a: None,
                        choice_b: None,
                        settlement: None,
                    },
                );
                created = Some(id);

                deliver(
                    &mut state,
                    RawNotification::new(
                        NotificationKind::Created,
                        id,
                        json!({ "creator": account, "bet_amount": bet }),
                    ),
                );
            }
            Operation::JoinSession { session_id, stake } => {
                let entry = entry_mut(&mut state, session_id)?;
                if entry.session.has_participant_b() {
                    return Err(LedgerError::reverted("session is full"));
                }
                if entry.session.participant_a == *account {
                    return Err(LedgerError::reverted("cannot join own session"));
                }
                if stake != entry.session.bet_amount {
                    return Err(LedgerError::reverted("stake must equal the bet"));
                }
                entry.session.participant_b = account.clone();

                deliver(
                    &mut state,
                    RawNotification::new(
                        NotificationKind::Joined,
                        session_id,
                        json!({ "player": account }),
                    ),
                );
            }
            Operation::Commit {
                session_id,
                commitment,
            } => {
                let entry = entry_mut(&mut state, session_id)?;
                if !entry.session.has_participant_b() {
                    return Err(LedgerError::reverted("waiting for second player"));
                }
                if entry.session.stage != Stage::Open {
                    return Err(LedgerError::reverted("commit phase is over"));
                }

                let (committed, slot) = if *account == entry.session.participant_a {
                    (&mut entry.session.committed_a, &mut entry.commitment_a)
                } else if *account == entry.session.participant_b {
                    (&mut entry.session.committed_b, &mut entry.commitment_b)
                } else {
                    return Err(LedgerError::reverted("not a player"));
                };
                if *committed {
                    return Err(LedgerError::reverted("already committed"));
                }
                *committed = true;
                *slot = Some(commitment);

                if entry.session.both_committed() {
                    entry.session.stage = Stage::Committed;
                }

                deliver(
                    &mut state,
                    RawNotification::new(
                        NotificationKind::Committed,
                        session_id,
                        json!({ "player": account }),
                    ),
                );
            }
            Operation::Reveal {
                session_id,
                choice,
                secret,
            } => {
                let scheme = self.scheme.clone();
                let entry = entry_mut(&mut state, session_id)?;
                if entry.session.stage != Stage::Committed {
                    return Err(LedgerError::reverted("not in reveal phase"));
                }

                let (revealed, commitment, stored) = if *account == entry.session.participant_a {
                    (
                        &mut entry.session.revealed_a,
                        entry.commitment_a,
                        &mut entry.choice_a,
                    )
                } else if *account == entry.session.participant_b {
                    (
                        &mut entry.session.revealed_b,
                        entry.commitment_b,
                        &mut entry.choice_b,
                    )
                } else {
                    return Err(LedgerError::reverted("not a player"));
                };
                if *revealed {
                    return Err(LedgerError::reverted("already revealed"));
                }
                let commitment =
                    commitment.ok_or_else(|| LedgerError::reverted("nothing committed"))?;
                if !scheme.verify(choice, &secret, &commitment) {
                    return Err(LedgerError::reverted("reveal does not match commitment"));
                }
                let pot = pot_of(entry.session.bet_amount)?;
                *revealed = true;
                *stored = Some(choice);

                let finished = settle(entry, pot);

                deliver(
                    &mut state,
                    RawNotification::new(
                        NotificationKind::Revealed,
                        session_id,
                        json!({ "player": account, "choice": choice.code() }),
                    ),
                );

                if let Some(settlement) = finished {
                    let mut payload = json!({
                        "participant_a": settlement.participant_a,
                        "participant_b": settlement.participant_b,
                        "choice_a": settlement.choice_a.code(),
                        "choice_b": settlement.choice_b.code(),
                        "payout_a": settlement.payout_a,
                        "payout_b": settlement.payout_b,
                    });
                    if state.faults.malformed_finished {
                        if let Some(fields) = payload.as_object_mut() {
                            fields.remove("payout_a");
                            fields.remove("payout_b");
                        }
                    }
                    deliver(
                        &mut state,
                        RawNotification::new(NotificationKind::Finished, session_id, payload),
                    );
                }
            }
        }

        Ok(Receipt {
            tx_id,
            session_id: created,
            confirmed_at: Utc::now(),
        })
    }
}

fn entry_mut(state: &mut LedgerState, session_id: SessionId) -> Result<&mut SessionEntry> {
    state
        .sessions
        .get_mut(&session_id)
        .ok_or(LedgerError::NotFound(session_id))
}

/// Both stakes together. A bet whose pot does not fit is refused.
fn pot_of(bet: Amount) -> Result<Amount> {
    bet.checked_mul(2)
        .ok_or_else(|| LedgerError::reverted("bet too large for the pot"))
}

/// Closes the session once both choices are in.
fn settle(entry: &mut SessionEntry, pot: Amount) -> Option<Settlement> {
    let (choice_a, choice_b) = (entry.choice_a?, entry.choice_b?);
    let bet = entry.session.bet_amount;

    let (payout_a, payout_b) = match (choice_a, choice_b) {
        (Choice::Split, Choice::Split) => (bet, bet),
        (Choice::Steal, Choice::Steal) => (Amount::ZERO, Amount::ZERO),
        (Choice::Split, Choice::Steal) => (Amount::ZERO, pot),
        (Choice::Steal, Choice::Split) => (pot, Amount::ZERO),
    };

    let settlement = Settlement {
        participant_a: entry.session.participant_a.clone(),
        participant_b: entry.session.participant_b.clone(),
        choice_a,
        choice_b,
        payout_a,
        payout_b,
    };
    entry.session.stage = Stage::Finished;
    entry.settlement = Some(settlement.clone());

    tracing::info!(
        "Session {} finished: {} / {}",
        entry.session.id,
        choice_a,
        choice_b
    );
    Some(settlement)
}

fn deliver(state: &mut LedgerState, notification: RawNotification) {
    if state.faults.suppress_notifications {
        tracing::debug!("Suppressed {} notification", notification.kind);
        return;
    }

    let copies = if state.faults.duplicate_delivery { 2 } else { 1 };
    let session_id = notification.session_id;

    state.subscribers.retain(|_, (subscribed_to, tx)| {
        if *subscribed_to != session_id {
            return true;
        }
        (0..copies).all(|_| tx.send(notification.clone()).is_ok())
    });
}

#[async_trait]
impl RemoteGameSnapshot for MemoryLedger {
    async fn fetch(&self, session_id: SessionId) -> Result<Session> {
        let mut state = self.state.lock();
        state.fetch_count += 1;

        if state.faults.failing_reads > 0 {
            state.faults.failing_reads -= 1;
            return Err(LedgerError::transient_read("simulated RPC failure"));
        }

        state
            .sessions
            .get(&session_id)
            .map(|entry| entry.session.clone())
            .ok_or(LedgerError::NotFound(session_id))
    }

    async fn fetch_settlement(&self, session_id: SessionId) -> Result<Option<Settlement>> {
        let state = self.state.lock();
        if state.faults.no_settlement_query {
            return Ok(None);
        }

        state
            .sessions
            .get(&session_id)
            .map(|entry| entry.settlement.clone())
            .ok_or(LedgerError::NotFound(session_id))
    }
}

#[async_trait]
impl EventStream for MemoryLedger {
    async fn subscribe(&self, session_id: SessionId) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.state.lock().subscribers.insert(id, (session_id, tx));

        let state = Arc::downgrade(&self.state);
        Ok(Subscription::with_id(id, session_id, rx, move || {
            if let Some(state) = state.upgrade() {
                state.lock().subscribers.remove(&id);
            }
        }))
    }
}

/// Signs as a fixed account against a [`MemoryLedger`].
#[derive(Clone)]
pub struct LedgerSigner {
    ledger: MemoryLedger,
    account: AccountId,
}

#[async_trait]
impl Signer for LedgerSigner {
    fn account_id(&self) -> AccountId {
        self.account.clone()
    }

    async fn submit(&self, operation: Operation) -> Result<Receipt> {
        let name = operation.name();
        let receipt = self.ledger.apply(&self.account, operation)?;
        tracing::debug!("{} by {} confirmed in {}", name, self.account, receipt.tx_id);
        Ok(receipt)
    }
}
