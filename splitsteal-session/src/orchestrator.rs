use crate::error::{Result, SessionError};
use crate::notification::{decode_settlement_for, EventLog, NotificationRecord};
use crate::outcome::{resolve, Outcome};
use crate::participant::{LocalParticipant, ParticipantState};
use crate::phase::{derive, Phase, Seat};
use serde::Serialize;
use splitsteal_core::{
    Choice, ClientConfig, CommitmentScheme, EventStream, LedgerError, Operation, RawNotification,
    Receipt, RemoteGameSnapshot, Role, Secret, SecretPersistence, SecretVault, Session,
    SessionId, Settlement, Sha256Commitment, Signer, Stage, Subscription,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Everything one session view needs, handed over at construction.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub signer: Arc<dyn Signer>,
    pub snapshots: Arc<dyn RemoteGameSnapshot>,
    pub events: Arc<dyn EventStream>,
    pub scheme: Arc<dyn CommitmentScheme>,
    pub config: ClientConfig,
    pub vault: Option<Arc<SecretVault>>,
    /// Unlocks the vault opened for [`SecretPersistence::Encrypted`].
    pub passphrase: Option<String>,
}

impl SessionContext {
    pub fn new(
        session_id: SessionId,
        signer: Arc<dyn Signer>,
        snapshots: Arc<dyn RemoteGameSnapshot>,
        events: Arc<dyn EventStream>,
    ) -> Self {
        Self {
            session_id,
            signer,
            snapshots,
            events,
            scheme: Arc::new(Sha256Commitment),
            config: ClientConfig::default(),
            vault: None,
            passphrase: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn CommitmentScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Uses an already opened vault instead of the one the config names.
    pub fn with_vault(mut self, vault: Arc<SecretVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Opens the vault selected by `secret_persistence` unless one was given.
    async fn open_vault(&mut self) -> Result<()> {
        if self.vault.is_some() {
            return Ok(());
        }
        let SecretPersistence::Encrypted { db_path } = &self.config.secret_persistence else {
            return Ok(());
        };
        let passphrase = self.passphrase.clone().ok_or_else(|| {
            LedgerError::config("Encrypted secret persistence requires a passphrase")
        })?;

        let vault = SecretVault::open(db_path, passphrase).await?;
        tracing::info!("Sealing pending secrets in {}", db_path.display());
        self.vault = Some(Arc::new(vault));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorState {
    Connecting,
    Active,
    TornDown,
}

/// User-facing status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Ready,
    Submitting { action: String },
    Submitted { action: String, tx_id: String },
    Rejected { action: String },
    ActionFailed { action: String, reason: String },
    ReadFailed { reason: String },
    SecretLost,
    Fatal { reason: String },
}

/// What the UI renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub state: OrchestratorState,
    pub role: Role,
    pub phase: Phase,
    pub session: Option<Session>,
    pub seat: Option<Seat>,
    pub selected: Option<Choice>,
    pub outcome: Option<Outcome>,
    pub recent_notifications: Vec<NotificationRecord>,
    pub busy: bool,
    pub status: SessionStatus,
}

/// Drives one session for one account.
///
/// Snapshots are the only source of truth for phase. Notifications just
/// trigger a re-read, except the terminal one whose payload may settle the
/// outcome directly.
pub struct SessionOrchestrator {
    ctx: SessionContext,
    state: OrchestratorState,
    subscription: Option<Subscription>,
    session: Option<Session>,
    role: Role,
    phase: Phase,
    outcome: Option<Outcome>,
    participant: LocalParticipant,
    log: EventLog,
    busy: bool,
    status: SessionStatus,
    view_tx: watch::Sender<SessionView>,
}

impl SessionOrchestrator {
    /// Subscribes to the session's notifications, then performs the first read.
    pub async fn connect(mut ctx: SessionContext) -> Result<Self> {
        ctx.config.validate()?;
        ctx.open_vault().await?;

        let session_id = ctx.session_id;
        let participant = LocalParticipant::new(session_id, ctx.signer.account_id());
        let log = EventLog::new(ctx.config.event_log_capacity);
        let initial = SessionView {
            session_id,
            state: OrchestratorState::Connecting,
            role: Role::Spectator,
            phase: Phase::Waiting,
            session: None,
            seat: None,
            selected: None,
            outcome: None,
            recent_notifications: Vec::new(),
            busy: false,
            status: SessionStatus::Ready,
        };
        let (view_tx, _) = watch::channel(initial);

        let mut orchestrator = Self {
            ctx,
            state: OrchestratorState::Connecting,
            subscription: None,
            session: None,
            role: Role::Spectator,
            phase: Phase::Waiting,
            outcome: None,
            participant,
            log,
            busy: false,
            status: SessionStatus::Ready,
            view_tx,
        };

        let subscription = orchestrator.ctx.events.subscribe(session_id).await?;
        orchestrator.subscription = Some(subscription);
        orchestrator.state = OrchestratorState::Active;
        tracing::info!(
            "Session {} view connected for {}",
            session_id,
            orchestrator.participant.account()
        );

        if let Err(e) = orchestrator.refresh().await {
            orchestrator.teardown();
            return Err(e);
        }
        orchestrator.recover_secret().await;
        orchestrator.settle_from_query().await;
        orchestrator.publish();

        Ok(orchestrator)
    }

    pub fn session_id(&self) -> SessionId {
        self.ctx.session_id
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn recent_notifications(&self) -> &EventLog {
        &self.log
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.ctx.session_id,
            state: self.state,
            role: self.role,
            phase: self.phase,
            session: self.session.clone(),
            seat: self.seat(),
            selected: self.participant.selected(),
            outcome: self.outcome.clone(),
            recent_notifications: self.log.to_vec(),
            busy: self.busy,
            status: self.status.clone(),
        }
    }

    /// Receiver that sees every published view, including `busy` transitions.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    fn seat(&self) -> Option<Seat> {
        self.session
            .as_ref()
            .and_then(|session| Seat::of(session, self.role))
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            OrchestratorState::Active => Ok(()),
            OrchestratorState::TornDown => Err(SessionError::TornDown),
            OrchestratorState::Connecting => {
                Err(SessionError::invalid_state("session view is still connecting"))
            }
        }
    }

    /// Handles the next notification, waiting for one if necessary.
    /// Returns `false` once the stream has ended or the view is torn down.
    pub async fn process_next(&mut self) -> Result<bool> {
        let next = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => return Ok(false),
        };

        match next {
            Some(notification) => {
                self.handle_notification(notification).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handles whatever notifications are already queued, without waiting.
    pub async fn process_pending(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let next = match self.subscription.as_mut() {
                Some(subscription) => subscription.try_recv(),
                None => None,
            };
            let Some(notification) = next else {
                return Ok(handled);
            };
            self.handle_notification(notification).await?;
            handled += 1;
        }
    }

    /// Processes notifications until `done` holds for the current view or the
    /// stream ends.
    pub async fn run_until(&mut self, done: impl Fn(&SessionView) -> bool) -> Result<()> {
        while !done(&self.view()) {
            if !self.process_next().await? {
                break;
            }
        }
        Ok(())
    }

    pub async fn handle_notification(&mut self, notification: RawNotification) -> Result<()> {
        self.ensure_active()?;
        self.clear_abandoned_submit();

        if notification.session_id != self.ctx.session_id {
            tracing::debug!(
                "Ignoring {} for session {}",
                notification.kind,
                notification.session_id
            );
            return Ok(());
        }

        self.log.push(NotificationRecord {
            kind: notification.kind,
            timestamp: notification.received_at,
        });
        tracing::debug!(
            "Session {} received {}",
            self.ctx.session_id,
            notification.kind
        );

        let refreshed = self.refresh().await;
        if let Err(e) = refreshed {
            self.publish();
            return Err(e);
        }

        if notification.kind.is_terminal() {
            let decoded = match &self.session {
                Some(session) => decode_settlement_for(&notification, session),
                None => Err(SessionError::malformed(
                    "no snapshot to check the settlement against",
                )),
            };
            match decoded {
                Ok(settlement) => self.accept_settlement(&settlement, "notification"),
                Err(e) => {
                    tracing::warn!(
                        "Session {}: {}, falling back to snapshot",
                        self.ctx.session_id,
                        e
                    );
                }
            }
        }

        self.settle_from_query().await;
        self.publish();
        Ok(())
    }

    /// Re-reads the snapshot. Transient failures keep the last good state;
    /// only a missing session is an error.
    async fn refresh(&mut self) -> Result<()> {
        match self.fetch_with_retry().await {
            Ok(session) => {
                self.apply_snapshot(session);
                Ok(())
            }
            Err(LedgerError::NotFound(id)) => {
                tracing::error!("Session {} does not exist", id);
                self.status = SessionStatus::Fatal {
                    reason: format!("session {} not found", id),
                };
                Err(SessionError::NotFound(id))
            }
            Err(e) => {
                tracing::warn!(
                    "Snapshot read for session {} failed, keeping phase {:?}: {}",
                    self.ctx.session_id,
                    self.phase,
                    e
                );
                self.status = SessionStatus::ReadFailed {
                    reason: e.to_string(),
                };
                Ok(())
            }
        }
    }

    async fn fetch_with_retry(&self) -> splitsteal_core::Result<Session> {
        let session_id = self.ctx.session_id;
        let mut attempt = 0;
        loop {
            match self.ctx.snapshots.fetch(session_id).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < self.ctx.config.fetch_retries => {
                    attempt += 1;
                    tracing::debug!(
                        "Retrying snapshot read for session {} ({}/{}): {}",
                        session_id,
                        attempt,
                        self.ctx.config.fetch_retries,
                        e
                    );
                    tokio::time::sleep(self.ctx.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply_snapshot(&mut self, session: Session) {
        if let Some(current) = &self.session {
            if is_regression(current, &session) {
                tracing::debug!(
                    "Discarding stale snapshot of session {} ({:?} after {:?})",
                    session.id,
                    session.stage,
                    current.stage
                );
                return;
            }
        }

        self.role = session.role_of(self.participant.account());
        if let Some(seat) = Seat::of(&session, self.role) {
            if seat.has_revealed {
                self.participant.observe_remote_reveal();
            } else if seat.has_committed {
                self.participant.observe_remote_commit();
            }
        }

        let phase = derive(&session, self.role);
        if phase != self.phase {
            tracing::info!(
                "Session {} phase {:?} -> {:?}",
                session.id,
                self.phase,
                phase
            );
        }
        self.phase = phase;
        self.session = Some(session);

        if matches!(
            self.status,
            SessionStatus::ReadFailed { .. } | SessionStatus::Fatal { .. }
        ) {
            self.status = SessionStatus::Ready;
        }
    }

    /// Asks the payout-capable query when the session is over but no
    /// settlement has been seen yet.
    async fn settle_from_query(&mut self) {
        let finished = self
            .session
            .as_ref()
            .map_or(false, |session| session.stage == Stage::Finished);
        if !finished || self.outcome.is_some() {
            return;
        }

        match self.ctx.snapshots.fetch_settlement(self.ctx.session_id).await {
            Ok(Some(settlement)) => self.accept_settlement(&settlement, "settlement query"),
            Ok(None) => tracing::debug!(
                "Session {} finished, settlement not available yet",
                self.ctx.session_id
            ),
            Err(e) => tracing::warn!(
                "Settlement query for session {} failed: {}",
                self.ctx.session_id,
                e
            ),
        }
    }

    fn accept_settlement(&mut self, settlement: &Settlement, source: &str) {
        let outcome = resolve(settlement);
        match &self.outcome {
            Some(existing) if *existing == outcome => {}
            Some(existing) => tracing::warn!(
                "Session {}: {} disagrees with settled outcome {:?}, keeping it",
                self.ctx.session_id,
                source,
                existing.classification
            ),
            None => {
                tracing::info!(
                    "Session {} settled from {}: {:?}",
                    self.ctx.session_id,
                    source,
                    outcome.classification
                );
                self.outcome = Some(outcome);
            }
        }
    }

    /// Pulls a sealed secret back from the vault after a restart.
    async fn recover_secret(&mut self) -> bool {
        if self.participant.has_secret() {
            return true;
        }
        let Some(vault) = self.ctx.vault.clone() else {
            return false;
        };
        let Some(seat) = self.seat() else {
            return false;
        };
        if !seat.has_committed || seat.has_revealed {
            return false;
        }

        match vault
            .load(self.ctx.session_id, self.participant.account())
            .await
        {
            Ok(Some((choice, secret))) => {
                let commitment = self.ctx.scheme.commit(choice, &secret);
                self.participant.restore(choice, secret, commitment);
                tracing::info!("Recovered reveal secret for session {}", self.ctx.session_id);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(
                    "Could not unseal secret for session {}: {}",
                    self.ctx.session_id,
                    e
                );
                false
            }
        }
    }

    pub fn select_choice(&mut self, choice: Choice) -> Result<()> {
        self.ensure_active()?;
        self.clear_abandoned_submit();
        self.participant.select_choice(choice)?;
        self.publish();
        Ok(())
    }

    /// Commits the selected choice. The secret is retained for the reveal.
    ///
    /// When an earlier attempt failed without a verdict from the ledger, the
    /// same commitment is sent again rather than a fresh one.
    pub async fn commit(&mut self) -> Result<Receipt> {
        self.ensure_active()?;
        self.clear_abandoned_submit();
        if !self.role.is_participant() {
            return Err(SessionError::NotAParticipant(self.ctx.session_id));
        }
        if self.seat().map_or(false, |seat| seat.has_committed) {
            return Err(SessionError::AlreadyCommitted);
        }
        if self.phase != Phase::Commit {
            return Err(SessionError::invalid_state(format!(
                "cannot commit during {:?}",
                self.phase
            )));
        }

        let local = match self.participant.pending_commitment() {
            Some(local) => {
                tracing::info!(
                    "Resending pending commitment for session {}",
                    self.ctx.session_id
                );
                local
            }
            None => {
                let local = self.participant.prepare_commitment(self.ctx.scheme.as_ref())?;
                if let Err(e) = self.seal(local.choice, &local.secret).await {
                    self.participant.abandon_commit();
                    self.status = SessionStatus::ActionFailed {
                        action: "commit".to_string(),
                        reason: e.to_string(),
                    };
                    self.publish();
                    return Err(e.into());
                }
                local
            }
        };

        let operation = Operation::Commit {
            session_id: self.ctx.session_id,
            commitment: local.commitment,
        };
        match self.submit(operation).await {
            Ok(receipt) => {
                self.participant.confirm_commit();
                self.publish();
                Ok(receipt)
            }
            Err(e) => {
                self.after_failed_commit(&e).await;
                self.publish();
                Err(e)
            }
        }
    }

    /// Decides whether the secret behind a failed commit is still needed.
    ///
    /// Only a definite refusal drops it. A lost receipt may hide a commit
    /// that landed, and dropping its secret would make the reveal impossible.
    async fn after_failed_commit(&mut self, error: &SessionError) {
        if !matches!(error, SessionError::Ledger(LedgerError::UserRejected)) {
            if let Err(e) = self.refresh().await {
                tracing::warn!(
                    "Could not re-read session {} after failed commit: {}",
                    self.ctx.session_id,
                    e
                );
            }
        }

        match self.participant.state() {
            ParticipantState::Committed => {
                tracing::info!(
                    "Commit for session {} landed despite {}",
                    self.ctx.session_id,
                    error
                );
                return;
            }
            ParticipantState::Committing if is_ambiguous(error) => {
                tracing::warn!(
                    "Commit for session {} has no verdict, keeping its secret for a retry",
                    self.ctx.session_id
                );
                return;
            }
            _ => {}
        }

        self.participant.abandon_commit();
        self.discard_sealed().await;
    }

    async fn seal(&self, choice: Choice, secret: &Secret) -> splitsteal_core::Result<()> {
        match &self.ctx.vault {
            Some(vault) => {
                vault
                    .save(self.ctx.session_id, self.participant.account(), choice, secret)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn discard_sealed(&self) {
        if let Some(vault) = &self.ctx.vault {
            if let Err(e) = vault
                .remove(self.ctx.session_id, self.participant.account())
                .await
            {
                tracing::warn!("Could not discard sealed secret: {}", e);
            }
        }
    }

    /// Reveals with the secret held since commit.
    pub async fn reveal(&mut self) -> Result<Receipt> {
        self.ensure_active()?;
        self.clear_abandoned_submit();
        if !self.role.is_participant() {
            return Err(SessionError::NotAParticipant(self.ctx.session_id));
        }
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state("session not loaded"))?;
        let seat = self
            .seat()
            .ok_or(SessionError::NotAParticipant(self.ctx.session_id))?;
        if seat.has_revealed || self.participant.state() == ParticipantState::Revealed {
            return Err(SessionError::AlreadyRevealed);
        }
        if !session.both_committed() || session.stage == Stage::Finished {
            return Err(SessionError::invalid_state(format!(
                "cannot reveal during {:?}",
                self.phase
            )));
        }

        if !self.participant.has_secret() {
            self.recover_secret().await;
        }
        let (choice, secret) = match self.participant.reveal_payload() {
            Ok(payload) => payload,
            Err(e) => {
                if matches!(e, SessionError::SecretLost(_)) {
                    tracing::error!(
                        "Reveal secret for session {} is gone, cannot reveal",
                        self.ctx.session_id
                    );
                    self.status = SessionStatus::SecretLost;
                    self.publish();
                }
                return Err(e);
            }
        };

        let operation = Operation::Reveal {
            session_id: self.ctx.session_id,
            choice,
            secret,
        };
        let receipt = self.submit(operation).await?;
        self.participant.confirm_reveal();
        self.discard_sealed().await;
        self.publish();
        Ok(receipt)
    }

    /// Runs the write on its own task: tearing the view down does not cancel
    /// it, the result is simply never observed.
    async fn submit(&mut self, operation: Operation) -> Result<Receipt> {
        let action = operation.name().to_string();
        self.busy = true;
        self.status = SessionStatus::Submitting {
            action: action.clone(),
        };
        self.publish();

        let signer = self.ctx.signer.clone();
        let handle = tokio::spawn(async move { signer.submit(operation).await });
        let result = match handle.await {
            Ok(result) => result.map_err(SessionError::from),
            Err(e) => Err(SessionError::Task(e.to_string())),
        };

        self.busy = false;
        self.status = match &result {
            Ok(receipt) => {
                tracing::info!(
                    "Session {} {} confirmed: {}",
                    self.ctx.session_id,
                    action,
                    receipt.tx_id
                );
                SessionStatus::Submitted {
                    action,
                    tx_id: receipt.tx_id.clone(),
                }
            }
            Err(SessionError::Ledger(LedgerError::UserRejected)) => {
                tracing::info!("Session {} {} rejected by user", self.ctx.session_id, action);
                SessionStatus::Rejected { action }
            }
            Err(e) => {
                tracing::warn!("Session {} {} failed: {}", self.ctx.session_id, action, e);
                SessionStatus::ActionFailed {
                    action,
                    reason: e.to_string(),
                }
            }
        };
        self.publish();
        result
    }

    /// A submit future dropped before completion never reaches the code that
    /// clears `busy`. The exclusive borrow it held is gone by the time any
    /// other method runs, so nothing is in flight from this view anymore.
    fn clear_abandoned_submit(&mut self) {
        if !self.busy {
            return;
        }
        self.busy = false;
        if let SessionStatus::Submitting { action } = &self.status {
            tracing::warn!(
                "Session {} {} was abandoned before completion",
                self.ctx.session_id,
                action
            );
            self.status = SessionStatus::ActionFailed {
                action: action.clone(),
                reason: "abandoned before completion".to_string(),
            };
        }
        self.publish();
    }

    /// Stops notification delivery, then marks the view dead.
    pub fn teardown(&mut self) {
        if self.state == OrchestratorState::TornDown {
            return;
        }
        self.busy = false;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.state = OrchestratorState::TornDown;
        self.publish();
        tracing::info!("Session {} view torn down", self.ctx.session_id);
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Failures after which the write may still have landed.
fn is_ambiguous(error: &SessionError) -> bool {
    matches!(
        error,
        SessionError::Task(_) | SessionError::Ledger(LedgerError::TransientSubmit(_))
    )
}

/// A snapshot that un-sets anything an earlier one had set is older than it.
fn is_regression(current: &Session, next: &Session) -> bool {
    next.stage < current.stage
        || (current.has_participant_b() && !next.has_participant_b())
        || (current.committed_a && !next.committed_a)
        || (current.committed_b && !next.committed_b)
        || (current.revealed_a && !next.revealed_a)
        || (current.revealed_b && !next.revealed_b)
}
