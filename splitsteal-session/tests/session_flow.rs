use async_trait::async_trait;
use serde_json::json;
use splitsteal_core::{
    AccountId, Amount, Choice, ClientConfig, LedgerError, LedgerFaults, MemoryLedger,
    NotificationKind, Operation, RawNotification, Receipt, SecretVault, SessionId, Signer, Stage,
};
use splitsteal_session::{
    create_session, join_session, Classification, OrchestratorState, Outcome, Phase,
    SessionContext, SessionError, SessionOrchestrator, SessionStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ALICE: &str = "0xA11CE";
const BOB: &str = "0xB0B";
const BET: u128 = 1_000;

fn config() -> ClientConfig {
    ClientConfig {
        retry_delay: Duration::from_millis(1),
        ..ClientConfig::default()
    }
}

fn context(ledger: &MemoryLedger, account: &str, session_id: SessionId) -> SessionContext {
    SessionContext::new(
        session_id,
        Arc::new(ledger.signer(AccountId::new(account))),
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
    )
    .with_scheme(ledger.scheme())
    .with_config(config())
}

/// Context whose config seals pending secrets at `db_path`.
fn vaulted(
    ledger: &MemoryLedger,
    account: &str,
    session_id: SessionId,
    db_path: &Path,
    passphrase: &str,
) -> SessionContext {
    context(ledger, account, session_id)
        .with_config(config().with_encrypted_secrets(db_path))
        .with_passphrase(passphrase)
}

/// Signs through another signer after a fixed delay.
struct SlowSigner {
    inner: Arc<dyn Signer>,
    delay: Duration,
}

#[async_trait]
impl Signer for SlowSigner {
    fn account_id(&self) -> AccountId {
        self.inner.account_id()
    }

    async fn submit(&self, operation: Operation) -> splitsteal_core::Result<Receipt> {
        tokio::time::sleep(self.delay).await;
        self.inner.submit(operation).await
    }
}

fn finished(
    id: SessionId,
    a: &str,
    b: &str,
    choices: [u8; 2],
    payouts: [u128; 2],
) -> RawNotification {
    RawNotification::new(
        NotificationKind::Finished,
        id,
        json!({
            "participant_a": a,
            "participant_b": b,
            "choice_a": choices[0],
            "choice_b": choices[1],
            "payout_a": payouts[0].to_string(),
            "payout_b": payouts[1].to_string(),
        }),
    )
}

async fn open_session(ledger: &MemoryLedger) -> SessionId {
    let alice = ledger.signer(AccountId::new(ALICE));
    let bob = ledger.signer(AccountId::new(BOB));
    let id = create_session(&alice, Amount::from_base_units(BET))
        .await
        .unwrap();
    join_session(&bob, ledger, id).await.unwrap();
    id
}

async fn seat_both(
    ledger: &MemoryLedger,
    id: SessionId,
) -> (SessionOrchestrator, SessionOrchestrator) {
    let alice = SessionOrchestrator::connect(context(ledger, ALICE, id))
        .await
        .unwrap();
    let bob = SessionOrchestrator::connect(context(ledger, BOB, id))
        .await
        .unwrap();
    (alice, bob)
}

async fn commit(view: &mut SessionOrchestrator, choice: Choice) {
    view.select_choice(choice).unwrap();
    view.commit().await.unwrap();
}

async fn drain(views: &mut [&mut SessionOrchestrator]) {
    for view in views.iter_mut() {
        view.process_pending().await.unwrap();
    }
}

/// Plays a full session and returns alice's and bob's final outcomes.
async fn play(ledger: &MemoryLedger, a: Choice, b: Choice) -> (Option<Outcome>, Option<Outcome>) {
    let (_, alice, bob) = play_to_end(ledger, a, b).await;
    (alice.outcome().cloned(), bob.outcome().cloned())
}

async fn play_to_end(
    ledger: &MemoryLedger,
    a: Choice,
    b: Choice,
) -> (SessionId, SessionOrchestrator, SessionOrchestrator) {
    let id = open_session(ledger).await;
    let (mut alice, mut bob) = seat_both(ledger, id).await;

    commit(&mut alice, a).await;
    commit(&mut bob, b).await;
    drain(&mut [&mut alice, &mut bob]).await;

    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    drain(&mut [&mut alice, &mut bob]).await;

    assert_eq!(alice.phase(), Phase::Result);
    assert_eq!(bob.phase(), Phase::Result);
    (id, alice, bob)
}

#[tokio::test]
async fn test_happy_path_split_against_steal() {
    let ledger = MemoryLedger::new();
    let alice_signer = ledger.signer(AccountId::new(ALICE));
    let id = create_session(&alice_signer, Amount::from_base_units(BET))
        .await
        .unwrap();

    let mut alice = SessionOrchestrator::connect(context(&ledger, ALICE, id))
        .await
        .unwrap();
    assert_eq!(alice.state(), OrchestratorState::Active);
    assert_eq!(alice.phase(), Phase::Waiting);

    join_session(&ledger.signer(AccountId::new(BOB)), &ledger, id)
        .await
        .unwrap();
    alice.process_pending().await.unwrap();
    assert_eq!(alice.phase(), Phase::Commit);

    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();
    let mut phases = vec![alice.phase()];

    commit(&mut alice, Choice::Split).await;
    drain(&mut [&mut alice, &mut bob]).await;
    phases.push(alice.phase());

    commit(&mut bob, Choice::Steal).await;
    drain(&mut [&mut alice, &mut bob]).await;
    phases.push(alice.phase());

    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    drain(&mut [&mut alice, &mut bob]).await;
    phases.push(alice.phase());

    assert_eq!(
        phases,
        vec![Phase::Commit, Phase::Commit, Phase::Reveal, Phase::Result]
    );

    let outcome = alice.outcome().cloned().unwrap();
    assert_eq!(outcome.classification, Classification::BWins);
    assert_eq!(outcome.payout_a, Amount::ZERO);
    assert_eq!(outcome.payout_b, Amount::from_base_units(2 * BET));
    assert_eq!(outcome.winner(), Some(&AccountId::new(BOB)));
    assert_eq!(bob.outcome(), Some(&outcome));

    let view = bob.view();
    assert_eq!(view.session.unwrap().stage, Stage::Finished);
    assert!(!view.busy);
    assert_eq!(
        outcome.narrative(view.role),
        "You stole while they split!"
    );
}

#[tokio::test]
async fn test_duplicate_notifications_change_nothing() {
    let ledger = MemoryLedger::new();
    ledger.update_faults(|f| f.duplicate_delivery = true);
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;

    commit(&mut alice, Choice::Steal).await;
    commit(&mut bob, Choice::Steal).await;
    drain(&mut [&mut alice, &mut bob]).await;
    let before = alice.view();
    let reads = ledger.fetch_count();

    ledger.inject(RawNotification::new(
        NotificationKind::Committed,
        id,
        json!({ "player": BOB }),
    ));
    assert_eq!(alice.process_pending().await.unwrap(), 2);

    // Each copy triggers a read, and the reads change nothing.
    assert_eq!(ledger.fetch_count(), reads + 2);
    let after = alice.view();
    assert_eq!(after.phase, before.phase);
    assert_eq!(after.session, before.session);
    assert_eq!(after.status, before.status);
    assert!(after.outcome.is_none());

    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    drain(&mut [&mut alice, &mut bob]).await;
    let settled = alice.outcome().cloned().unwrap();
    assert_eq!(settled.classification, Classification::StealNone);
    assert_eq!(bob.outcome(), Some(&settled));

    // A later terminal notification never replaces the first settlement.
    ledger.inject(finished(id, ALICE, BOB, [1, 1], [BET, BET]));
    alice.process_pending().await.unwrap();
    assert_eq!(alice.outcome(), Some(&settled));
    assert_eq!(alice.phase(), Phase::Result);
}

#[tokio::test]
async fn test_malformed_terminal_payload_falls_back_to_settlement_query() {
    let ledger = MemoryLedger::new();
    ledger.set_faults(LedgerFaults {
        malformed_finished: true,
        ..LedgerFaults::default()
    });
    let (outcome, _) = play(&ledger, Choice::Steal, Choice::Split).await;

    let outcome = outcome.unwrap();
    assert_eq!(outcome.classification, Classification::AWins);
    assert_eq!(outcome.payout_a, Amount::from_base_units(2 * BET));
}

#[tokio::test]
async fn test_malformed_payload_without_settlement_query_stays_pending() {
    let ledger = MemoryLedger::new();
    ledger.set_faults(LedgerFaults {
        malformed_finished: true,
        no_settlement_query: true,
        ..LedgerFaults::default()
    });
    let (id, mut alice, bob) = play_to_end(&ledger, Choice::Split, Choice::Split).await;

    assert!(alice.outcome().is_none());
    assert!(bob.outcome().is_none());
    assert_eq!(alice.phase(), Phase::Result);

    ledger.inject(finished(id, ALICE, BOB, [1, 1], [BET, BET]));
    alice.process_pending().await.unwrap();

    let outcome = alice.outcome().unwrap();
    assert_eq!(outcome.classification, Classification::SplitTie);
    assert_eq!(outcome.payout_a, Amount::from_base_units(BET));
}

#[tokio::test]
async fn test_terminal_payload_with_swapped_seats_is_rejected() {
    let ledger = MemoryLedger::new();
    ledger.set_faults(LedgerFaults {
        malformed_finished: true,
        no_settlement_query: true,
        ..LedgerFaults::default()
    });
    let (id, mut alice, _bob) = play_to_end(&ledger, Choice::Split, Choice::Steal).await;

    ledger.inject(finished(id, BOB, ALICE, [2, 1], [2 * BET, 0]));
    ledger.inject(finished(id, ALICE, "0xCA401", [1, 2], [0, 2 * BET]));
    alice.process_pending().await.unwrap();
    assert!(alice.outcome().is_none());

    ledger.inject(finished(id, ALICE, BOB, [1, 2], [0, 2 * BET]));
    alice.process_pending().await.unwrap();

    let outcome = alice.outcome().unwrap();
    assert_eq!(outcome.classification, Classification::BWins);
    assert_eq!(outcome.winner(), Some(&AccountId::new(BOB)));
}

#[tokio::test]
async fn test_outcome_is_identical_from_payload_and_query() {
    let pushed = MemoryLedger::new();
    pushed.set_faults(LedgerFaults {
        no_settlement_query: true,
        ..LedgerFaults::default()
    });
    let (from_payload, _) = play(&pushed, Choice::Split, Choice::Split).await;

    let queried = MemoryLedger::new();
    queried.set_faults(LedgerFaults {
        malformed_finished: true,
        ..LedgerFaults::default()
    });
    let (from_query, _) = play(&queried, Choice::Split, Choice::Split).await;

    assert_eq!(from_payload, from_query);
    assert_eq!(
        from_payload.unwrap().classification,
        Classification::SplitTie
    );
}

#[tokio::test]
async fn test_transient_reads_are_retried() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;

    ledger.update_faults(|f| f.failing_reads = 2);
    commit(&mut alice, Choice::Split).await;
    alice.process_pending().await.unwrap();

    assert!(matches!(
        alice.status(),
        SessionStatus::Submitted { action, .. } if action == "commit"
    ));
    assert!(alice.session().unwrap().committed_a);

    commit(&mut bob, Choice::Split).await;
    bob.process_pending().await.unwrap();
    assert_eq!(bob.phase(), Phase::Reveal);
}

#[tokio::test]
async fn test_failed_reads_keep_last_phase() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;

    commit(&mut alice, Choice::Split).await;
    drain(&mut [&mut alice, &mut bob]).await;

    ledger.update_faults(|f| f.failing_reads = 100);
    commit(&mut bob, Choice::Steal).await;
    alice.process_pending().await.unwrap();

    assert_eq!(alice.phase(), Phase::Commit);
    assert!(matches!(alice.status(), SessionStatus::ReadFailed { .. }));

    ledger.update_faults(|f| f.failing_reads = 0);
    ledger.inject(RawNotification::new(
        NotificationKind::Committed,
        id,
        json!({ "participant": BOB }),
    ));
    alice.process_pending().await.unwrap();

    assert_eq!(alice.phase(), Phase::Reveal);
    assert_eq!(alice.status(), &SessionStatus::Ready);
}

#[tokio::test]
async fn test_rejected_commit_can_be_retried() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, _bob) = seat_both(&ledger, id).await;

    ledger.update_faults(|f| f.reject_next_submit = true);
    alice.select_choice(Choice::Split).unwrap();
    let err = alice.commit().await.unwrap_err();

    assert!(matches!(err, SessionError::Ledger(LedgerError::UserRejected)));
    assert_eq!(
        alice.status(),
        &SessionStatus::Rejected {
            action: "commit".to_string()
        }
    );
    assert!(!alice.is_busy());
    assert_eq!(alice.phase(), Phase::Commit);

    alice.select_choice(Choice::Steal).unwrap();
    alice.commit().await.unwrap();
    alice.process_pending().await.unwrap();
    assert!(alice.session().unwrap().committed_a);
    assert_eq!(alice.view().selected, Some(Choice::Steal));
}

#[tokio::test]
async fn test_commit_twice_is_refused() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, _bob) = seat_both(&ledger, id).await;

    commit(&mut alice, Choice::Split).await;
    alice.process_pending().await.unwrap();

    assert!(matches!(
        alice.commit().await,
        Err(SessionError::AlreadyCommitted)
    ));
    assert!(matches!(
        alice.select_choice(Choice::Steal),
        Err(SessionError::AlreadyCommitted)
    ));
}

#[tokio::test]
async fn test_reveal_before_opponent_commits_is_refused() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, _bob) = seat_both(&ledger, id).await;

    commit(&mut alice, Choice::Split).await;
    alice.process_pending().await.unwrap();

    assert!(matches!(
        alice.reveal().await,
        Err(SessionError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_restart_without_vault_loses_secret() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;

    commit(&mut alice, Choice::Steal).await;
    alice.teardown();
    drop(alice);

    commit(&mut bob, Choice::Split).await;
    let mut alice = SessionOrchestrator::connect(context(&ledger, ALICE, id))
        .await
        .unwrap();
    assert_eq!(alice.phase(), Phase::Reveal);

    let err = alice.reveal().await.unwrap_err();
    assert!(matches!(err, SessionError::SecretLost(_)));
    assert_eq!(alice.status(), &SessionStatus::SecretLost);
}

#[tokio::test]
async fn test_vault_recovers_secret_after_restart() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("secrets.db");
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;

    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "hunter2"))
        .await
        .unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();

    commit(&mut alice, Choice::Steal).await;
    drop(alice);
    commit(&mut bob, Choice::Split).await;

    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "hunter2"))
        .await
        .unwrap();
    assert_eq!(alice.view().selected, Some(Choice::Steal));
    bob.process_pending().await.unwrap();

    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();

    assert_eq!(
        alice.outcome().unwrap().classification,
        Classification::AWins
    );
    let reopened = SecretVault::open(&db_path, "hunter2").await.unwrap();
    let leftover = reopened
        .load(id, &AccountId::new(ALICE))
        .await
        .unwrap();
    assert!(leftover.is_none());
}

#[tokio::test]
async fn test_vault_with_wrong_passphrase_is_secret_lost() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("secrets.db");
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;

    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "correct"))
        .await
        .unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();
    commit(&mut alice, Choice::Split).await;
    drop(alice);
    commit(&mut bob, Choice::Split).await;

    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "wrong"))
        .await
        .unwrap();

    assert!(matches!(
        alice.reveal().await,
        Err(SessionError::SecretLost(_))
    ));
}

#[tokio::test]
async fn test_encrypted_persistence_needs_passphrase() {
    let temp = TempDir::new().unwrap();
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;

    let ctx = context(&ledger, ALICE, id)
        .with_config(config().with_encrypted_secrets(temp.path().join("secrets.db")));
    let result = SessionOrchestrator::connect(ctx).await;

    assert!(matches!(
        result,
        Err(SessionError::Ledger(LedgerError::Config(_)))
    ));
    assert_eq!(ledger.subscriber_count(id), 0);
}

#[tokio::test]
async fn test_lost_commit_receipt_keeps_secret() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("secrets.db");
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let vault = Arc::new(SecretVault::open(&db_path, "hunter2").await.unwrap());
    let mut alice =
        SessionOrchestrator::connect(context(&ledger, ALICE, id).with_vault(vault.clone()))
            .await
            .unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();

    ledger.update_faults(|f| f.lose_next_receipt = true);
    alice.select_choice(Choice::Steal).unwrap();
    let err = alice.commit().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Ledger(LedgerError::TransientSubmit(_))
    ));
    assert!(!alice.is_busy());
    assert!(alice.session().unwrap().committed_a);
    assert!(matches!(
        alice.commit().await,
        Err(SessionError::AlreadyCommitted)
    ));

    let sealed = vault.load(id, &AccountId::new(ALICE)).await.unwrap();
    assert_eq!(sealed.map(|(choice, _)| choice), Some(Choice::Steal));

    // Same process: the held secret reveals.
    commit(&mut bob, Choice::Split).await;
    drain(&mut [&mut alice, &mut bob]).await;
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();

    assert_eq!(
        alice.outcome().unwrap().classification,
        Classification::AWins
    );
}

#[tokio::test]
async fn test_lost_commit_receipt_survives_restart() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("secrets.db");
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "hunter2"))
        .await
        .unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();

    ledger.update_faults(|f| f.lose_next_receipt = true);
    alice.select_choice(Choice::Split).unwrap();
    assert!(alice.commit().await.is_err());
    drop(alice);

    commit(&mut bob, Choice::Split).await;
    let mut alice = SessionOrchestrator::connect(vaulted(&ledger, ALICE, id, &db_path, "hunter2"))
        .await
        .unwrap();
    assert_eq!(alice.phase(), Phase::Reveal);
    bob.process_pending().await.unwrap();

    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();

    assert_eq!(
        alice.outcome().unwrap().classification,
        Classification::SplitTie
    );
}

#[tokio::test]
async fn test_unanswered_commit_is_resent_unchanged() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;

    ledger.update_faults(|f| f.drop_next_submit = true);
    alice.select_choice(Choice::Split).unwrap();
    let err = alice.commit().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Ledger(LedgerError::TransientSubmit(_))
    ));
    assert!(!alice.session().unwrap().committed_a);
    assert_eq!(alice.phase(), Phase::Commit);
    assert!(matches!(
        alice.status(),
        SessionStatus::ActionFailed { action, .. } if action == "commit"
    ));
    // The pending commitment may still land, so its choice stays frozen.
    assert!(matches!(
        alice.select_choice(Choice::Steal),
        Err(SessionError::AlreadyCommitted)
    ));

    alice.commit().await.unwrap();
    commit(&mut bob, Choice::Steal).await;
    drain(&mut [&mut alice, &mut bob]).await;
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();

    let outcome = alice.outcome().unwrap();
    assert_eq!(outcome.choice_a, Choice::Split);
    assert_eq!(outcome.classification, Classification::BWins);
}

#[tokio::test]
async fn test_abandoned_commit_does_not_leave_view_busy() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let slow = SlowSigner {
        inner: Arc::new(ledger.signer(AccountId::new(ALICE))),
        delay: Duration::from_millis(50),
    };
    let ctx = SessionContext::new(
        id,
        Arc::new(slow),
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
    )
    .with_scheme(ledger.scheme())
    .with_config(config());
    let mut alice = SessionOrchestrator::connect(ctx).await.unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();

    alice.select_choice(Choice::Split).unwrap();
    let attempt = tokio::time::timeout(Duration::from_millis(5), alice.commit()).await;
    assert!(attempt.is_err());
    assert!(alice.is_busy());

    // The write keeps running on its own task and lands.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(alice.process_pending().await.unwrap(), 1);

    assert!(!alice.is_busy());
    assert!(!alice.view().busy);
    assert!(alice.session().unwrap().committed_a);
    assert!(matches!(
        alice.status(),
        SessionStatus::ActionFailed { action, .. } if action == "commit"
    ));

    commit(&mut bob, Choice::Steal).await;
    drain(&mut [&mut alice, &mut bob]).await;
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();
    assert_eq!(
        alice.outcome().unwrap().classification,
        Classification::BWins
    );
}

#[tokio::test]
async fn test_teardown_stops_delivery() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;
    assert_eq!(ledger.subscriber_count(id), 2);

    let watcher = alice.watch();
    alice.teardown();
    alice.teardown();

    assert_eq!(ledger.subscriber_count(id), 1);
    assert_eq!(watcher.borrow().state, OrchestratorState::TornDown);

    commit(&mut bob, Choice::Split).await;
    assert!(!alice.process_next().await.unwrap());
    assert!(matches!(
        alice.commit().await,
        Err(SessionError::TornDown)
    ));
    let note = RawNotification::new(NotificationKind::Committed, id, json!({}));
    assert!(matches!(
        alice.handle_notification(note).await,
        Err(SessionError::TornDown)
    ));
}

#[tokio::test]
async fn test_dropping_view_unsubscribes() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (alice, _bob) = seat_both(&ledger, id).await;

    drop(alice);
    assert_eq!(ledger.subscriber_count(id), 1);
}

#[tokio::test]
async fn test_spectator_cannot_act() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;
    let mut carol = SessionOrchestrator::connect(context(&ledger, "0xCA401", id))
        .await
        .unwrap();

    assert_eq!(carol.phase(), Phase::Commit);
    assert!(carol.view().seat.is_none());
    carol.select_choice(Choice::Steal).unwrap();
    assert!(matches!(
        carol.commit().await,
        Err(SessionError::NotAParticipant(_))
    ));

    commit(&mut alice, Choice::Steal).await;
    commit(&mut bob, Choice::Split).await;
    drain(&mut [&mut alice, &mut bob, &mut carol]).await;
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    carol.process_pending().await.unwrap();

    let outcome = carol.outcome().unwrap();
    assert_eq!(outcome.classification, Classification::AWins);
    assert_eq!(
        outcome.narrative(carol.role()),
        "Player A stole while player B split."
    );
}

#[tokio::test]
async fn test_role_detection_ignores_case() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;

    let alice = SessionOrchestrator::connect(context(&ledger, "0xa11ce", id))
        .await
        .unwrap();
    assert!(alice.role().is_participant());
    assert_eq!(alice.view().seat.map(|s| s.has_committed), Some(false));
}

#[tokio::test]
async fn test_missing_session_is_fatal() {
    let ledger = MemoryLedger::new();

    let result = SessionOrchestrator::connect(context(&ledger, ALICE, SessionId(42))).await;

    assert!(matches!(result, Err(SessionError::NotFound(SessionId(42)))));
    assert_eq!(ledger.subscriber_count(SessionId(42)), 0);
}

#[tokio::test]
async fn test_notifications_for_other_sessions_are_ignored() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, _bob) = seat_both(&ledger, id).await;
    let reads = ledger.fetch_count();

    let stray = RawNotification::new(NotificationKind::Committed, SessionId(id.0 + 1), json!({}));
    alice.handle_notification(stray).await.unwrap();

    assert_eq!(ledger.fetch_count(), reads);
    assert!(alice.recent_notifications().is_empty());
}

#[tokio::test]
async fn test_event_log_keeps_most_recent() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let mut alice = SessionOrchestrator::connect(
        context(&ledger, ALICE, id).with_config(ClientConfig {
            event_log_capacity: 2,
            ..config()
        }),
    )
    .await
    .unwrap();
    let mut bob = SessionOrchestrator::connect(context(&ledger, BOB, id))
        .await
        .unwrap();

    commit(&mut alice, Choice::Split).await;
    commit(&mut bob, Choice::Split).await;
    drain(&mut [&mut alice, &mut bob]).await;
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice.process_pending().await.unwrap();

    let kinds: Vec<NotificationKind> = alice
        .view()
        .recent_notifications
        .iter()
        .map(|record| record.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::Revealed, NotificationKind::Finished]
    );
}

#[tokio::test]
async fn test_run_until_result_and_watch() {
    let ledger = MemoryLedger::new();
    let id = open_session(&ledger).await;
    let (mut alice, mut bob) = seat_both(&ledger, id).await;
    let watcher = alice.watch();

    commit(&mut alice, Choice::Split).await;
    commit(&mut bob, Choice::Split).await;
    alice
        .run_until(|view| view.phase == Phase::Reveal)
        .await
        .unwrap();
    assert_eq!(watcher.borrow().phase, Phase::Reveal);

    bob.process_pending().await.unwrap();
    alice.reveal().await.unwrap();
    bob.reveal().await.unwrap();
    alice
        .run_until(|view| view.outcome.is_some())
        .await
        .unwrap();

    let view = watcher.borrow().clone();
    assert_eq!(view.phase, Phase::Result);
    assert_eq!(
        view.outcome.map(|o| o.classification),
        Some(Classification::SplitTie)
    );
}
