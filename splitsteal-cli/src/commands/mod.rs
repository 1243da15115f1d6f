use anyhow::Context;
use comfy_table::{presets::UTF8_FULL, Table};
use splitsteal_core::{
    AccountId, Amount, Choice, ClientConfig, MemoryLedger, Role, SessionId, Settlement,
};
use splitsteal_session::{
    classify as classify_choices, create_session, join_session, resolve, Phase, SessionContext,
    SessionOrchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
const BOB: &str = "0xb0b0000000000000000000000000000000000002";

/// One seat at the demo table.
struct Player {
    name: &'static str,
    view: SessionOrchestrator,
    last_phase: Phase,
}

impl Player {
    async fn connect(
        name: &'static str,
        account: &str,
        ledger: &MemoryLedger,
        session_id: SessionId,
        config: &ClientConfig,
        passphrase: &str,
    ) -> anyhow::Result<Self> {
        let ctx = SessionContext::new(
            session_id,
            Arc::new(ledger.signer(AccountId::new(account))),
            Arc::new(ledger.clone()),
            Arc::new(ledger.clone()),
        )
        .with_scheme(ledger.scheme())
        .with_config(config.clone())
        .with_passphrase(passphrase);

        let view = SessionOrchestrator::connect(ctx)
            .await
            .with_context(|| format!("{} could not open session {}", name, session_id))?;
        let last_phase = view.phase();
        println!("{:<6} joined the table in phase {:?}", name, last_phase);

        Ok(Self {
            name,
            view,
            last_phase,
        })
    }

    /// Handles queued notifications and reports a phase change.
    async fn catch_up(&mut self) -> anyhow::Result<()> {
        self.view.process_pending().await?;
        let phase = self.view.phase();
        if phase != self.last_phase {
            println!("{:<6} {:?} -> {:?}", self.name, self.last_phase, phase);
            self.last_phase = phase;
        }
        Ok(())
    }

    async fn commit(&mut self, choice: Choice) -> anyhow::Result<()> {
        self.view.select_choice(choice)?;
        let receipt = self.view.commit().await?;
        println!("{:<6} committed ({})", self.name, receipt.tx_id);
        Ok(())
    }

    async fn reveal(&mut self) -> anyhow::Result<()> {
        let receipt = self.view.reveal().await?;
        println!("{:<6} revealed ({})", self.name, receipt.tx_id);
        Ok(())
    }
}

pub async fn play(
    bet: Amount,
    choice_a: Choice,
    choice_b: Choice,
    vault_path: Option<PathBuf>,
    passphrase: &str,
) -> anyhow::Result<()> {
    let mut config = ClientConfig {
        retry_delay: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    if let Some(path) = vault_path {
        println!("Sealing pending secrets in {}", path.display());
        config = config.with_encrypted_secrets(path);
    }
    config.validate()?;

    let ledger = MemoryLedger::new();
    let session_id = create_session(&ledger.signer(AccountId::new(ALICE)), bet).await?;
    join_session(&ledger.signer(AccountId::new(BOB)), &ledger, session_id).await?;
    println!("Session {} open with a bet of {}", session_id, bet);
    println!();

    let mut alice =
        Player::connect("alice", ALICE, &ledger, session_id, &config, passphrase).await?;
    let mut bob = Player::connect("bob", BOB, &ledger, session_id, &config, passphrase).await?;

    alice.commit(choice_a).await?;
    bob.commit(choice_b).await?;
    alice.catch_up().await?;
    bob.catch_up().await?;

    alice.reveal().await?;
    bob.reveal().await?;
    alice.catch_up().await?;
    bob.catch_up().await?;
    println!();

    let Some(outcome) = alice.view.outcome().cloned() else {
        println!("Session finished but the settlement is not available yet.");
        return Ok(());
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Player", "Account", "Choice", "Payout", "Result"]);
    for (player, account, choice, payout, role) in [
        (
            "alice",
            &outcome.participant_a,
            outcome.choice_a,
            outcome.payout_a,
            Role::ParticipantA,
        ),
        (
            "bob",
            &outcome.participant_b,
            outcome.choice_b,
            outcome.payout_b,
            Role::ParticipantB,
        ),
    ] {
        table.add_row(vec![
            player.to_string(),
            account.short(),
            choice.to_string(),
            payout.to_string(),
            outcome.headline(role).to_string(),
        ]);
    }
    println!("{}", table);
    println!("{}", outcome.narrative(Role::Spectator));

    for record in alice.view.recent_notifications().iter() {
        tracing::debug!("alice saw {}", record);
    }

    alice.view.teardown();
    bob.view.teardown();
    Ok(())
}

pub fn classify(choice_a: Choice, choice_b: Choice) -> anyhow::Result<()> {
    let classification = classify_choices(choice_a, choice_b);
    let outcome = resolve(&Settlement {
        participant_a: AccountId::new(ALICE),
        participant_b: AccountId::new(BOB),
        choice_a,
        choice_b,
        payout_a: Amount::ZERO,
        payout_b: Amount::ZERO,
    });

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Viewer", "Headline", "Narrative"]);
    for (viewer, role) in [
        ("Player A", Role::ParticipantA),
        ("Player B", Role::ParticipantB),
        ("Spectator", Role::Spectator),
    ] {
        table.add_row(vec![viewer, outcome.headline(role), outcome.narrative(role)]);
    }

    println!("A: {}  B: {}  ->  {:?}", choice_a, choice_b, classification);
    println!("{}", table);
    Ok(())
}

pub fn show_config(vault_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match vault_path {
        Some(path) => ClientConfig::default().with_encrypted_secrets(path),
        None => ClientConfig::default(),
    };
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
