use crate::error::{Result, SessionError};
use splitsteal_core::{Amount, LedgerError, Operation, Receipt, RemoteGameSnapshot, SessionId, Signer};

/// Opens a session staking `bet` and returns its id.
pub async fn create_session(signer: &dyn Signer, bet: Amount) -> Result<SessionId> {
    if bet == Amount::ZERO {
        return Err(LedgerError::InvalidAmount("bet must be positive".to_string()).into());
    }

    let receipt = signer.submit(Operation::CreateSession { bet }).await?;
    let session_id = receipt
        .session_id
        .ok_or_else(|| SessionError::invalid_state("create receipt carries no session id"))?;

    tracing::info!(
        "{} created session {} with bet {}",
        signer.account_id().short(),
        session_id,
        bet
    );
    Ok(session_id)
}

/// Takes the second seat, staking exactly the session's bet.
pub async fn join_session(
    signer: &dyn Signer,
    snapshots: &dyn RemoteGameSnapshot,
    session_id: SessionId,
) -> Result<Receipt> {
    let session = snapshots.fetch(session_id).await.map_err(|e| match e {
        LedgerError::NotFound(id) => SessionError::NotFound(id),
        other => other.into(),
    })?;

    let account = signer.account_id();
    if session.has_participant_b() {
        return Err(SessionError::invalid_state(format!(
            "session {} is full",
            session_id
        )));
    }
    if session.participant_a == account {
        return Err(SessionError::invalid_state("cannot join own session"));
    }

    let receipt = signer
        .submit(Operation::JoinSession {
            session_id,
            stake: session.bet_amount,
        })
        .await?;

    tracing::info!("{} joined session {}", account.short(), session_id);
    Ok(receipt)
}
