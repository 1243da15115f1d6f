use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use splitsteal_core::commitment::{self, Commitment, CommitmentScheme, Secret};
use splitsteal_core::{AccountId, Choice, SessionId};

/// Local progress through commit/reveal, independent of what the ledger says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    Choosing,
    Committing,
    Committed,
    Revealed,
}

/// The choice and secret behind a submitted commitment.
#[derive(Clone)]
pub struct LocalSecret {
    pub choice: Choice,
    pub secret: Secret,
    pub commitment: Commitment,
}

/// The local account's side of one session.
pub struct LocalParticipant {
    session_id: SessionId,
    account: AccountId,
    state: ParticipantState,
    selected: Option<Choice>,
    secret: Option<LocalSecret>,
}

impl LocalParticipant {
    pub fn new(session_id: SessionId, account: AccountId) -> Self {
        Self {
            session_id,
            account,
            state: ParticipantState::Choosing,
            selected: None,
            secret: None,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn selected(&self) -> Option<Choice> {
        self.selected
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn select_choice(&mut self, choice: Choice) -> Result<()> {
        if self.state != ParticipantState::Choosing {
            return Err(SessionError::AlreadyCommitted);
        }
        self.selected = Some(choice);
        Ok(())
    }

    /// Generate and hold a fresh secret for the selected choice.
    pub fn prepare_commitment(&mut self, scheme: &dyn CommitmentScheme) -> Result<LocalSecret> {
        if self.state != ParticipantState::Choosing {
            return Err(SessionError::AlreadyCommitted);
        }
        let choice = self.selected.ok_or(SessionError::NoChoiceSelected)?;

        let (secret, commitment) = commitment::generate(scheme, choice);
        let local = LocalSecret {
            choice,
            secret,
            commitment,
        };
        self.secret = Some(local.clone());
        self.state = ParticipantState::Committing;

        tracing::info!("Prepared commitment for session {}", self.session_id);
        Ok(local)
    }

    /// The commitment already sent whose fate is unknown. Resubmitting it
    /// is safe: the ledger takes at most one commitment per seat.
    pub fn pending_commitment(&self) -> Option<LocalSecret> {
        match self.state {
            ParticipantState::Committing => self.secret.clone(),
            _ => None,
        }
    }

    pub fn confirm_commit(&mut self) {
        self.state = ParticipantState::Committed;
    }

    /// The commit did not land; forget its secret so a new one is drawn.
    pub fn abandon_commit(&mut self) {
        if self.state == ParticipantState::Committing {
            self.secret = None;
            self.state = ParticipantState::Choosing;
        }
    }

    /// The ledger already holds a commitment from this account (for example
    /// made before a restart) that this instance did not submit.
    pub fn observe_remote_commit(&mut self) {
        if matches!(
            self.state,
            ParticipantState::Choosing | ParticipantState::Committing
        ) {
            self.state = ParticipantState::Committed;
        }
    }

    pub fn observe_remote_reveal(&mut self) {
        self.secret = None;
        self.state = ParticipantState::Revealed;
    }

    /// Reinstates a secret recovered from durable storage.
    pub fn restore(&mut self, choice: Choice, secret: Secret, commitment: Commitment) {
        self.selected = Some(choice);
        self.secret = Some(LocalSecret {
            choice,
            secret,
            commitment,
        });
        if self.state != ParticipantState::Revealed {
            self.state = ParticipantState::Committed;
        }
    }

    /// Choice and secret for the reveal. Without the secret the reveal is
    /// impossible.
    pub fn reveal_payload(&self) -> Result<(Choice, Secret)> {
        if self.state == ParticipantState::Revealed {
            return Err(SessionError::AlreadyRevealed);
        }
        let local = self
            .secret
            .as_ref()
            .ok_or(SessionError::SecretLost(self.session_id))?;
        Ok(commitment::reveal_payload(local.choice, local.secret.clone()))
    }

    pub fn confirm_reveal(&mut self) {
        self.secret = None;
        self.state = ParticipantState::Revealed;
        tracing::info!("Revealed choice for session {}", self.session_id);
    }
}

impl std::fmt::Debug for LocalParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalParticipant")
            .field("session_id", &self.session_id)
            .field("account", &self.account)
            .field("state", &self.state)
            .field("selected", &self.selected)
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}
