use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monetary quantity in the ledger's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn checked_mul(self, factor: u128) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

impl TryFrom<String> for Amount {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Amount)
            .map_err(|e| LedgerError::InvalidAmount(format!("{}: {}", s, e)))
    }
}

/// Account identifier on the ledger. Comparison is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub const EMPTY_ADDRESS: &'static str = "0x0000000000000000000000000000000000000000";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// The sentinel for a seat nobody has taken yet.
    pub fn empty() -> Self {
        Self(Self::EMPTY_ADDRESS.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0 == Self::EMPTY_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(SessionId)
            .map_err(|e| LedgerError::invalid_value(format!("session id {}: {}", s, e)))
    }
}

/// Authoritative lifecycle marker. Never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Open,
    Committed,
    Revealed,
    Finished,
}

impl TryFrom<u8> for Stage {
    type Error = LedgerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Stage::Open),
            1 => Ok(Stage::Committed),
            2 => Ok(Stage::Revealed),
            3 => Ok(Stage::Finished),
            other => Err(LedgerError::invalid_value(format!("stage code {}", other))),
        }
    }
}

/// A participant's move. The wire code 0 ("none") has no variant and is never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    Split,
    Steal,
}

impl Choice {
    pub fn code(self) -> u8 {
        match self {
            Choice::Split => 1,
            Choice::Steal => 2,
        }
    }
}

impl TryFrom<u8> for Choice {
    type Error = LedgerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Choice::Split),
            2 => Ok(Choice::Steal),
            other => Err(LedgerError::invalid_value(format!("choice code {}", other))),
        }
    }
}

impl FromStr for Choice {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "split" | "1" => Ok(Choice::Split),
            "steal" | "2" => Ok(Choice::Steal),
            other => Err(LedgerError::invalid_value(format!("choice {}", other))),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Split => f.write_str("Split"),
            Choice::Steal => f.write_str("Steal"),
        }
    }
}

/// Where the local account sits in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    ParticipantA,
    ParticipantB,
    Spectator,
}

impl Role {
    pub fn is_participant(self) -> bool {
        !matches!(self, Role::Spectator)
    }
}

/// Snapshot of one session as the contract reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub bet_amount: Amount,
    pub participant_a: AccountId,
    pub participant_b: AccountId,
    pub stage: Stage,
    pub committed_a: bool,
    pub committed_b: bool,
    pub revealed_a: bool,
    pub revealed_b: bool,
}

impl Session {
    pub fn has_participant_b(&self) -> bool {
        !self.participant_b.is_empty()
    }

    pub fn both_committed(&self) -> bool {
        self.committed_a && self.committed_b
    }

    pub fn both_revealed(&self) -> bool {
        self.revealed_a && self.revealed_b
    }

    pub fn role_of(&self, account: &AccountId) -> Role {
        if *account == self.participant_a {
            Role::ParticipantA
        } else if self.has_participant_b() && *account == self.participant_b {
            Role::ParticipantB
        } else {
            Role::Spectator
        }
    }
}

/// Final choices and payouts of a finished session, from whichever source reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub participant_a: AccountId,
    pub participant_b: AccountId,
    pub choice_a: Choice,
    pub choice_b: Choice,
    pub payout_a: Amount,
    pub payout_b: Amount,
}
