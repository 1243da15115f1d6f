use serde::{Deserialize, Serialize};
use splitsteal_core::{AccountId, Amount, Choice, Role, Settlement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Both split, the pot is divided evenly.
    SplitTie,
    /// Both stole, the pot is forfeited to charity.
    StealNone,
    AWins,
    BWins,
}

pub fn classify(choice_a: Choice, choice_b: Choice) -> Classification {
    match (choice_a, choice_b) {
        (Choice::Split, Choice::Split) => Classification::SplitTie,
        (Choice::Steal, Choice::Steal) => Classification::StealNone,
        (Choice::Split, Choice::Steal) => Classification::BWins,
        (Choice::Steal, Choice::Split) => Classification::AWins,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub participant_a: AccountId,
    pub participant_b: AccountId,
    pub choice_a: Choice,
    pub choice_b: Choice,
    pub classification: Classification,
    pub payout_a: Amount,
    pub payout_b: Amount,
}

/// Labels a settlement. Payouts are carried through untouched, so the same
/// settlement gives the same outcome whether it came from a notification or
/// from a query.
pub fn resolve(settlement: &Settlement) -> Outcome {
    Outcome {
        participant_a: settlement.participant_a.clone(),
        participant_b: settlement.participant_b.clone(),
        choice_a: settlement.choice_a,
        choice_b: settlement.choice_b,
        classification: classify(settlement.choice_a, settlement.choice_b),
        payout_a: settlement.payout_a,
        payout_b: settlement.payout_b,
    }
}

impl Outcome {
    pub fn winner(&self) -> Option<&AccountId> {
        match self.classification {
            Classification::AWins => Some(&self.participant_a),
            Classification::BWins => Some(&self.participant_b),
            Classification::SplitTie | Classification::StealNone => None,
        }
    }

    pub fn headline(&self, role: Role) -> &'static str {
        match (self.classification, self.viewer_won(role)) {
            (Classification::SplitTie, _) => "It's a Tie!",
            (Classification::StealNone, _) => "Nobody Wins",
            (_, Some(true)) => "You Won!",
            (_, Some(false)) => "You Lost",
            (_, None) => "Session Over",
        }
    }

    /// Explanation shown to `role`.
    pub fn narrative(&self, role: Role) -> &'static str {
        match self.classification {
            Classification::SplitTie => {
                "Both players chose to split. The pot was divided equally."
            }
            Classification::StealNone => "Both players chose to steal. The pot goes to charity.",
            Classification::AWins | Classification::BWins => match self.viewer_won(role) {
                Some(true) => "You stole while they split!",
                Some(false) => "You split but they stole!",
                None if self.classification == Classification::AWins => {
                    "Player A stole while player B split."
                }
                None => "Player B stole while player A split.",
            },
        }
    }

    fn viewer_won(&self, role: Role) -> Option<bool> {
        match (role, self.classification) {
            (Role::Spectator, _) => None,
            (_, Classification::SplitTie | Classification::StealNone) => None,
            (Role::ParticipantA, c) => Some(c == Classification::AWins),
            (Role::ParticipantB, c) => Some(c == Classification::BWins),
        }
    }
}
