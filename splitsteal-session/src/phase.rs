use serde::{Deserialize, Serialize};
use splitsteal_core::{Role, Session, Stage};

/// UI phase, ordered in the direction a session moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Waiting,
    Commit,
    Reveal,
    Result,
}

/// Projects authoritative state onto a phase.
///
/// No history is consulted, so a stale snapshot followed by a fresh one
/// always lands where the fresh one says.
pub fn derive(session: &Session, _role: Role) -> Phase {
    if !session.has_participant_b() {
        return Phase::Waiting;
    }

    match session.stage {
        Stage::Revealed | Stage::Finished => Phase::Result,
        Stage::Committed => {
            if session.both_revealed() {
                Phase::Result
            } else {
                Phase::Reveal
            }
        }
        Stage::Open => {
            if !session.both_committed() {
                Phase::Commit
            } else if !session.both_revealed() {
                Phase::Reveal
            } else {
                Phase::Result
            }
        }
    }
}

/// Commit/reveal flags from the local participant's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub has_committed: bool,
    pub has_revealed: bool,
    pub opponent_committed: bool,
    pub opponent_revealed: bool,
}

impl Seat {
    pub fn of(session: &Session, role: Role) -> Option<Seat> {
        let seat = match role {
            Role::ParticipantA => Seat {
                has_committed: session.committed_a,
                has_revealed: session.revealed_a,
                opponent_committed: session.committed_b,
                opponent_revealed: session.revealed_b,
            },
            Role::ParticipantB => Seat {
                has_committed: session.committed_b,
                has_revealed: session.revealed_b,
                opponent_committed: session.committed_a,
                opponent_revealed: session.revealed_a,
            },
            Role::Spectator => return None,
        };
        Some(seat)
    }
}
