// Captain's-Mode round order: which team acts in each of the 24 rounds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of rounds in a Captain's-Mode draft.
pub const TOTAL_ROUNDS: u8 = 24;

/// Whether a round is a ban or a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Ban,
    Pick,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Ban => write!(f, "ban"),
            ActionType::Pick => write!(f, "pick"),
        }
    }
}

/// Which row of the sequence table a team occupies: the first-pick team or
/// the second-pick team. Assigned to concrete teams once the choosing phase
/// resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickOrder {
    First,
    Second,
}

impl PickOrder {
    pub fn other(self) -> PickOrder {
        match self {
            PickOrder::First => PickOrder::Second,
            PickOrder::Second => PickOrder::First,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("round {0} is outside the draft sequence (1..={TOTAL_ROUNDS})")]
pub struct InvalidRound(pub u8);

use ActionType::{Ban, Pick};
use PickOrder::{First, Second};

/// The fixed Captain's-Mode order table, indexed by `round - 1`.
///
/// Ban phase 1 (7), pick phase 1 (2), ban phase 2 (3), pick phase 2 (6),
/// ban phase 3 (4), pick phase 3 (2).
const SEQUENCE: [(PickOrder, ActionType); TOTAL_ROUNDS as usize] = [
    // Ban phase 1
    (First, Ban),
    (First, Ban),
    (Second, Ban),
    (Second, Ban),
    (First, Ban),
    (Second, Ban),
    (Second, Ban),
    // Pick phase 1
    (First, Pick),
    (Second, Pick),
    // Ban phase 2
    (First, Ban),
    (First, Ban),
    (Second, Ban),
    // Pick phase 2
    (Second, Pick),
    (First, Pick),
    (First, Pick),
    (Second, Pick),
    (Second, Pick),
    (First, Pick),
    // Ban phase 3
    (First, Ban),
    (Second, Ban),
    (First, Ban),
    (Second, Ban),
    // Pick phase 3
    (First, Pick),
    (Second, Pick),
];

/// Who acts in `round` (1-based), and whether they ban or pick.
pub fn actor_for(round: u8) -> Result<(PickOrder, ActionType), InvalidRound> {
    if round == 0 || round > TOTAL_ROUNDS {
        return Err(InvalidRound(round));
    }
    Ok(SEQUENCE[(round - 1) as usize])
}
