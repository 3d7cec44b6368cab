// Captain's-Mode draft engine: round sequence, chess clocks, state machine.

pub mod sequence;
pub mod state;
pub mod timer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two teams in a draft session. Slots are fixed at session
/// creation; which slot is first-pick/radiant is decided in the choosing
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSlot {
    A,
    B,
}

impl TeamSlot {
    pub const BOTH: [TeamSlot; 2] = [TeamSlot::A, TeamSlot::B];

    pub fn other(self) -> TeamSlot {
        match self {
            TeamSlot::A => TeamSlot::B,
            TeamSlot::B => TeamSlot::A,
        }
    }

    /// Index into per-team arrays.
    pub fn index(self) -> usize {
        match self {
            TeamSlot::A => 0,
            TeamSlot::B => 1,
        }
    }
}

impl fmt::Display for TeamSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSlot::A => write!(f, "A"),
            TeamSlot::B => write!(f, "B"),
        }
    }
}
