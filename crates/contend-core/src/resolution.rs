//! Conflict resolution
//!
//! A [`ResolutionPolicy`] decides which side of a [`Conflict`] becomes
//! authoritative. The only policy shipped is [`LastWriteWins`]:
//!
//! - The operation with the greater [`Stamp`](crate::Stamp) wins.
//! - Stamps order by instant, then by construction sequence, so two
//!   operations stamped in the same microsecond by the same clock are never
//!   tied; the one built later wins.
//! - Stamps that compare fully equal can only come from hand-built or
//!   cross-clock operations. The challenger wins those.

use crate::{Conflict, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a conflict won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    Incumbent,
    Challenger,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Incumbent => write!(f, "incumbent"),
            Winner::Challenger => write!(f, "challenger"),
        }
    }
}

/// Strategy for choosing the authoritative operation of a conflict
pub trait ResolutionPolicy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Pick the winning side
    fn decide(&self, conflict: &Conflict) -> Winner;

    /// Decide and package the outcome
    fn resolve(&self, conflict: Conflict) -> Resolution {
        let winner = self.decide(&conflict);
        Resolution { conflict, winner }
    }
}

/// Later stamp wins; equal stamps go to the challenger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastWriteWins;

impl ResolutionPolicy for LastWriteWins {
    fn name(&self) -> &'static str {
        "last-write-wins"
    }

    fn decide(&self, conflict: &Conflict) -> Winner {
        if conflict.incumbent().supersedes(conflict.challenger()) {
            Winner::Incumbent
        } else {
            Winner::Challenger
        }
    }
}

/// A decided conflict, ready to be committed to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    conflict: Conflict,
    winner: Winner,
}

impl Resolution {
    pub fn conflict(&self) -> &Conflict {
        &self.conflict
    }

    pub fn winner(&self) -> Winner {
        self.winner
    }

    /// The operation that becomes the resource's value
    pub fn winning_operation(&self) -> &Operation {
        match self.winner {
            Winner::Incumbent => self.conflict.incumbent(),
            Winner::Challenger => self.conflict.challenger(),
        }
    }

    /// The operation that was overruled
    pub fn losing_operation(&self) -> &Operation {
        match self.winner {
            Winner::Incumbent => self.conflict.challenger(),
            Winner::Challenger => self.conflict.incumbent(),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' resolved to '{}' ({} wins)",
            self.conflict.resource(),
            self.winning_operation().value(),
            self.winner
        )
    }
}
