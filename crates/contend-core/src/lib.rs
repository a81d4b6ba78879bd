//! Contend Core - Optimistic writes against a shared resource registry
//!
//! This crate provides the single-threaded building blocks of the contend
//! system. It owns no threads; `contend-hub` drives these types from its
//! workers and resolver.
//!
//! - Identity types (`WorkerId`, `ResourceName`)
//! - Totally ordered timestamps (`Stamp`) and their source (`StampClock`)
//! - Immutable `Operation` and `Conflict` records
//! - The last-write-wins `ResolutionPolicy`
//! - The `Ledger`: the resource registry and its append-only operation log,
//!   guarded together by one lock
//!
//! ## Example
//!
//! ```
//! use contend_core::{Conflict, Ledger, Operation, StampClock, WorkerId, WriteOutcome};
//!
//! let clock = StampClock::system();
//! let ledger = Ledger::new();
//!
//! let first = Operation::new(&clock, WorkerId(1), "R1", "X");
//! assert!(ledger.attempt_write(first).is_committed());
//!
//! let second = Operation::new(&clock, WorkerId(2), "R1", "Y");
//! match ledger.attempt_write(second.clone()) {
//!     WriteOutcome::Conflicted { incumbent } => {
//!         let conflict = Conflict::new(incumbent, second);
//!         assert_eq!(conflict.resource().as_str(), "R1");
//!     }
//!     WriteOutcome::Committed { .. } => unreachable!("R1 already holds X"),
//! }
//! ```

mod error;
mod identity;
pub mod ledger;
mod operation;
pub mod resolution;
pub mod time;

pub use error::{Error, Result};
pub use identity::{ResourceName, WorkerId};
pub use ledger::{
    EntryKind, Ledger, LedgerSnapshot, LedgerStats, LogEntry, ResolvedConflict, WriteOutcome,
};
pub use operation::{Conflict, Operation};
pub use resolution::{LastWriteWins, Resolution, ResolutionPolicy, Winner};
pub use time::{Stamp, StampClock};
