//! Ledger - The resource registry and its operation log
//!
//! The registry (resource name -> last applied operation) and the append-only
//! log of applied operations are one logical unit: every mutation of one is
//! paired with a mutation of the other, inside the same critical section of
//! a single `parking_lot::Mutex`. Callers never see the lock or a reference
//! into the guarded state; reads hand out owned copies.
//!
//! # Write paths
//!
//! - [`Ledger::attempt_write`]: optimistic write by a worker. Commits when the
//!   resource is absent or already holds the proposed value, otherwise reports
//!   the incumbent operation and appends nothing.
//! - [`Ledger::apply_resolution`]: authoritative write by the resolver. Always
//!   sets the winning value and appends the winning operation.
//!
//! # Example
//!
//! ```
//! use contend_core::{EntryKind, Ledger, Operation, StampClock, WorkerId};
//!
//! let clock = StampClock::system();
//! let ledger = Ledger::new();
//! assert_eq!(ledger.get("R1"), None);
//!
//! ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R1", "X"));
//! assert_eq!(ledger.get("R1").as_deref(), Some("X"));
//!
//! let snapshot = ledger.snapshot();
//! assert_eq!(snapshot.len(), 1);
//! assert_eq!(snapshot.entries()[0].kind, EntryKind::Direct);
//! ```

use crate::{Error, Operation, Resolution, ResourceName, Result, WorkerId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How an entry reached the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Uncontended write committed by its originating worker
    Direct,
    /// Winning operation committed by the resolver
    Resolved,
}

/// One applied operation, in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (0-based)
    pub index: usize,
    /// The operation that was applied
    pub operation: Operation,
    /// Which write path applied it
    pub kind: EntryKind,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)
    }
}

/// A resolution together with the log entry it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub log_index: usize,
    pub resolution: Resolution,
}

/// Counters kept in step with the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Direct commits appended
    pub committed: u64,
    /// Resolutions appended
    pub resolved: u64,
    /// Write attempts that observed a different current value
    pub conflicts_detected: u64,
}

impl LedgerStats {
    /// Conflicts detected but not yet resolved
    pub fn outstanding(&self) -> u64 {
        self.conflicts_detected.saturating_sub(self.resolved)
    }
}

/// Result of an optimistic write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied and appended at `index`
    Committed { index: usize },
    /// The resource holds a different value, applied by `incumbent`
    Conflicted { incumbent: Operation },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, WriteOutcome::Conflicted { .. })
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    current: IndexMap<ResourceName, Operation>,
    log: Vec<LogEntry>,
    resolutions: Vec<ResolvedConflict>,
    stats: LedgerStats,
}

impl LedgerState {
    /// Set the registry value and append the log entry; the only mutation path
    fn append(&mut self, operation: Operation, kind: EntryKind) -> usize {
        let index = self.log.len();
        self.current
            .insert(operation.resource().clone(), operation.clone());
        self.log.push(LogEntry {
            index,
            operation,
            kind,
        });
        match kind {
            EntryKind::Direct => self.stats.committed += 1,
            EntryKind::Resolved => self.stats.resolved += 1,
        }
        debug_assert_eq!(
            self.log.len() as u64,
            self.stats.committed + self.stats.resolved,
            "log length diverged from commit accounting"
        );
        index
    }
}

/// Registry and operation log behind one lock
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt an optimistic write
    ///
    /// Commits when the resource has no value yet or already holds
    /// `op.value()`; a repeated identical value is not a collision. Otherwise
    /// returns the incumbent operation and leaves registry and log untouched.
    /// Building and queueing the [`Conflict`](crate::Conflict) is up to the caller.
    pub fn attempt_write(&self, op: Operation) -> WriteOutcome {
        let resource = op.resource().clone();
        let originator = op.originator();

        let outcome = {
            let mut state = self.state.lock();
            let incumbent = state
                .current
                .get(&resource)
                .filter(|current| current.value() != op.value())
                .cloned();

            match incumbent {
                Some(incumbent) => {
                    state.stats.conflicts_detected += 1;
                    WriteOutcome::Conflicted { incumbent }
                }
                None => WriteOutcome::Committed {
                    index: state.append(op, EntryKind::Direct),
                },
            }
        };

        match &outcome {
            WriteOutcome::Committed { index } => {
                debug!(%resource, %originator, index, "write committed");
            }
            WriteOutcome::Conflicted { incumbent } => {
                debug!(
                    %resource,
                    %originator,
                    incumbent = %incumbent.originator(),
                    "write conflicted"
                );
            }
        }
        outcome
    }

    /// Commit a resolver decision
    ///
    /// Bypasses conflict detection: the winning operation becomes the current
    /// value and is appended to the log, whatever the registry holds now.
    pub fn apply_resolution(&self, resolution: Resolution) -> usize {
        let resource = resolution.conflict().resource().clone();
        let winner = resolution.winner();

        let index = {
            let mut state = self.state.lock();
            let index = state.append(resolution.winning_operation().clone(), EntryKind::Resolved);
            state.resolutions.push(ResolvedConflict {
                log_index: index,
                resolution,
            });
            index
        };

        debug!(%resource, %winner, index, "resolution committed");
        index
    }

    /// Current value of a resource, `None` before its first write
    pub fn get(&self, resource: &str) -> Option<String> {
        self.state
            .lock()
            .current
            .get(resource)
            .map(|op| op.value().to_string())
    }

    /// Current value of a resource, or `Error::ResourceNotFound`
    pub fn require(&self, resource: &str) -> Result<String> {
        self.get(resource)
            .ok_or_else(|| Error::ResourceNotFound(ResourceName::from(resource)))
    }

    /// The operation that set the current value of a resource
    pub fn current_operation(&self, resource: &str) -> Option<Operation> {
        self.state.lock().current.get(resource).cloned()
    }

    /// Number of resources that have a value
    pub fn resource_count(&self) -> usize {
        self.state.lock().current.len()
    }

    /// Number of log entries
    pub fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn stats(&self) -> LedgerStats {
        self.state.lock().stats
    }

    /// Consistent copy of registry, log, and counters
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot {
            registry: state.current.clone(),
            log: state.log.clone(),
            resolutions: state.resolutions.clone(),
            stats: state.stats,
        }
    }
}

/// An owned, point-in-time copy of a [`Ledger`]
///
/// Taken under the ledger's lock, so registry and log always agree with
/// each other. Taken after the system quiesces it is the final result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    registry: IndexMap<ResourceName, Operation>,
    log: Vec<LogEntry>,
    resolutions: Vec<ResolvedConflict>,
    stats: LedgerStats,
}

impl LedgerSnapshot {
    /// Reassemble a snapshot from its parts, e.g. after loading an export
    ///
    /// Nothing is checked here; run the parts through an auditor before
    /// trusting them.
    pub fn from_parts(
        registry: IndexMap<ResourceName, Operation>,
        log: Vec<LogEntry>,
        resolutions: Vec<ResolvedConflict>,
        stats: LedgerStats,
    ) -> Self {
        Self {
            registry,
            log,
            resolutions,
            stats,
        }
    }

    /// Current value of a resource
    pub fn value(&self, resource: &str) -> Option<&str> {
        self.registry.get(resource).map(|op| op.value())
    }

    /// Current value of every known resource, in first-write order
    pub fn values(&self) -> impl Iterator<Item = (&ResourceName, &str)> {
        self.registry.iter().map(|(name, op)| (name, op.value()))
    }

    /// The registry: resource -> operation that set its current value
    pub fn registry(&self) -> &IndexMap<ResourceName, Operation> {
        &self.registry
    }

    /// Log entries in append order
    pub fn entries(&self) -> &[LogEntry] {
        &self.log
    }

    /// Every committed resolution, in commit order
    pub fn resolutions(&self) -> &[ResolvedConflict] {
        &self.resolutions
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }

    /// Number of log entries
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Last log entry touching a resource
    pub fn last_entry_for(&self, resource: &str) -> Option<&LogEntry> {
        self.log
            .iter()
            .rev()
            .find(|entry| entry.operation.resource().as_str() == resource)
    }

    /// Log entries originated by a worker
    pub fn entries_by(&self, worker: WorkerId) -> impl Iterator<Item = &LogEntry> {
        self.log
            .iter()
            .filter(move |entry| entry.operation.originator() == worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Conflict, LastWriteWins, ResolutionPolicy, StampClock, Winner};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn manual_clock() -> StampClock {
        StampClock::manual(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_first_write_commits() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        let outcome = ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R1", "X"));
        assert_eq!(outcome, WriteOutcome::Committed { index: 0 });
        assert_eq!(ledger.get("R1").as_deref(), Some("X"));
        assert_eq!(ledger.log_len(), 1);
        assert_eq!(ledger.resource_count(), 1);
    }

    #[test]
    fn test_absent_resource_is_not_an_error() {
        let ledger = Ledger::new();
        assert_eq!(ledger.get("missing"), None);
        assert!(ledger.current_operation("missing").is_none());
        assert!(matches!(
            ledger.require("missing"),
            Err(Error::ResourceNotFound(name)) if name.as_str() == "missing"
        ));
    }

    #[test]
    fn test_equal_value_write_never_conflicts() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R1", "X"));
        let outcome = ledger.attempt_write(Operation::new(&clock, WorkerId(2), "R1", "X"));

        assert!(outcome.is_committed());
        assert_eq!(ledger.log_len(), 2);
        assert_eq!(ledger.stats().conflicts_detected, 0);
        assert_eq!(
            ledger.current_operation("R1").map(|op| op.originator()),
            Some(WorkerId(2))
        );
    }

    #[test]
    fn test_different_value_reports_incumbent_and_appends_nothing() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        let first = Operation::new(&clock, WorkerId(1), "R1", "X");
        ledger.attempt_write(first.clone());
        let outcome = ledger.attempt_write(Operation::new(&clock, WorkerId(2), "R1", "Y"));

        assert_eq!(outcome, WriteOutcome::Conflicted { incumbent: first });
        assert_eq!(ledger.get("R1").as_deref(), Some("X"));
        assert_eq!(ledger.log_len(), 1);
        assert_eq!(ledger.stats().conflicts_detected, 1);
        assert_eq!(ledger.stats().outstanding(), 1);
    }

    #[test]
    fn test_two_writer_scenario_resolves_to_later_value() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        let x = Operation::new(&clock, WorkerId(1), "R1", "X");
        clock.advance(Duration::from_millis(1));
        let y = Operation::new(&clock, WorkerId(2), "R1", "Y");

        assert!(ledger.attempt_write(x.clone()).is_committed());
        let incumbent = match ledger.attempt_write(y.clone()) {
            WriteOutcome::Conflicted { incumbent } => incumbent,
            other => panic!("Expected conflict, got {:?}", other),
        };
        assert_eq!(incumbent, x);

        let resolution = LastWriteWins.resolve(Conflict::new(incumbent, y.clone()));
        assert_eq!(resolution.winner(), Winner::Challenger);
        assert_eq!(ledger.apply_resolution(resolution), 1);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.value("R1"), Some("Y"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.entries()[0].operation, x);
        assert_eq!(snapshot.entries()[0].kind, EntryKind::Direct);
        assert_eq!(snapshot.entries()[1].operation, y);
        assert_eq!(snapshot.entries()[1].kind, EntryKind::Resolved);
        assert_eq!(snapshot.resolutions().len(), 1);
        assert_eq!(snapshot.resolutions()[0].log_index, 1);
        assert_eq!(snapshot.stats().outstanding(), 0);
    }

    #[test]
    fn test_resolution_overrides_newer_direct_commit() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        let x = Operation::new(&clock, WorkerId(1), "R1", "X");
        let y = Operation::new(&clock, WorkerId(2), "R1", "Y");
        ledger.attempt_write(x.clone());
        let resolution = LastWriteWins.resolve(Conflict::new(x, y));

        // Something else lands on R1 before the resolver gets there.
        let z = Operation::new(&clock, WorkerId(3), "R1", "X");
        ledger.attempt_write(z);

        ledger.apply_resolution(resolution);
        assert_eq!(ledger.get("R1").as_deref(), Some("Y"));
        let snapshot = ledger.snapshot();
        assert_eq!(
            snapshot.last_entry_for("R1").map(|e| e.operation.value()),
            Some("Y")
        );
    }

    #[test]
    fn test_incumbent_win_is_reappended() {
        let clock = manual_clock();
        let ledger = Ledger::new();

        let y = Operation::new(&clock, WorkerId(2), "R1", "Y");
        let x = Operation::new(&clock, WorkerId(1), "R1", "X");
        ledger.attempt_write(x.clone());
        let resolution = LastWriteWins.resolve(Conflict::new(x.clone(), y));
        assert_eq!(resolution.winner(), Winner::Incumbent);

        ledger.apply_resolution(resolution);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.entries()[1].operation, x);
        assert_eq!(snapshot.value("R1"), Some("X"));
    }

    #[test]
    fn test_snapshot_helpers() {
        let clock = manual_clock();
        let ledger = Ledger::new();
        ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R1", "A"));
        ledger.attempt_write(Operation::new(&clock, WorkerId(2), "R2", "B"));
        ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R3", "C"));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.entries_by(WorkerId(1)).count(), 2);
        let values: Vec<_> = snapshot
            .values()
            .map(|(name, value)| (name.as_str().to_string(), value.to_string()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("R1".to_string(), "A".to_string()),
                ("R2".to_string(), "B".to_string()),
                ("R3".to_string(), "C".to_string()),
            ]
        );
        assert!(snapshot.last_entry_for("R4").is_none());
    }

    #[test]
    fn test_concurrent_writers_keep_log_and_registry_in_step() {
        let clock = Arc::new(StampClock::system());
        let ledger = Arc::new(Ledger::new());

        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let clock = Arc::clone(&clock);
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    for i in 0..200u64 {
                        let resource = format!("R{}", i % 3);
                        let value = format!("V{}", (worker + i) % 4);
                        ledger.attempt_write(Operation::new(
                            &clock,
                            WorkerId(worker),
                            resource,
                            value,
                        ));
                    }
                });
            }
        });

        let snapshot = ledger.snapshot();
        let stats = snapshot.stats();
        assert_eq!(stats.committed + stats.conflicts_detected, 8 * 200);
        assert_eq!(snapshot.len() as u64, stats.committed);
        for (name, op) in snapshot.registry() {
            let last = snapshot.last_entry_for(name.as_str()).unwrap();
            assert_eq!(&last.operation, op);
        }
        for (i, entry) in snapshot.entries().iter().enumerate() {
            assert_eq!(entry.index, i);
        }
    }
}
