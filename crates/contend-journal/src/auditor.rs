//! Auditing and analytics for a finished run
//!
//! The [`Auditor`] cross-checks the three parts of a [`LedgerSnapshot`]
//! (registry, operation log, recorded resolutions) against each other:
//!
//! - **Single value**: every resource's registry value is the value of the
//!   last log entry for that resource
//! - **Accounting**: log length equals direct commits plus resolutions, and
//!   every detected conflict was resolved
//! - **Resolutions**: each resolution picked the later operation and produced
//!   exactly one resolved log entry
//!
//! Any [`Violation`] means the ledger was mutated outside its rules.

use chrono::TimeDelta;
use contend_core::{
    EntryKind, LastWriteWins, LedgerSnapshot, LogEntry, ResolutionPolicy, ResourceName, Winner,
    WorkerId,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A broken ledger property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Registry and last log entry disagree for a resource
    ValueMismatch {
        resource: ResourceName,
        registry: Option<String>,
        log: Option<String>,
    },
    /// A log entry's index does not match its position
    IndexGap { position: usize, index: usize },
    /// A counter disagrees with what the log contains
    CountMismatch {
        counter: &'static str,
        recorded: u64,
        observed: u64,
    },
    /// Conflicts detected but never resolved
    Unresolved(u64),
    /// A resolution points past the end of the log
    MissingEntry { log_index: usize },
    /// The entry at a resolution's index is not that resolution's winner
    EntryMismatch { log_index: usize },
    /// Two resolutions claim the same log entry
    DuplicateEntry { log_index: usize },
    /// A resolved log entry with no recorded resolution
    Unaccounted { index: usize },
    /// A resolution did not pick the later operation
    WrongWinner {
        log_index: usize,
        recorded: Winner,
        expected: Winner,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ValueMismatch {
                resource,
                registry,
                log,
            } => write!(
                f,
                "'{}' holds {:?} but its last log entry has {:?}",
                resource, registry, log
            ),
            Violation::IndexGap { position, index } => {
                write!(f, "entry at position {} carries index {}", position, index)
            }
            Violation::CountMismatch {
                counter,
                recorded,
                observed,
            } => write!(
                f,
                "{} counter is {} but the log shows {}",
                counter, recorded, observed
            ),
            Violation::Unresolved(n) => write!(f, "{} conflicts never resolved", n),
            Violation::MissingEntry { log_index } => {
                write!(f, "resolution points at missing entry {}", log_index)
            }
            Violation::EntryMismatch { log_index } => {
                write!(f, "entry {} is not the resolution's winner", log_index)
            }
            Violation::DuplicateEntry { log_index } => {
                write!(f, "entry {} claimed by more than one resolution", log_index)
            }
            Violation::Unaccounted { index } => {
                write!(f, "resolved entry {} has no recorded resolution", index)
            }
            Violation::WrongWinner {
                log_index,
                recorded,
                expected,
            } => write!(
                f,
                "entry {}: {} won but {} is later",
                log_index, recorded, expected
            ),
        }
    }
}

/// Per-worker activity in the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerActivity {
    /// Direct commits originated by the worker
    pub direct: u64,
    /// Resolver-applied entries originated by the worker
    pub resolved_wins: u64,
}

impl WorkerActivity {
    pub fn total(&self) -> u64 {
        self.direct + self.resolved_wins
    }
}

/// Every applied value of one resource, in append order
#[derive(Debug, Clone)]
pub struct ResourceHistory<'a> {
    pub resource: ResourceName,
    pub entries: Vec<&'a LogEntry>,
}

impl ResourceHistory<'_> {
    /// Values in the order they were applied
    pub fn values(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.operation.value()).collect()
    }
}

/// Audit report
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub total_entries: usize,
    pub direct_commits: u64,
    pub resolutions: u64,
    pub conflicts_detected: u64,
    pub resource_count: usize,
    /// Time between the earliest and latest stamp in the log
    pub span: Option<TimeDelta>,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Audit Report ===")?;
        writeln!(f, "Log entries: {}", self.total_entries)?;
        writeln!(f, "Direct commits: {}", self.direct_commits)?;
        writeln!(f, "Conflicts detected: {}", self.conflicts_detected)?;
        writeln!(f, "Resolutions: {}", self.resolutions)?;
        writeln!(f, "Resources: {}", self.resource_count)?;
        if let Some(span) = self.span {
            writeln!(f, "Span: {}us", span.num_microseconds().unwrap_or(i64::MAX))?;
        }

        if self.is_clean() {
            writeln!(f, "\nNo violations")?;
        } else {
            writeln!(f, "\nViolations ({}):", self.violations.len())?;
            for violation in &self.violations {
                writeln!(f, "  {}", violation)?;
            }
        }
        Ok(())
    }
}

/// Auditor for a ledger snapshot
pub struct Auditor<'a> {
    snapshot: &'a LedgerSnapshot,
}

impl<'a> Auditor<'a> {
    /// Create a new auditor for a snapshot
    pub fn new(snapshot: &'a LedgerSnapshot) -> Self {
        Self { snapshot }
    }

    /// Run every check and collect the results
    pub fn audit(&self) -> AuditReport {
        let stats = self.snapshot.stats();
        let mut violations = self.check_single_value();
        violations.extend(self.check_accounting());
        violations.extend(self.check_resolutions());

        AuditReport {
            total_entries: self.snapshot.len(),
            direct_commits: stats.committed,
            resolutions: stats.resolved,
            conflicts_detected: stats.conflicts_detected,
            resource_count: self.snapshot.registry().len(),
            span: self.span(),
            violations,
        }
    }

    /// Registry value equals the last logged value, for every resource
    pub fn check_single_value(&self) -> Vec<Violation> {
        let mut last: BTreeMap<&ResourceName, &LogEntry> = BTreeMap::new();
        for entry in self.snapshot.entries() {
            last.insert(entry.operation.resource(), entry);
        }

        let mut violations = Vec::new();
        for (resource, entry) in &last {
            let registry = self.snapshot.registry().get(*resource);
            if registry != Some(&entry.operation) {
                violations.push(Violation::ValueMismatch {
                    resource: (*resource).clone(),
                    registry: registry.map(|op| op.value().to_string()),
                    log: Some(entry.operation.value().to_string()),
                });
            }
        }

        for (resource, op) in self.snapshot.registry() {
            if !last.contains_key(resource) {
                violations.push(Violation::ValueMismatch {
                    resource: resource.clone(),
                    registry: Some(op.value().to_string()),
                    log: None,
                });
            }
        }

        violations
    }

    /// Log length and kinds agree with the counters; nothing is left unresolved
    pub fn check_accounting(&self) -> Vec<Violation> {
        let stats = self.snapshot.stats();
        let mut violations = Vec::new();

        for (position, entry) in self.snapshot.entries().iter().enumerate() {
            if entry.index != position {
                violations.push(Violation::IndexGap {
                    position,
                    index: entry.index,
                });
            }
        }

        let direct = self.count_kind(EntryKind::Direct);
        let resolved = self.count_kind(EntryKind::Resolved);
        let counts = [
            ("committed", stats.committed, direct),
            ("resolved", stats.resolved, resolved),
            (
                "resolutions",
                stats.resolved,
                self.snapshot.resolutions().len() as u64,
            ),
        ];
        for (counter, recorded, observed) in counts {
            if recorded != observed {
                violations.push(Violation::CountMismatch {
                    counter,
                    recorded,
                    observed,
                });
            }
        }

        if stats.outstanding() > 0 {
            violations.push(Violation::Unresolved(stats.outstanding()));
        }

        violations
    }

    /// Each resolution is last-write-wins and owns exactly one resolved entry
    pub fn check_resolutions(&self) -> Vec<Violation> {
        let entries = self.snapshot.entries();
        let mut claimed = HashSet::new();
        let mut violations = Vec::new();

        for record in self.snapshot.resolutions() {
            let log_index = record.log_index;
            let resolution = &record.resolution;

            let expected = LastWriteWins.decide(resolution.conflict());
            if resolution.winner() != expected {
                violations.push(Violation::WrongWinner {
                    log_index,
                    recorded: resolution.winner(),
                    expected,
                });
            }

            match entries.get(log_index) {
                None => violations.push(Violation::MissingEntry { log_index }),
                Some(entry) => {
                    if entry.kind != EntryKind::Resolved
                        || &entry.operation != resolution.winning_operation()
                    {
                        violations.push(Violation::EntryMismatch { log_index });
                    }
                }
            }

            if !claimed.insert(log_index) {
                violations.push(Violation::DuplicateEntry { log_index });
            }
        }

        for entry in entries {
            if entry.kind == EntryKind::Resolved && !claimed.contains(&entry.index) {
                violations.push(Violation::Unaccounted { index: entry.index });
            }
        }

        violations
    }

    /// Log entries grouped by originating worker
    pub fn activity_by_worker(&self) -> BTreeMap<WorkerId, WorkerActivity> {
        let mut activity: BTreeMap<WorkerId, WorkerActivity> = BTreeMap::new();
        for entry in self.snapshot.entries() {
            let slot = activity.entry(entry.operation.originator()).or_default();
            match entry.kind {
                EntryKind::Direct => slot.direct += 1,
                EntryKind::Resolved => slot.resolved_wins += 1,
            }
        }
        activity
    }

    /// Applied history of one resource
    pub fn history(&self, resource: &str) -> ResourceHistory<'a> {
        ResourceHistory {
            resource: ResourceName::from(resource),
            entries: self
                .snapshot
                .entries()
                .iter()
                .filter(|e| e.operation.resource().as_str() == resource)
                .collect(),
        }
    }

    /// Time between the earliest and latest stamp in the log
    pub fn span(&self) -> Option<TimeDelta> {
        let mut stamps = self.snapshot.entries().iter().map(|e| e.operation.stamp().at);
        let first = stamps.next()?;
        let (min, max) = stamps.fold((first, first), |(lo, hi), at| (lo.min(at), hi.max(at)));
        Some(max - min)
    }

    fn count_kind(&self, kind: EntryKind) -> u64 {
        self.snapshot
            .entries()
            .iter()
            .filter(|e| e.kind == kind)
            .count() as u64
    }
}
