//! Contend Journal - Export and audit of a finished run
//!
//! This crate reads a `contend-core` [`LedgerSnapshot`] and provides:
//!
//! - **Exporter**: Render the operation log as text, RON, JSON, or CSV
//! - **Auditor**: Check the registry, log, and resolutions against each other
//!
//! # Example
//!
//! ```
//! use contend_core::{Ledger, Operation, StampClock, WorkerId};
//! use contend_journal::{Auditor, ExportFormat, Exporter};
//!
//! let clock = StampClock::system();
//! let ledger = Ledger::new();
//! ledger.attempt_write(Operation::new(&clock, WorkerId(1), "R1", "X"));
//! ledger.attempt_write(Operation::new(&clock, WorkerId(2), "R2", "Y"));
//!
//! let snapshot = ledger.snapshot();
//! assert!(Auditor::new(&snapshot).audit().is_clean());
//!
//! let text = Exporter::new(&snapshot).export(ExportFormat::Text).unwrap();
//! assert_eq!(text.lines().count(), 2);
//! assert!(text.lines().next().unwrap().ends_with("worker-1 set R1 = X"));
//! ```

mod auditor;
mod error;
mod exporter;

pub use auditor::{AuditReport, Auditor, ResourceHistory, Violation, WorkerActivity};
pub use error::{Error, Result};
pub use exporter::{ExportFormat, Exporter};

// Re-export the snapshot types the journal works on
pub use contend_core::{EntryKind, LedgerSnapshot, LedgerStats, LogEntry, ResolvedConflict};
