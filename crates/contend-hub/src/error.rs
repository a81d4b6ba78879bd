//! Error types for contend-hub
//!
//! Contention is not an error: a conflicted write is queued for the
//! resolver and reported through `WorkerReport`, never through `Error`.

use contend_core::WorkerId;
use thiserror::Error;

/// Result type for contend-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in contend-hub
#[derive(Debug, Error)]
pub enum Error {
    /// Run configuration failed validation
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    /// Run configuration could not be parsed
    #[error("config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Reading a config file or spawning a thread failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The resolver thread panicked before it could stop cleanly
    #[error("resolver thread panicked")]
    ResolverPanicked,

    /// A worker thread panicked
    #[error("{0} panicked")]
    WorkerPanicked(WorkerId),

    /// Conflicts were still queued after the resolver stopped
    ///
    /// The resolver drains until empty before stopping, so this indicates a
    /// broken shutdown sequence rather than a runtime condition.
    #[error("{} left unresolved after resolver shutdown", Self::format_conflict_count(*.0))]
    AbandonedConflicts(usize),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] contend_core::Error),
}

impl Error {
    /// Format conflict count with proper pluralization
    fn format_conflict_count(count: usize) -> String {
        if count == 1 {
            "1 conflict".to_string()
        } else {
            format!("{} conflicts", count)
        }
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
