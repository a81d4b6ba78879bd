//! Resolver - Background actor that settles queued conflicts
//!
//! State machine:
//!
//! ```text
//!            wake signal                    queue empty
//! Waiting ───────────────▶ Draining ─────────────────────▶ Waiting
//!    │                      │    ▲
//!    │ shutdown             └────┘ new conflicts arrived mid-drain
//!    ▼
//! Draining (final) ──▶ Stopped
//! ```
//!
//! Each drained conflict is decided by the [`ResolutionPolicy`] and committed
//! through [`Ledger::apply_resolution`], which bypasses conflict detection.
//! The resolver never holds the queue lock while it holds the ledger lock.
//!
//! Shutdown is an explicit request on the [`ConflictQueue`]. The resolver
//! only stops after a drain that leaves the queue empty with the signal
//! cleared, so no queued conflict is ever abandoned.

use crate::error::{Error, Result};
use crate::queue::{ConflictQueue, Wake};
use contend_core::{Ledger, ResolutionPolicy};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, trace};

/// Name given to the resolver's OS thread
pub const RESOLVER_THREAD_NAME: &str = "contend-resolver";

/// Observable resolver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolverState {
    /// Blocked on the wake signal
    Waiting,
    /// Draining and resolving conflicts
    Draining,
    /// Finished; will not resolve anything else
    Stopped,
}

impl ResolverState {
    fn as_u8(self) -> u8 {
        match self {
            ResolverState::Waiting => 0,
            ResolverState::Draining => 1,
            ResolverState::Stopped => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ResolverState::Waiting,
            1 => ResolverState::Draining,
            _ => ResolverState::Stopped,
        }
    }
}

/// Shared, lock-free view of the resolver's state
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: ResolverState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    fn get(&self) -> ResolverState {
        ResolverState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ResolverState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Counts from a stopped resolver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverReport {
    /// Conflicts resolved and committed
    pub resolved: u64,
    /// Non-empty batches drained
    pub drain_cycles: u64,
    /// Times the resolver left `Waiting`
    pub wakeups: u64,
}

/// The conflict resolver
pub struct Resolver {
    ledger: Arc<Ledger>,
    queue: Arc<ConflictQueue>,
    policy: Arc<dyn ResolutionPolicy>,
    state: StateCell,
}

impl Resolver {
    pub fn new(
        ledger: Arc<Ledger>,
        queue: Arc<ConflictQueue>,
        policy: Arc<dyn ResolutionPolicy>,
    ) -> Self {
        Self {
            ledger,
            queue,
            policy,
            state: StateCell::new(ResolverState::Waiting),
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state.get()
    }

    /// Run the resolver loop on a dedicated thread
    pub fn spawn(self) -> Result<ResolverHandle> {
        let queue = Arc::clone(&self.queue);
        let state = self.state.clone();
        let thread = std::thread::Builder::new()
            .name(RESOLVER_THREAD_NAME.to_string())
            .spawn(move || self.run())?;

        Ok(ResolverHandle {
            queue,
            state,
            thread: Some(thread),
        })
    }

    /// Run the resolver loop on the current thread until shutdown
    pub fn run(&self) -> ResolverReport {
        info!(policy = self.policy.name(), "resolver started");
        let mut report = ResolverReport::default();

        loop {
            self.state.set(ResolverState::Waiting);
            let wake = self.queue.wait_for_work();
            report.wakeups += 1;

            self.state.set(ResolverState::Draining);
            self.drain_until_empty(&mut report);

            if wake == Wake::Shutdown {
                break;
            }
        }

        self.state.set(ResolverState::Stopped);
        info!(
            resolved = report.resolved,
            drain_cycles = report.drain_cycles,
            "resolver stopped"
        );
        report
    }

    /// Drain and resolve until a drain leaves the queue empty and the signal clear
    fn drain_until_empty(&self, report: &mut ResolverReport) {
        loop {
            let batch = self.queue.drain_all();
            if !batch.is_empty() {
                report.drain_cycles += 1;
                trace!(batch = batch.len(), "draining conflicts");

                for conflict in batch {
                    let resolution = self.policy.resolve(conflict);
                    self.ledger.apply_resolution(resolution);
                    report.resolved += 1;
                }
            }

            if self.queue.reset_signal_if_empty() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("policy", &self.policy.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to a resolver running on its own thread
///
/// Dropping the handle without calling [`ResolverHandle::shutdown`] still
/// sends the shutdown request; the thread finishes its final drain detached.
#[derive(Debug)]
pub struct ResolverHandle {
    queue: Arc<ConflictQueue>,
    state: StateCell,
    thread: Option<JoinHandle<ResolverReport>>,
}

impl ResolverHandle {
    pub fn state(&self) -> ResolverState {
        self.state.get()
    }

    /// Check if the resolver thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Send the shutdown request and wait for the final drain to finish
    pub fn shutdown(mut self) -> Result<ResolverReport> {
        self.queue.request_shutdown();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Error::ResolverPanicked),
            None => Ok(ResolverReport::default()),
        }
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        if self.thread.take().is_some() {
            self.queue.request_shutdown();
        }
    }
}
