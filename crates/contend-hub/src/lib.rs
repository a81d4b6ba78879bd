//! Contend Hub - Concurrent workers and an asynchronous conflict resolver
//!
//! This crate runs the concurrency around `contend-core`'s [`Ledger`]:
//!
//! ```text
//! Coordinator (starts and stops everything, touches no shared state)
//!  │
//!  ├── Worker[] ──attempt_write──▶ Ledger (registry + log, one lock)
//!  │     │                            ▲
//!  │     └── on conflict ──enqueue──▶ ConflictQueue (own lock + condvar)
//!  │                                  │ wake
//!  └── Resolver ◀─────drain_all───────┘
//!        └──────apply_resolution─────▶ Ledger
//! ```
//!
//! ## Key Components
//!
//! - [`Coordinator`]: Spawns workers, then shuts the resolver down explicitly
//! - [`Worker`]: Fixed number of optimistic writes, escalating conflicts
//! - [`ConflictQueue`]: Conflicts plus the resolver's level-triggered wake signal
//! - [`Resolver`]: Background thread applying the resolution policy
//! - [`Workload`]: Seam for choosing what each worker writes
//!
//! ## Locking
//!
//! 1. **Ledger and queue locks are never nested** - no thread holds one while
//!    acquiring the other, so the two cannot deadlock
//! 2. **Nobody sleeps under a lock** - worker pacing and resolver waits happen
//!    with no lock held (the condvar releases the queue lock while waiting)

mod config;
mod coordinator;
mod error;
mod queue;
mod resolver;
mod worker;
mod workload;

pub use config::{max_cores, RunConfig, MAX_WORKERS_PER_CORE};
pub use coordinator::{Coordinator, RunReport, WorkloadFactory};
pub use error::{Error, Result};
pub use queue::{ConflictQueue, Wake};
pub use resolver::{Resolver, ResolverHandle, ResolverReport, ResolverState, RESOLVER_THREAD_NAME};
pub use worker::{Pacing, Worker, WorkerReport};
pub use workload::{worker_seed, RandomWorkload, ScriptedWorkload, Workload};

pub use contend_core::Ledger;
