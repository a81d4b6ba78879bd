//! Worker - Optimistic writer with inline conflict escalation
//!
//! A worker performs a fixed number of write attempts. Each attempt builds a
//! freshly stamped [`Operation`] and offers it to the [`Ledger`]:
//!
//! - committed: nothing more to do
//! - conflicted: pair the reported incumbent with the worker's own operation
//!   and hand the [`Conflict`] to the [`ConflictQueue`]
//!
//! A worker never retries. Escalation to the resolver is final for that
//! attempt. Between attempts it pauses according to its [`Pacing`], which
//! is never done while holding the ledger or queue lock.

use crate::queue::ConflictQueue;
use crate::workload::Workload;
use contend_core::{Conflict, Ledger, Operation, StampClock, WorkerId, WriteOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Bounded random pause between iterations
#[derive(Debug, Clone)]
pub struct Pacing {
    min: Duration,
    max: Duration,
    rng: StdRng,
}

impl Pacing {
    /// No pause at all
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Always pause for exactly `delay`
    pub fn fixed(delay: Duration) -> Self {
        Self::uniform(delay, delay, 0)
    }

    /// Pause for a uniformly random duration in `[min, max]`
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn uniform(min: Duration, max: Duration, seed: u64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw the next pause length
    pub fn next_delay(&mut self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_micros() as u64;
        let max = self.max.as_micros() as u64;
        Duration::from_micros(self.rng.gen_range(min..=max))
    }

    /// Sleep for the next pause length
    pub fn pause(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }
}

/// Counts from one finished worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    /// Attempts committed directly
    pub committed: u64,
    /// Attempts escalated to the resolver
    pub conflicted: u64,
}

impl WorkerReport {
    pub fn attempts(&self) -> u64 {
        self.committed + self.conflicted
    }
}

/// One concurrent writer
pub struct Worker {
    id: WorkerId,
    iterations: usize,
    ledger: Arc<Ledger>,
    queue: Arc<ConflictQueue>,
    clock: Arc<StampClock>,
    workload: Box<dyn Workload>,
    pacing: Pacing,
}

impl Worker {
    /// Create a worker with no pacing
    pub fn new(
        id: WorkerId,
        iterations: usize,
        ledger: Arc<Ledger>,
        queue: Arc<ConflictQueue>,
        clock: Arc<StampClock>,
        workload: Box<dyn Workload>,
    ) -> Self {
        Self {
            id,
            iterations,
            ledger,
            queue,
            clock,
            workload,
            pacing: Pacing::none(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Perform every iteration and report the outcome counts
    pub fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            worker: self.id,
            committed: 0,
            conflicted: 0,
        };

        for iteration in 0..self.iterations {
            if self.attempt(iteration) {
                report.committed += 1;
            } else {
                report.conflicted += 1;
            }

            if iteration + 1 < self.iterations {
                self.pacing.pause();
            }
        }

        trace!(
            worker = %self.id,
            committed = report.committed,
            conflicted = report.conflicted,
            "worker finished"
        );
        report
    }

    /// One write attempt; returns `true` if it committed directly
    fn attempt(&mut self, iteration: usize) -> bool {
        let (resource, value) = self.workload.next_write(self.id, iteration);
        let op = Operation::new(&self.clock, self.id, resource, value);

        match self.ledger.attempt_write(op.clone()) {
            WriteOutcome::Committed { .. } => true,
            WriteOutcome::Conflicted { incumbent } => {
                self.queue.enqueue(Conflict::new(incumbent, op));
                false
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("iterations", &self.iterations)
            .field("pacing", &self.pacing.bounds())
            .finish()
    }
}
