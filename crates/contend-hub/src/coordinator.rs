//! Coordinator - Starts the workers and the resolver, then shuts them down
//!
//! Flow of [`Coordinator::run`]:
//! 1. Validate the [`RunConfig`]
//! 2. Create the shared ledger and conflict queue
//! 3. Spawn the resolver thread
//! 4. Spawn the workers in a thread scope and join all of them
//! 5. Send the resolver its shutdown request and join it
//! 6. Snapshot the quiesced ledger
//!
//! The coordinator itself never touches the ledger or queue contents.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::queue::ConflictQueue;
use crate::resolver::{Resolver, ResolverReport};
use crate::worker::{Worker, WorkerReport};
use crate::workload::{RandomWorkload, Workload};
use contend_core::{
    LastWriteWins, Ledger, LedgerSnapshot, LogEntry, ResolutionPolicy, StampClock, WorkerId,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Builds the workload for each worker
pub type WorkloadFactory = dyn Fn(WorkerId) -> Box<dyn Workload> + Send + Sync;

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The quiesced ledger: registry, log, and resolutions
    pub snapshot: LedgerSnapshot,
    /// One report per worker, ordered by worker id
    pub workers: Vec<WorkerReport>,
    pub resolver: ResolverReport,
    /// Conflicts handed to the queue over the whole run
    pub conflicts_enqueued: u64,
    /// Wall time from first spawn to resolver stop
    pub elapsed: Duration,
}

impl RunReport {
    /// Log entries in append order
    pub fn log(&self) -> &[LogEntry] {
        self.snapshot.entries()
    }

    pub fn total_attempts(&self) -> u64 {
        self.workers.iter().map(|w| w.attempts()).sum()
    }

    pub fn total_committed(&self) -> u64 {
        self.workers.iter().map(|w| w.committed).sum()
    }

    pub fn total_conflicted(&self) -> u64 {
        self.workers.iter().map(|w| w.conflicted).sum()
    }
}

/// Owns the configuration of a run and drives it
///
/// # Example
///
/// ```
/// use contend_hub::{Coordinator, RunConfig};
///
/// let config = RunConfig::default()
///     .with_worker_count(3)
///     .with_iterations(10)
///     .with_delay_ms(0, 1);
/// let report = Coordinator::new(config).run().unwrap();
///
/// assert_eq!(report.total_attempts(), 30);
/// assert_eq!(
///     report.log().len() as u64,
///     report.total_committed() + report.resolver.resolved
/// );
/// ```
pub struct Coordinator {
    config: RunConfig,
    workloads: Box<WorkloadFactory>,
    policy: Arc<dyn ResolutionPolicy>,
    clock: Arc<StampClock>,
}

impl Coordinator {
    /// Create a coordinator with random workloads drawn from the config
    pub fn new(config: RunConfig) -> Self {
        let seed = config.seed;
        let resource_count = config.resource_count;
        let value_space = config.value_space;
        Self::with_workloads(config, move |worker| {
            Box::new(RandomWorkload::new(seed, worker, resource_count, value_space))
        })
    }

    /// Create a coordinator with a custom workload per worker
    pub fn with_workloads<F>(config: RunConfig, workloads: F) -> Self
    where
        F: Fn(WorkerId) -> Box<dyn Workload> + Send + Sync + 'static,
    {
        Self {
            config,
            workloads: Box::new(workloads),
            policy: Arc::new(LastWriteWins),
            clock: Arc::new(StampClock::system()),
        }
    }

    pub fn with_policy(mut self, policy: impl ResolutionPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_clock(mut self, clock: StampClock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one run to quiescence
    pub fn run(&self) -> Result<RunReport> {
        self.config.validate()?;

        let started = Instant::now();
        let ledger = Arc::new(Ledger::new());
        let queue = Arc::new(ConflictQueue::new());
        let resolver = Resolver::new(
            Arc::clone(&ledger),
            Arc::clone(&queue),
            Arc::clone(&self.policy),
        )
        .spawn()?;

        let worker_count = self.config.effective_worker_count();
        info!(
            workers = worker_count,
            iterations = self.config.iterations_per_worker,
            policy = self.policy.name(),
            "run started"
        );

        let workers = self.run_workers(worker_count, &ledger, &queue);

        // Workers are done (or dead); the resolver still gets its final drain.
        let resolver = resolver.shutdown();
        let workers = workers?;
        let resolver = resolver?;

        let abandoned = queue.len();
        if abandoned > 0 {
            return Err(Error::AbandonedConflicts(abandoned));
        }

        let snapshot = ledger.snapshot();
        let report = RunReport {
            snapshot,
            workers,
            resolver,
            conflicts_enqueued: queue.total_enqueued(),
            elapsed: started.elapsed(),
        };

        info!(
            entries = report.log().len(),
            committed = report.total_committed(),
            resolved = report.resolver.resolved,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    /// Spawn every worker in a scope and join them in id order
    fn run_workers(
        &self,
        worker_count: usize,
        ledger: &Arc<Ledger>,
        queue: &Arc<ConflictQueue>,
    ) -> Result<Vec<WorkerReport>> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(worker_count);
            for index in 0..worker_count {
                let id = WorkerId(index as u64 + 1);
                let worker = Worker::new(
                    id,
                    self.config.iterations_per_worker,
                    Arc::clone(ledger),
                    Arc::clone(queue),
                    Arc::clone(&self.clock),
                    (self.workloads)(id),
                )
                .with_pacing(self.config.pacing_for(id));

                let handle = thread::Builder::new()
                    .name(format!("contend-{}", id))
                    .spawn_scoped(scope, move || worker.run())?;
                handles.push((id, handle));
            }

            let mut reports = Vec::with_capacity(handles.len());
            let mut panicked = None;
            for (id, handle) in handles {
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => {
                        warn!(worker = %id, "worker panicked");
                        panicked.get_or_insert(id);
                    }
                }
            }

            match panicked {
                Some(id) => Err(Error::WorkerPanicked(id)),
                None => Ok(reports),
            }
        })
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::ScriptedWorkload;
    use contend_core::{EntryKind, ResourceName};
    use contend_journal::Auditor;
    use std::sync::Barrier;

    fn quick(workers: usize, iterations: usize) -> RunConfig {
        RunConfig::default()
            .with_worker_count(workers)
            .with_iterations(iterations)
            .with_delay_ms(0, 0)
    }

    fn write(resource: &str, value: &str) -> (ResourceName, String) {
        (ResourceName::from(resource), value.to_string())
    }

    #[test]
    fn test_zero_workers_yields_empty_log() {
        let report = Coordinator::new(quick(0, 10)).run().unwrap();
        assert!(report.log().is_empty());
        assert!(report.workers.is_empty());
        assert_eq!(report.resolver.resolved, 0);
    }

    #[test]
    fn test_zero_iterations_yields_empty_log() {
        let report = Coordinator::new(quick(4, 0)).run().unwrap();
        assert!(report.log().is_empty());
        assert_eq!(report.workers.len(), 4);
        assert_eq!(report.total_attempts(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let config = quick(2, 2).with_resource_count(0);
        assert!(matches!(
            Coordinator::new(config).run(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_two_worker_collision_resolves_to_later_write() {
        // worker-1 commits R1 = X, then both meet at the barrier; worker-2's
        // Y is stamped after the barrier and collides with X.
        let barrier = Arc::new(Barrier::new(2));
        let coordinator = Coordinator::with_workloads(quick(2, 2), move |worker| {
            let barrier = Arc::clone(&barrier);
            let workload: Box<dyn Workload> = if worker == WorkerId(1) {
                Box::new(move |_: WorkerId, i: usize| {
                    if i == 0 {
                        write("R1", "X")
                    } else {
                        barrier.wait();
                        write("R2", "Z")
                    }
                })
            } else {
                Box::new(move |_: WorkerId, i: usize| {
                    if i == 0 {
                        barrier.wait();
                        write("R1", "Y")
                    } else {
                        write("R3", "W")
                    }
                })
            };
            workload
        });

        let report = coordinator.run().unwrap();
        assert_eq!(report.conflicts_enqueued, 1);
        assert_eq!(report.resolver.resolved, 1);
        assert_eq!(report.snapshot.value("R1"), Some("Y"));

        let r1: Vec<_> = report
            .log()
            .iter()
            .filter(|e| e.operation.resource().as_str() == "R1")
            .collect();
        assert_eq!(r1.len(), 2);
        assert_eq!(r1[0].operation.value(), "X");
        assert_eq!(r1[0].kind, EntryKind::Direct);
        assert_eq!(r1[0].operation.originator(), WorkerId(1));
        assert_eq!(r1[1].operation.value(), "Y");
        assert_eq!(r1[1].kind, EntryKind::Resolved);
        assert_eq!(r1[1].operation.originator(), WorkerId(2));
        assert!(r1[0].index < r1[1].index);

        let resolution = &report.snapshot.resolutions()[0].resolution;
        assert_eq!(resolution.conflict().incumbent().value(), "X");
        assert_eq!(resolution.conflict().challenger().value(), "Y");
        assert!(Auditor::new(&report.snapshot).audit().is_clean());
    }

    #[test]
    fn test_contended_run_satisfies_audit() {
        let config = quick(8, 200).with_resource_count(3).with_value_space(4);
        let report = Coordinator::new(config).run().unwrap();

        assert_eq!(report.total_attempts(), 8 * 200);
        assert_eq!(report.conflicts_enqueued, report.total_conflicted());
        assert_eq!(report.resolver.resolved, report.conflicts_enqueued);
        assert_eq!(
            report.log().len() as u64,
            report.total_committed() + report.resolver.resolved
        );

        let audit = Auditor::new(&report.snapshot).audit();
        assert!(audit.is_clean(), "audit failed: {}", audit);
    }

    #[test]
    fn test_paced_run_satisfies_audit() {
        let config = quick(4, 15)
            .with_resource_count(2)
            .with_value_space(3)
            .with_delay_ms(0, 2);
        let report = Coordinator::new(config).run().unwrap();
        assert!(Auditor::new(&report.snapshot).audit().is_clean());
    }

    #[test]
    fn test_single_value_run_is_reproducible() {
        // One value per resource means every write commits, so the log order
        // is exactly the worker's draw order.
        let config = quick(1, 50).with_seed(9).with_value_space(1);
        let values = |report: RunReport| -> Vec<String> {
            assert_eq!(report.total_conflicted(), 0);
            report
                .log()
                .iter()
                .map(|e| format!("{}={}", e.operation.resource(), e.operation.value()))
                .collect()
        };
        let a = values(Coordinator::new(config.clone()).run().unwrap());
        let b = values(Coordinator::new(config).run().unwrap());
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_scripted_workers_log_every_attempt() {
        let coordinator = Coordinator::with_workloads(quick(3, 4), |worker| {
            let resource = format!("R{}", worker.raw());
            Box::new(ScriptedWorkload::new([(resource, "A")]).unwrap())
        });
        let report = coordinator.run().unwrap();
        assert_eq!(report.log().len(), 12);
        assert_eq!(report.total_conflicted(), 0);
        for worker in &report.workers {
            assert_eq!(report.snapshot.entries_by(worker.worker).count(), 4);
        }
    }

    #[test]
    fn test_worker_panic_is_reported_after_resolver_drains() {
        let coordinator = Coordinator::with_workloads(quick(2, 3), |worker| {
            Box::new(move |_: WorkerId, i: usize| {
                if worker == WorkerId(2) && i == 1 {
                    panic!("workload exploded");
                }
                write("R1", &format!("{}-{}", worker, i))
            })
        });

        match coordinator.run() {
            Err(Error::WorkerPanicked(id)) => assert_eq!(id, WorkerId(2)),
            other => panic!("Expected WorkerPanicked, got {:?}", other.map(|r| r.log().len())),
        }
    }

    #[test]
    fn test_manual_clock_is_used_for_stamps() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let report = Coordinator::new(quick(2, 5))
            .with_clock(StampClock::manual(start))
            .run()
            .unwrap();
        assert!(report.log().iter().all(|e| e.operation.stamp().at == start));
    }
}
