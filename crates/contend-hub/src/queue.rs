//! ConflictQueue - Unbounded conflict queue with a level-triggered wake signal
//!
//! Workers push conflicts; the resolver drains them. The pending conflicts,
//! the wake signal, and the shutdown request all live under one mutex, with
//! a condition variable for the resolver to sleep on. Because the emptiness
//! check in [`ConflictQueue::reset_signal_if_empty`] and the signal set in
//! [`ConflictQueue::enqueue`] run under the same lock, a conflict can never
//! slip in between "queue looked empty" and "signal cleared".
//!
//! This lock is independent of the [`Ledger`](contend_core::Ledger) lock. No
//! method here touches the ledger, and the ledger never touches the queue.
//!
//! # Example
//!
//! ```
//! use contend_core::{Conflict, Operation, StampClock, WorkerId};
//! use contend_hub::{ConflictQueue, Wake};
//!
//! let clock = StampClock::system();
//! let queue = ConflictQueue::new();
//! queue.enqueue(Conflict::new(
//!     Operation::new(&clock, WorkerId(1), "R1", "X"),
//!     Operation::new(&clock, WorkerId(2), "R1", "Y"),
//! ));
//!
//! assert_eq!(queue.wait_for_work(), Wake::Work);
//! assert_eq!(queue.drain_all().len(), 1);
//! assert!(queue.reset_signal_if_empty());
//! assert!(!queue.is_signaled());
//! ```

use contend_core::Conflict;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Why a blocked resolver woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The wake signal is set; there may be conflicts to drain
    Work,
    /// Shutdown was requested and the signal is clear
    Shutdown,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Conflict>,
    signaled: bool,
    shutdown_requested: bool,
    total_enqueued: u64,
}

/// Multi-producer conflict queue paired with the resolver's wake signal
#[derive(Debug, Default)]
pub struct ConflictQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl ConflictQueue {
    /// Create an empty, unsignaled queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a conflict and raise the wake signal
    ///
    /// Never blocks beyond the short queue critical section.
    pub fn enqueue(&self, conflict: Conflict) {
        {
            let mut state = self.state.lock();
            state.pending.push_back(conflict);
            state.signaled = true;
            state.total_enqueued += 1;
        }
        self.wake.notify_one();
    }

    /// Remove and return every queued conflict, oldest first
    ///
    /// Conflicts enqueued after this returns stay queued and keep the wake
    /// signal raised for the next cycle.
    pub fn drain_all(&self) -> Vec<Conflict> {
        self.state.lock().pending.drain(..).collect()
    }

    /// Clear the wake signal if nothing is queued
    ///
    /// Returns `true` if the queue was empty and the signal is now clear.
    pub fn reset_signal_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            state.signaled = false;
            true
        } else {
            false
        }
    }

    /// Block until the wake signal is raised or shutdown is requested
    ///
    /// A raised signal takes priority over shutdown, so queued work is always
    /// reported before the shutdown that follows it.
    pub fn wait_for_work(&self) -> Wake {
        let mut state = self.state.lock();
        while !state.signaled && !state.shutdown_requested {
            self.wake.wait(&mut state);
        }
        if state.signaled {
            Wake::Work
        } else {
            Wake::Shutdown
        }
    }

    /// Ask the resolver to stop once the queue is drained
    pub fn request_shutdown(&self) {
        self.state.lock().shutdown_requested = true;
        self.wake.notify_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state.lock().shutdown_requested
    }

    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Number of conflicts currently queued
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Number of conflicts ever enqueued
    pub fn total_enqueued(&self) -> u64 {
        self.state.lock().total_enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contend_core::{Operation, StampClock, WorkerId};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn conflict(clock: &StampClock, n: u64) -> Conflict {
        Conflict::new(
            Operation::new(clock, WorkerId(0), "R1", "X"),
            Operation::new(clock, WorkerId(n), "R1", format!("V{}", n)),
        )
    }

    #[test]
    fn test_new_queue_is_empty_and_unsignaled() {
        let queue = ConflictQueue::new();
        assert!(queue.is_empty());
        assert!(!queue.is_signaled());
        assert!(!queue.is_shutdown_requested());
        assert_eq!(queue.total_enqueued(), 0);
    }

    #[test]
    fn test_enqueue_raises_signal() {
        let clock = StampClock::system();
        let queue = ConflictQueue::new();
        queue.enqueue(conflict(&clock, 1));
        assert!(queue.is_signaled());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_enqueued(), 1);
    }

    #[test]
    fn test_drain_all_preserves_order() {
        let clock = StampClock::system();
        let queue = ConflictQueue::new();
        for n in 1..=3 {
            queue.enqueue(conflict(&clock, n));
        }

        let drained = queue.drain_all();
        let values: Vec<_> = drained.iter().map(|c| c.challenger().value()).collect();
        assert_eq!(values, vec!["V1", "V2", "V3"]);
        assert!(queue.is_empty());
        // Draining does not touch the signal.
        assert!(queue.is_signaled());
    }

    #[test]
    fn test_reset_signal_only_when_empty() {
        let clock = StampClock::system();
        let queue = ConflictQueue::new();
        queue.enqueue(conflict(&clock, 1));

        assert!(!queue.reset_signal_if_empty());
        assert!(queue.is_signaled());

        queue.drain_all();
        assert!(queue.reset_signal_if_empty());
        assert!(!queue.is_signaled());
    }

    #[test]
    fn test_signal_wins_over_shutdown() {
        let clock = StampClock::system();
        let queue = ConflictQueue::new();
        queue.enqueue(conflict(&clock, 1));
        queue.request_shutdown();

        assert_eq!(queue.wait_for_work(), Wake::Work);
        queue.drain_all();
        queue.reset_signal_if_empty();
        assert_eq!(queue.wait_for_work(), Wake::Shutdown);
    }

    #[test]
    fn test_enqueue_wakes_blocked_waiter() {
        let clock = Arc::new(StampClock::system());
        let queue = Arc::new(ConflictQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_work())
        };

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(conflict(&clock, 1));
        assert_eq!(waiter.join().unwrap(), Wake::Work);
    }

    #[test]
    fn test_shutdown_wakes_blocked_waiter() {
        let queue = Arc::new(ConflictQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_work())
        };

        thread::sleep(Duration::from_millis(20));
        queue.request_shutdown();
        assert_eq!(waiter.join().unwrap(), Wake::Shutdown);
    }

    #[test]
    fn test_no_conflict_lost_between_drain_and_reset() {
        let clock = Arc::new(StampClock::system());
        let queue = Arc::new(ConflictQueue::new());
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 500;

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = 0u64;
                loop {
                    let wake = queue.wait_for_work();
                    loop {
                        seen += queue.drain_all().len() as u64;
                        if queue.reset_signal_if_empty() {
                            break;
                        }
                    }
                    if wake == Wake::Shutdown {
                        return seen;
                    }
                }
            })
        };

        thread::scope(|scope| {
            for p in 0..PRODUCERS {
                let clock = Arc::clone(&clock);
                let queue = Arc::clone(&queue);
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue(conflict(&clock, p * PER_PRODUCER + i));
                    }
                });
            }
        });

        queue.request_shutdown();
        assert_eq!(consumer.join().unwrap(), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
        assert_eq!(queue.total_enqueued(), PRODUCERS * PER_PRODUCER);
    }
}
