//! Timestamps for operations
//!
//! Provides the ordering used by conflict resolution:
//! - `Stamp` - Wall-clock instant plus a construction sequence number
//! - `StampClock` - Shared, thread-safe source of stamps
//!
//! Stamps are compared by instant first and by sequence number second, so
//! two operations stamped at the same microsecond still have a strict,
//! deterministic order: the one constructed later is greater.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Digits of sub-second precision carried by every stamp (microseconds)
pub const STAMP_PRECISION: u16 = 6;

/// A totally ordered operation timestamp
///
/// The derived ordering compares `at` and then `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Wall-clock instant, microsecond resolution
    pub at: DateTime<Utc>,
    /// Construction order within the issuing clock
    pub seq: u64,
}

impl Stamp {
    /// Create a stamp from its parts
    pub fn new(at: DateTime<Utc>, seq: u64) -> Self {
        Self {
            at: at.trunc_subsecs(STAMP_PRECISION),
            seq,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.at.format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

enum Source {
    /// Wall clock at creation, advanced by a monotonic offset
    System {
        anchor: DateTime<Utc>,
        started: Instant,
    },
    /// Moves only when `advance` is called
    Manual { now: Mutex<DateTime<Utc>> },
}

/// Shared source of operation stamps
///
/// A system clock reads the wall clock once, at creation, and derives every
/// later instant from a monotonic `Instant`, so stamps never go backwards even
/// if the host clock is adjusted mid-run.
///
/// # Example
///
/// ```
/// use contend_core::StampClock;
///
/// let clock = StampClock::system();
/// let a = clock.stamp();
/// let b = clock.stamp();
/// assert!(b > a);
/// assert_eq!(clock.issued(), 2);
/// ```
pub struct StampClock {
    source: Source,
    next_seq: AtomicU64,
}

impl StampClock {
    /// Create a clock anchored to the current wall-clock time
    pub fn system() -> Self {
        Self {
            source: Source::System {
                anchor: Utc::now().trunc_subsecs(STAMP_PRECISION),
                started: Instant::now(),
            },
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a deterministic clock that starts at `start`
    ///
    /// Time only moves through [`StampClock::advance`]; sequence numbers still
    /// increase with every stamp, which keeps ties ordered.
    pub fn manual(start: DateTime<Utc>) -> Self {
        Self {
            source: Source::Manual {
                now: Mutex::new(start.trunc_subsecs(STAMP_PRECISION)),
            },
            next_seq: AtomicU64::new(0),
        }
    }

    /// Current instant of this clock
    pub fn now(&self) -> DateTime<Utc> {
        match &self.source {
            Source::System { anchor, started } => {
                let elapsed = started.elapsed().as_micros();
                let offset = TimeDelta::microseconds(i64::try_from(elapsed).unwrap_or(i64::MAX));
                anchor
                    .checked_add_signed(offset)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            Source::Manual { now } => *now.lock(),
        }
    }

    /// Issue the next stamp
    pub fn stamp(&self) -> Stamp {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Stamp {
            at: self.now(),
            seq,
        }
    }

    /// Move a manual clock forward
    ///
    /// Returns `false` (and does nothing) for a system clock.
    pub fn advance(&self, by: Duration) -> bool {
        match &self.source {
            Source::System { .. } => false,
            Source::Manual { now } => {
                let mut now = now.lock();
                let micros = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
                if let Some(next) = now.checked_add_signed(TimeDelta::microseconds(micros)) {
                    *now = next;
                }
                true
            }
        }
    }

    /// Number of stamps issued so far
    pub fn issued(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Check if this clock only moves when advanced
    pub fn is_manual(&self) -> bool {
        matches!(self.source, Source::Manual { .. })
    }
}

impl Default for StampClock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for StampClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StampClock")
            .field("manual", &self.is_manual())
            .field("now", &self.now())
            .field("issued", &self.issued())
            .finish()
    }
}
