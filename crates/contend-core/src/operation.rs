//! Operation and conflict records
//!
//! Both types are immutable once built: fields are private and only exposed
//! through getters. They are moved between workers, the conflict queue, and
//! the resolver, but never mutated.

use crate::{Error, ResourceName, Result, Stamp, StampClock, WorkerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One proposed or applied write
///
/// Renders as `[<timestamp>] <originator> set <resource> = <value>`, the line
/// format of the operation log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    stamp: Stamp,
    originator: WorkerId,
    resource: ResourceName,
    value: String,
}

impl Operation {
    /// Create an operation stamped by `clock`
    pub fn new(
        clock: &StampClock,
        originator: WorkerId,
        resource: impl Into<ResourceName>,
        value: impl Into<String>,
    ) -> Self {
        Self::with_stamp(clock.stamp(), originator, resource, value)
    }

    /// Create an operation with an explicit stamp
    pub fn with_stamp(
        stamp: Stamp,
        originator: WorkerId,
        resource: impl Into<ResourceName>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            stamp,
            originator,
            resource: resource.into(),
            value: value.into(),
        }
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub fn originator(&self) -> WorkerId {
        self.originator
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check if this operation is ordered strictly after `other`
    pub fn supersedes(&self, other: &Operation) -> bool {
        self.stamp > other.stamp
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} set {} = {}",
            self.stamp, self.originator, self.resource, self.value
        )
    }
}

/// Two competing operations on the same resource
///
/// - `incumbent`: the applied operation the challenger found in the registry
/// - `challenger`: the operation whose write attempt observed the mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    resource: ResourceName,
    incumbent: Operation,
    challenger: Operation,
}

impl Conflict {
    /// Pair an incumbent with the challenger that collided with it
    ///
    /// # Panics
    ///
    /// Debug builds panic if the two operations target different resources.
    /// Use [`Conflict::try_new`] when the pairing is not already known to be valid.
    pub fn new(incumbent: Operation, challenger: Operation) -> Self {
        debug_assert_eq!(
            incumbent.resource(),
            challenger.resource(),
            "conflicting operations must target the same resource"
        );
        Self {
            resource: challenger.resource.clone(),
            incumbent,
            challenger,
        }
    }

    /// Pair two operations, rejecting operations on different resources
    pub fn try_new(incumbent: Operation, challenger: Operation) -> Result<Self> {
        if incumbent.resource() != challenger.resource() {
            return Err(Error::ResourceMismatch {
                incumbent: incumbent.resource.clone(),
                challenger: challenger.resource.clone(),
            });
        }
        Ok(Self::new(incumbent, challenger))
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn incumbent(&self) -> &Operation {
        &self.incumbent
    }

    pub fn challenger(&self) -> &Operation {
        &self.challenger
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conflict on '{}': {} holds '{}' @ {}, {} proposed '{}' @ {}",
            self.resource,
            self.incumbent.originator,
            self.incumbent.value,
            self.incumbent.stamp,
            self.challenger.originator,
            self.challenger.value,
            self.challenger.stamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stamp(micros: i64, seq: u64) -> Stamp {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Stamp::new(base + chrono::TimeDelta::microseconds(micros), seq)
    }

    #[test]
    fn test_operation_display() {
        let op = Operation::with_stamp(stamp(500, 0), WorkerId(2), "R1", "X");
        assert_eq!(
            op.to_string(),
            "[2024-05-01T12:00:00.000500Z] worker-2 set R1 = X"
        );
    }

    #[test]
    fn test_operation_from_clock() {
        let clock = StampClock::manual(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let a = Operation::new(&clock, WorkerId(1), "R1", "X");
        let b = Operation::new(&clock, WorkerId(1), "R1", "Y");
        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
        assert_eq!(a.value(), "X");
        assert_eq!(a.resource().as_str(), "R1");
        assert_eq!(a.originator(), WorkerId(1));
    }

    #[test]
    fn test_conflict_takes_resource_from_operations() {
        let incumbent = Operation::with_stamp(stamp(1, 0), WorkerId(1), "R1", "X");
        let challenger = Operation::with_stamp(stamp(2, 1), WorkerId(2), "R1", "Y");
        let conflict = Conflict::new(incumbent.clone(), challenger.clone());
        assert_eq!(conflict.resource().as_str(), "R1");
        assert_eq!(conflict.incumbent(), &incumbent);
        assert_eq!(conflict.challenger(), &challenger);
    }

    #[test]
    fn test_try_new_rejects_mismatched_resources() {
        let incumbent = Operation::with_stamp(stamp(1, 0), WorkerId(1), "R1", "X");
        let challenger = Operation::with_stamp(stamp(2, 1), WorkerId(2), "R2", "Y");
        let err = Conflict::try_new(incumbent, challenger).unwrap_err();
        assert!(matches!(err, Error::ResourceMismatch { .. }));
        assert!(err.to_string().contains("R2"));
    }

    #[test]
    fn test_conflict_display() {
        let conflict = Conflict::new(
            Operation::with_stamp(stamp(1, 0), WorkerId(1), "R1", "X"),
            Operation::with_stamp(stamp(2, 1), WorkerId(2), "R1", "Y"),
        );
        let display = conflict.to_string();
        assert!(display.contains("R1"));
        assert!(display.contains("worker-1"));
        assert!(display.contains("worker-2"));
    }
}
