//! Workload - Where workers get the resource and value to write next
//!
//! The choice of resource and value is irrelevant to correctness, so it sits
//! behind the [`Workload`] trait. Two implementations are provided:
//!
//! - [`RandomWorkload`]: uniform picks from `R1..=Rn` and `V1..=Vm`
//! - [`ScriptedWorkload`]: a fixed sequence, cycled
//!
//! Any `FnMut(WorkerId, usize) -> (ResourceName, String)` closure is also a
//! workload.
//!
//! # Deterministic seeding
//!
//! Each worker's generator is seeded from `worker_seed(base_seed, worker)`, so
//! the sequence a worker draws depends only on the run seed and its id, not
//! on thread scheduling.

use crate::error::{Error, Result};
use contend_core::{ResourceName, WorkerId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the next write for a worker
pub trait Workload: Send {
    /// Pick the resource and value for `iteration` of `worker`
    fn next_write(&mut self, worker: WorkerId, iteration: usize) -> (ResourceName, String);
}

impl<F> Workload for F
where
    F: FnMut(WorkerId, usize) -> (ResourceName, String) + Send,
{
    fn next_write(&mut self, worker: WorkerId, iteration: usize) -> (ResourceName, String) {
        self(worker, iteration)
    }
}

/// Derive a per-worker seed from a base seed (splitmix64 finalizer)
pub fn worker_seed(base_seed: u64, worker: WorkerId) -> u64 {
    let mut z = base_seed
        .wrapping_add(worker.raw().wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Uniformly random resource and value picks
#[derive(Debug, Clone)]
pub struct RandomWorkload {
    rng: StdRng,
    resource_count: usize,
    value_space: usize,
}

impl RandomWorkload {
    /// Create a generator for one worker
    ///
    /// Both spaces are raised to at least one element.
    pub fn new(
        base_seed: u64,
        worker: WorkerId,
        resource_count: usize,
        value_space: usize,
    ) -> Self {
        Self {
            rng: StdRng::seed_from_u64(worker_seed(base_seed, worker)),
            resource_count: resource_count.max(1),
            value_space: value_space.max(1),
        }
    }
}

impl Workload for RandomWorkload {
    fn next_write(&mut self, _worker: WorkerId, _iteration: usize) -> (ResourceName, String) {
        let resource = self.rng.gen_range(1..=self.resource_count);
        let value = self.rng.gen_range(1..=self.value_space);
        (ResourceName::new(format!("R{}", resource)), format!("V{}", value))
    }
}

/// A fixed sequence of writes, repeated from the start when exhausted
#[derive(Debug, Clone)]
pub struct ScriptedWorkload {
    script: Vec<(ResourceName, String)>,
}

impl ScriptedWorkload {
    /// Create a scripted workload; the script must not be empty
    pub fn new<R, V>(script: impl IntoIterator<Item = (R, V)>) -> Result<Self>
    where
        R: Into<ResourceName>,
        V: Into<String>,
    {
        let script: Vec<_> = script
            .into_iter()
            .map(|(resource, value)| (resource.into(), value.into()))
            .collect();
        if script.is_empty() {
            return Err(Error::InvalidConfig(
                "scripted workload needs at least one write".to_string(),
            ));
        }
        Ok(Self { script })
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl Workload for ScriptedWorkload {
    fn next_write(&mut self, _worker: WorkerId, iteration: usize) -> (ResourceName, String) {
        self.script[iteration % self.script.len()].clone()
    }
}
