//! Run Configuration - Worker pool size, workload shape, and pacing
//!
//! Everything the coordinator needs to start a run. Configurations can be
//! built in code or loaded from RON:
//!
//! ```ron
//! (
//!     worker_count: 4,
//!     iterations_per_worker: 25,
//!     resource_count: 3,
//!     min_delay_ms: 0,
//!     max_delay_ms: 5,
//! )
//! ```
//!
//! Omitted fields take their defaults.

use crate::error::{Error, Result};
use crate::worker::Pacing;
use crate::workload::worker_seed;
use contend_core::WorkerId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on workers per logical CPU
pub const MAX_WORKERS_PER_CORE: usize = 16;

/// Mixed into the run seed so pacing and workload draw from different streams
const PACING_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Configuration for one coordinated run
///
/// # Example
///
/// ```
/// use contend_hub::RunConfig;
///
/// let config = RunConfig::default()
///     .with_worker_count(4)
///     .with_iterations(20)
///     .with_delay_ms(0, 0);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.expected_attempts(), 80);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent workers (0 is valid and yields an empty log)
    pub worker_count: usize,
    /// Write attempts per worker (0 is valid and yields an empty log)
    pub iterations_per_worker: usize,
    /// Size of the resource name space (`R1..=Rn`)
    pub resource_count: usize,
    /// Size of the value space (`V1..=Vn`)
    pub value_space: usize,
    /// Lower bound of the pause between iterations
    pub min_delay_ms: u64,
    /// Upper bound of the pause between iterations
    pub max_delay_ms: u64,
    /// Base seed for workload and pacing generators
    pub seed: u64,
}

impl RunConfig {
    /// Load a configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: RunConfig = ron::from_str(content)?;
        Ok(config)
    }

    /// Load a configuration from a RON file
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn with_iterations(mut self, n: usize) -> Self {
        self.iterations_per_worker = n;
        self
    }

    pub fn with_resource_count(mut self, n: usize) -> Self {
        self.resource_count = n;
        self
    }

    pub fn with_value_space(mut self, n: usize) -> Self {
        self.value_space = n;
        self
    }

    pub fn with_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.min_delay_ms = min;
        self.max_delay_ms = max;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the configuration is runnable
    ///
    /// Zero workers or zero iterations is valid. An empty resource or value
    /// space is only an error when some write would need to draw from it.
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        if self.expected_attempts() > 0 {
            if self.resource_count == 0 {
                return Err(Error::InvalidConfig(
                    "resource_count must be positive when writes are requested".to_string(),
                ));
            }
            if self.value_space == 0 {
                return Err(Error::InvalidConfig(
                    "value_space must be positive when writes are requested".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Worker count after clamping to `[0, MAX_WORKERS_PER_CORE * max_cores()]`
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.min(MAX_WORKERS_PER_CORE * max_cores())
    }

    /// Total write attempts the run will make, saturating at `usize::MAX`
    pub fn expected_attempts(&self) -> usize {
        self.effective_worker_count().saturating_mul(self.iterations_per_worker)
    }

    /// Inter-iteration pacing for one worker
    pub fn pacing_for(&self, worker: WorkerId) -> Pacing {
        Pacing::uniform(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            worker_seed(self.seed ^ PACING_SALT, worker),
        )
    }
}

impl Default for RunConfig {
    /// One worker per logical CPU, ten iterations each, over five resources
    fn default() -> Self {
        Self {
            worker_count: max_cores(),
            iterations_per_worker: 10,
            resource_count: 5,
            value_space: 10,
            min_delay_ms: 10,
            max_delay_ms: 100,
            seed: 42,
        }
    }
}

/// Get the maximum available cores on this system
///
/// This uses the `num_cpus` crate to detect the number of logical CPUs.
pub fn max_cores() -> usize {
    num_cpus::get()
}
