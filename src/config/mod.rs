//! # Batcher Configuration System
//!
//! Typed, validated configuration for the batching core. Values are layered by
//! [`ConfigManager`]: built-in defaults, then optional YAML files, then
//! `BATCHER__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use request_batcher::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_batch_size = manager.config().scheduler.max_batch_size;
//! let max_wait = manager.config().scheduler.max_wait();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{adaptive, execution, metrics, scheduler};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `batcher.yaml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Batch formation thresholds (mutated at runtime by the adaptive controller)
    pub scheduler: SchedulerConfig,

    /// Adaptive controller bounds and thresholds
    pub adaptive: AdaptiveConfig,

    /// Admission queue bounds
    pub queue: QueueConfig,

    /// Downstream execution settings
    pub execution: ExecutionConfig,

    /// Metrics retention
    pub metrics: MetricsConfig,
}

/// Thresholds read by the scheduler on every tick
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on items per batch
    pub max_batch_size: usize,
    /// Batches smaller than this wait until the oldest item reaches `max_wait_ms`
    pub min_batch_size: usize,
    /// Latency ceiling for the oldest pending item
    pub max_wait_ms: u64,
    /// Sort by priority (descending) before truncating to `max_batch_size`
    pub priority_enabled: bool,
    /// Batches allowed to execute at once
    pub max_in_flight_batches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: scheduler::DEFAULT_MAX_BATCH_SIZE,
            min_batch_size: scheduler::DEFAULT_MIN_BATCH_SIZE,
            max_wait_ms: scheduler::DEFAULT_MAX_WAIT_MS,
            priority_enabled: true,
            max_in_flight_batches: scheduler::DEFAULT_MAX_IN_FLIGHT_BATCHES,
        }
    }
}

impl SchedulerConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub window_size: usize,
    pub sample_interval_ms: u64,
    pub high_depth_threshold: f64,
    pub low_depth_threshold: f64,
    pub min_batch_size_floor: usize,
    pub max_batch_size_ceiling: usize,
    pub min_wait_ms_floor: u64,
    pub max_wait_ms_ceiling: u64,
    pub wait_step_ms: u64,
    pub batch_size_step: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: adaptive::DEFAULT_WINDOW_SIZE,
            sample_interval_ms: adaptive::DEFAULT_SAMPLE_INTERVAL_MS,
            high_depth_threshold: adaptive::DEFAULT_HIGH_DEPTH_THRESHOLD,
            low_depth_threshold: adaptive::DEFAULT_LOW_DEPTH_THRESHOLD,
            min_batch_size_floor: adaptive::DEFAULT_MIN_BATCH_SIZE_FLOOR,
            max_batch_size_ceiling: adaptive::DEFAULT_MAX_BATCH_SIZE_CEILING,
            min_wait_ms_floor: adaptive::DEFAULT_MIN_WAIT_MS_FLOOR,
            max_wait_ms_ceiling: adaptive::DEFAULT_MAX_WAIT_MS_CEILING,
            wait_step_ms: adaptive::DEFAULT_WAIT_STEP_MS,
            batch_size_step: adaptive::DEFAULT_BATCH_SIZE_STEP,
        }
    }
}

impl AdaptiveConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Behavior when a bounded queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the submission with `QueueFull`
    #[default]
    Reject,
    /// Suspend the producer until an item leaves the queue
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum pending items; `None` means unbounded
    pub capacity: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    /// Depth that wakes the scheduler early; defaults to, and never exceeds, the
    /// current `min_batch_size`
    pub high_water_mark: Option<usize>,
}

/// What `stop` does with items still in the admission queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Execute remaining items in final batches
    #[default]
    Drain,
    /// Fail remaining items with a shutdown error
    FailPending,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Baseline latency of a single unbatched call, for cost-saved estimates
    pub estimated_single_call_ms: f64,
    /// Upper bound on one downstream batch call
    pub batch_timeout_ms: Option<u64>,
    pub shutdown_policy: ShutdownPolicy,
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            estimated_single_call_ms: execution::DEFAULT_ESTIMATED_SINGLE_CALL_MS,
            batch_timeout_ms: None,
            shutdown_policy: ShutdownPolicy::Drain,
            shutdown_timeout_ms: execution::DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ExecutionConfig {
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub load_sample_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            load_sample_capacity: metrics::DEFAULT_LOAD_SAMPLE_CAPACITY,
        }
    }
}

impl BatcherConfig {
    /// Validate all sections, returning the first violation found
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.scheduler;
        if s.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_batch_size",
                "must be at least 1",
            ));
        }
        if s.min_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.min_batch_size",
                "must be at least 1",
            ));
        }
        if s.min_batch_size > s.max_batch_size {
            return Err(ConfigurationError::invalid_value(
                "scheduler.min_batch_size",
                format!(
                    "{} exceeds max_batch_size {}",
                    s.min_batch_size, s.max_batch_size
                ),
            ));
        }
        if s.max_in_flight_batches == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_in_flight_batches",
                "must be at least 1",
            ));
        }

        let a = &self.adaptive;
        if a.window_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "adaptive.window_size",
                "must be at least 1",
            ));
        }
        if a.sample_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "adaptive.sample_interval_ms",
                "must be at least 1",
            ));
        }
        if a.low_depth_threshold >= a.high_depth_threshold {
            return Err(ConfigurationError::invalid_value(
                "adaptive.low_depth_threshold",
                "must be below high_depth_threshold",
            ));
        }
        if a.min_batch_size_floor == 0 || a.min_batch_size_floor > a.max_batch_size_ceiling {
            return Err(ConfigurationError::invalid_value(
                "adaptive.min_batch_size_floor",
                "must be between 1 and max_batch_size_ceiling",
            ));
        }
        if a.min_wait_ms_floor > a.max_wait_ms_ceiling {
            return Err(ConfigurationError::invalid_value(
                "adaptive.min_wait_ms_floor",
                "must not exceed max_wait_ms_ceiling",
            ));
        }

        if let Some(capacity) = self.queue.capacity {
            let largest_batch = if a.enabled {
                a.max_batch_size_ceiling.max(s.max_batch_size)
            } else {
                s.max_batch_size
            };
            if capacity < largest_batch {
                return Err(ConfigurationError::invalid_value(
                    "queue.capacity",
                    format!("{capacity} is smaller than the largest batch size {largest_batch}"),
                ));
            }
        }

        if self.execution.estimated_single_call_ms <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "execution.estimated_single_call_ms",
                "must be positive",
            ));
        }
        if self.metrics.load_sample_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "metrics.load_sample_capacity",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Scheduler thresholds clamped into the adaptive bounds
    pub fn initial_scheduler_config(&self) -> SchedulerConfig {
        let mut scheduler = self.scheduler;
        if self.adaptive.enabled {
            let a = &self.adaptive;
            scheduler.max_batch_size = scheduler
                .max_batch_size
                .clamp(a.min_batch_size_floor, a.max_batch_size_ceiling);
            scheduler.max_wait_ms = scheduler
                .max_wait_ms
                .clamp(a.min_wait_ms_floor, a.max_wait_ms_ceiling);
            scheduler.min_batch_size = scheduler.min_batch_size.min(scheduler.max_batch_size);
        }
        scheduler
    }
}
