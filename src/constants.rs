//! # System Constants
//!
//! Default operating boundaries for the batching core. Every value here can be
//! overridden through [`crate::config::BatcherConfig`].

/// Scheduler defaults used when no configuration overrides them
pub mod scheduler {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
    pub const DEFAULT_MIN_BATCH_SIZE: usize = 1;
    pub const DEFAULT_MAX_WAIT_MS: u64 = 100;
    pub const DEFAULT_MAX_IN_FLIGHT_BATCHES: usize = 1;
}

/// Adaptive controller defaults
pub mod adaptive {
    /// Number of depth samples averaged per decision
    pub const DEFAULT_WINDOW_SIZE: usize = 10;
    pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;

    /// Mean depth above which the controller favors throughput
    pub const DEFAULT_HIGH_DEPTH_THRESHOLD: f64 = 20.0;
    /// Mean depth below which the controller favors latency
    pub const DEFAULT_LOW_DEPTH_THRESHOLD: f64 = 5.0;

    pub const DEFAULT_MIN_BATCH_SIZE_FLOOR: usize = 5;
    pub const DEFAULT_MAX_BATCH_SIZE_CEILING: usize = 20;
    pub const DEFAULT_MIN_WAIT_MS_FLOOR: u64 = 50;
    pub const DEFAULT_MAX_WAIT_MS_CEILING: u64 = 200;
    pub const DEFAULT_WAIT_STEP_MS: u64 = 10;
    pub const DEFAULT_BATCH_SIZE_STEP: usize = 1;
}

/// Execution defaults
pub mod execution {
    /// Assumed latency of one unbatched downstream call, used for cost-saved estimates
    pub const DEFAULT_ESTIMATED_SINGLE_CALL_MS: f64 = 200.0;
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
}

/// Metrics defaults
pub mod metrics {
    /// Capacity of the rolling `(timestamp, depth)` sample buffer
    pub const DEFAULT_LOAD_SAMPLE_CAPACITY: usize = 100;
}

/// Environment variable names
pub mod env {
    pub const ENVIRONMENT: &str = "BATCHER_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const CONFIG_DIR: &str = "BATCHER_CONFIG_DIR";
    pub const LOG_FORMAT: &str = "BATCHER_LOG_FORMAT";
    /// Prefix for `config` crate environment overrides, e.g. `BATCHER__SCHEDULER__MAX_WAIT_MS`
    pub const CONFIG_PREFIX: &str = "BATCHER";
    pub const CONFIG_SEPARATOR: &str = "__";
}
