//! Proptest strategies for batch formation

use proptest::prelude::*;
use request_batcher::SchedulerConfig;

/// Priorities for a burst of submissions
pub fn priorities_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-5i32..=5, 0..200)
}

/// Scheduler thresholds with `1 <= min <= max`
pub fn scheduler_config_strategy() -> impl Strategy<Value = SchedulerConfig> {
    (1usize..=32, any::<bool>())
        .prop_flat_map(|(max, priority_enabled)| {
            (Just(max), 1usize..=max, Just(priority_enabled))
        })
        .prop_map(|(max_batch_size, min_batch_size, priority_enabled)| SchedulerConfig {
            max_batch_size,
            min_batch_size,
            max_wait_ms: 100,
            priority_enabled,
            max_in_flight_batches: 1,
        })
}
