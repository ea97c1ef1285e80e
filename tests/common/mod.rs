//! Shared helpers for integration and property tests.
#![allow(dead_code)]

pub mod strategies;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use request_batcher::{
    handler_fn, BatchFailure, BatchHandler, Batcher, BatcherConfig, ItemFailure, ItemResult,
};

pub type HandlerResult = Result<Vec<ItemResult<u64>>, BatchFailure>;

/// Non-adaptive configuration with explicit scheduler thresholds
pub fn scheduler_config(max: usize, min: usize, wait_ms: u64) -> BatcherConfig {
    let mut config = BatcherConfig::default();
    config.adaptive.enabled = false;
    config.scheduler.max_batch_size = max;
    config.scheduler.min_batch_size = min;
    config.scheduler.max_wait_ms = wait_ms;
    config
}

/// Every batch the handler was called with, in call order
#[derive(Debug, Clone, Default)]
pub struct BatchLog {
    batches: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl BatchLog {
    pub fn record(&self, payloads: &[u64]) {
        self.batches.lock().push(payloads.to_vec());
    }

    pub fn batches(&self) -> Vec<Vec<u64>> {
        self.batches.lock().clone()
    }

    pub fn all_payloads(&self) -> Vec<u64> {
        self.batches.lock().iter().flatten().copied().collect()
    }
}

/// Doubles every payload after `delay`, recording each call
pub fn doubling_handler(log: BatchLog, delay: Duration) -> impl BatchHandler<u64, u64> {
    handler_fn(move |payloads: Vec<u64>| {
        let log = log.clone();
        async move {
            log.record(&payloads);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let results: HandlerResult = Ok(payloads.into_iter().map(|p| Ok(p * 2)).collect());
            results
        }
    })
}

/// Fails odd payloads individually, doubles even ones
pub fn odd_failing_handler() -> impl BatchHandler<u64, u64> {
    handler_fn(|payloads: Vec<u64>| async move {
        let results: HandlerResult = Ok(payloads
            .into_iter()
            .map(|p| {
                if p % 2 == 1 {
                    Err(ItemFailure::new(format!("odd payload {p}")))
                } else {
                    Ok(p * 2)
                }
            })
            .collect());
        results
    })
}

/// Rejects every call
pub fn failing_handler(message: &'static str) -> impl BatchHandler<u64, u64> {
    handler_fn(move |_payloads: Vec<u64>| async move {
        let results: HandlerResult = Err(BatchFailure::new(message));
        results
    })
}

/// Submit from a spawned task so the call can be pending while the test continues
pub fn spawn_submit(
    batcher: &Arc<Batcher<u64, u64>>,
    payload: u64,
    priority: i32,
) -> tokio::task::JoinHandle<request_batcher::Result<u64>> {
    let batcher = batcher.clone();
    tokio::spawn(async move { batcher.submit_with_priority(payload, priority).await })
}
