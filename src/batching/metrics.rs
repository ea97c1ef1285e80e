//! # Batch Metrics
//!
//! Process-wide counters for the batcher plus a bounded rolling window of
//! `(timestamp, queue depth)` load samples. Counters are atomics; the cost
//! accumulator and sample buffer sit behind short `parking_lot` locks and are
//! never touched while the admission queue lock is held.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One observation of admission queue depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub timestamp: DateTime<Utc>,
    pub queue_depth: usize,
}

#[derive(Debug, Default)]
struct CostAccumulator {
    total_cost_saved_pct: f64,
    total_batch_duration_ms: f64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_submitted: u64,
    pub total_batches: u64,
    pub total_items_batched: u64,
    pub total_completed: u64,
    pub total_failed_items: u64,
    pub total_failed_batches: u64,
    pub total_cancelled: u64,
    pub total_rejected: u64,
    pub avg_batch_size: f64,
    pub avg_cost_saved_pct: f64,
    pub avg_batch_duration_ms: f64,
}

/// Outcome counts for one executed batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchObservation {
    pub item_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batch_failed: bool,
    pub duration: Duration,
    pub cost_saved_pct: f64,
}

#[derive(Debug)]
pub struct BatchMetrics {
    total_submitted: AtomicU64,
    total_batches: AtomicU64,
    total_items_batched: AtomicU64,
    total_completed: AtomicU64,
    total_failed_items: AtomicU64,
    total_failed_batches: AtomicU64,
    total_cancelled: AtomicU64,
    total_rejected: AtomicU64,
    cost: Mutex<CostAccumulator>,
    load_samples: Mutex<VecDeque<LoadSample>>,
    load_sample_capacity: usize,
}

impl BatchMetrics {
    pub fn new(load_sample_capacity: usize) -> Self {
        let load_sample_capacity = load_sample_capacity.max(1);
        Self {
            total_submitted: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
            total_items_batched: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed_items: AtomicU64::new(0),
            total_failed_batches: AtomicU64::new(0),
            total_cancelled: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            cost: Mutex::new(CostAccumulator::default()),
            load_samples: Mutex::new(VecDeque::with_capacity(load_sample_capacity)),
            load_sample_capacity,
        }
    }

    pub fn record_submitted(&self) {
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.total_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record items resolved without execution (shutdown failures)
    pub fn record_unexecuted_failures(&self, count: usize) {
        self.total_failed_items
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self, observation: BatchObservation) {
        self.total_batches.fetch_add(1, Ordering::Relaxed);
        self.total_items_batched
            .fetch_add(observation.item_count as u64, Ordering::Relaxed);
        self.total_completed
            .fetch_add(observation.succeeded as u64, Ordering::Relaxed);
        self.total_failed_items
            .fetch_add(observation.failed as u64, Ordering::Relaxed);
        if observation.batch_failed {
            self.total_failed_batches.fetch_add(1, Ordering::Relaxed);
        }

        let mut cost = self.cost.lock();
        cost.total_cost_saved_pct += observation.cost_saved_pct;
        cost.total_batch_duration_ms += observation.duration.as_secs_f64() * 1000.0;
    }

    /// Append a depth sample, evicting the oldest when the window is full
    pub fn record_load_sample(&self, queue_depth: usize) {
        let mut samples = self.load_samples.lock();
        if samples.len() == self.load_sample_capacity {
            samples.pop_front();
        }
        samples.push_back(LoadSample {
            timestamp: Utc::now(),
            queue_depth,
        });
    }

    pub fn recent_load(&self) -> Vec<LoadSample> {
        self.load_samples.lock().iter().copied().collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_batches = self.total_batches.load(Ordering::Relaxed);
        let total_items_batched = self.total_items_batched.load(Ordering::Relaxed);
        let (total_cost_saved_pct, total_batch_duration_ms) = {
            let cost = self.cost.lock();
            (cost.total_cost_saved_pct, cost.total_batch_duration_ms)
        };

        let per_batch = |total: f64| {
            if total_batches > 0 {
                total / total_batches as f64
            } else {
                0.0
            }
        };

        MetricsSnapshot {
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            total_batches,
            total_items_batched,
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed_items: self.total_failed_items.load(Ordering::Relaxed),
            total_failed_batches: self.total_failed_batches.load(Ordering::Relaxed),
            total_cancelled: self.total_cancelled.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            avg_batch_size: per_batch(total_items_batched as f64),
            avg_cost_saved_pct: per_batch(total_cost_saved_pct),
            avg_batch_duration_ms: per_batch(total_batch_duration_ms),
        }
    }
}

/// Estimated saving of one batched call versus `item_count` single calls, as a
/// percentage clamped to `[0, 100]`
pub fn cost_saved_pct(estimated_single_call_ms: f64, item_count: usize, duration: Duration) -> f64 {
    let baseline = estimated_single_call_ms * item_count as f64;
    if baseline <= 0.0 {
        return 0.0;
    }
    let actual = duration.as_secs_f64() * 1000.0;
    ((baseline - actual) / baseline * 100.0).clamp(0.0, 100.0)
}
