//! # Adaptive Controller
//!
//! Keeps `max_batch_size` and `max_wait_ms` matched to offered load. Once per
//! tick it samples admission queue depth into a fixed-length window and compares
//! the window mean against two thresholds:
//!
//! - mean above `high_depth_threshold`: grow batch size and wait (throughput)
//! - mean below `low_depth_threshold`: shrink both toward their floors (latency)
//! - otherwise: no change
//!
//! This is a coarse hysteresis loop, not a PID controller. At most one
//! adjustment is applied per observed sample.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::metrics::BatchMetrics;
use super::queue::AdmissionQueue;
use super::scheduler::SharedSchedulerConfig;
use crate::config::{AdaptiveConfig, SchedulerConfig};

/// Before/after values of one adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    pub from_batch_size: usize,
    pub to_batch_size: usize,
    pub from_wait_ms: u64,
    pub to_wait_ms: u64,
}

/// Decision taken for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdaptiveAction {
    ScaleUp(Adjustment),
    ScaleDown(Adjustment),
    NoChange,
}

#[derive(Debug)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    window: VecDeque<usize>,
    adjustments: u64,
    /// Operator's `min_batch_size`, restored whenever `max_batch_size` allows it
    configured_min_batch_size: Option<usize>,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        info!(
            enabled = config.enabled,
            window = config.window_size,
            high = config.high_depth_threshold,
            low = config.low_depth_threshold,
            "🎛️ ADAPTIVE: Creating adaptive controller"
        );
        let window = VecDeque::with_capacity(config.window_size.max(1));
        Self {
            config,
            window,
            adjustments: 0,
            configured_min_batch_size: None,
        }
    }

    /// Pin the minimum batch size that shrinking may lower and growing restores.
    /// Without it the first observed value is used.
    pub fn with_configured_min_batch_size(mut self, min_batch_size: usize) -> Self {
        self.configured_min_batch_size = Some(min_batch_size);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Number of configuration changes applied so far
    pub fn adjustments(&self) -> u64 {
        self.adjustments
    }

    pub fn mean_depth(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let total: usize = self.window.iter().sum();
        Some(total as f64 / self.window.len() as f64)
    }

    /// Record one depth sample and apply at most one adjustment
    pub fn observe(&mut self, depth: usize, shared: &SharedSchedulerConfig) -> AdaptiveAction {
        if self.window.len() >= self.config.window_size.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(depth);

        if !self.config.enabled {
            return AdaptiveAction::NoChange;
        }
        let Some(mean) = self.mean_depth() else {
            return AdaptiveAction::NoChange;
        };

        let scale_up = mean > self.config.high_depth_threshold;
        let scale_down = mean < self.config.low_depth_threshold;
        if !scale_up && !scale_down {
            return AdaptiveAction::NoChange;
        }

        let mut adjustment = None;
        shared.update(|current| {
            let configured_min = *self
                .configured_min_batch_size
                .get_or_insert(current.min_batch_size);
            let mut next = if scale_up {
                self.grow(current)
            } else {
                self.shrink(current)
            };
            next.min_batch_size = configured_min.min(next.max_batch_size);
            if next.max_batch_size != current.max_batch_size
                || next.max_wait_ms != current.max_wait_ms
            {
                adjustment = Some(Adjustment {
                    from_batch_size: current.max_batch_size,
                    to_batch_size: next.max_batch_size,
                    from_wait_ms: current.max_wait_ms,
                    to_wait_ms: next.max_wait_ms,
                });
                *current = next;
            }
        });

        let Some(adjustment) = adjustment else {
            debug!(mean, "ADAPTIVE: Already at bound, no change");
            return AdaptiveAction::NoChange;
        };
        self.adjustments += 1;

        info!(
            mean_depth = mean,
            batch_size = %format!("{} -> {}", adjustment.from_batch_size, adjustment.to_batch_size),
            wait_ms = %format!("{} -> {}", adjustment.from_wait_ms, adjustment.to_wait_ms),
            "ADAPTIVE: {} batching thresholds",
            if scale_up { "Raising" } else { "Lowering" }
        );

        if scale_up {
            AdaptiveAction::ScaleUp(adjustment)
        } else {
            AdaptiveAction::ScaleDown(adjustment)
        }
    }

    fn grow(&self, current: &SchedulerConfig) -> SchedulerConfig {
        let mut next = *current;
        next.max_batch_size = current
            .max_batch_size
            .saturating_add(self.config.batch_size_step)
            .min(self.config.max_batch_size_ceiling);
        next.max_wait_ms = current
            .max_wait_ms
            .saturating_add(self.config.wait_step_ms)
            .min(self.config.max_wait_ms_ceiling);
        next
    }

    fn shrink(&self, current: &SchedulerConfig) -> SchedulerConfig {
        let mut next = *current;
        next.max_batch_size = current
            .max_batch_size
            .saturating_sub(self.config.batch_size_step)
            .max(self.config.min_batch_size_floor);
        next.max_wait_ms = current
            .max_wait_ms
            .saturating_sub(self.config.wait_step_ms)
            .max(self.config.min_wait_ms_floor);
        next
    }

    /// Sample queue depth on a fixed interval until shutdown
    pub async fn run<P, R>(
        mut self,
        queue: Arc<AdmissionQueue<P, R>>,
        shared: SharedSchedulerConfig,
        metrics: Arc<BatchMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.config.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let depth = queue.depth();
                    metrics.record_load_sample(depth);
                    self.observe(depth, &shared);
                }
            }
        }

        debug!(adjustments = self.adjustments, "ADAPTIVE: Controller stopped");
        self.adjustments
    }
}
