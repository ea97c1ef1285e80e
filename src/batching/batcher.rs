//! # Batcher
//!
//! Public entry point. A `Batcher` owns one admission queue, one scheduler task
//! and (when enabled) one adaptive controller task. It is an explicit,
//! caller-owned instance: construct it once at startup and share it behind an
//! `Arc` with every producer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use request_batcher::{handler_fn, Batcher, BatcherConfig, BatchFailure, ItemResult};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = handler_fn(|prompts: Vec<String>| async move {
//!     let results: Result<Vec<ItemResult<usize>>, BatchFailure> =
//!         Ok(prompts.into_iter().map(|p| Ok(p.len())).collect());
//!     results
//! });
//!
//! let batcher = Batcher::new(BatcherConfig::default(), handler)?;
//! batcher.start()?;
//!
//! let length = batcher.submit("hello".to_string()).await?;
//! assert_eq!(length, 5);
//!
//! batcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adaptive::AdaptiveController;
use super::executor::BatchExecutor;
use super::handler::BatchHandler;
use super::metrics::{BatchMetrics, LoadSample};
use super::queue::AdmissionQueue;
use super::scheduler::{BatchScheduler, SchedulerSummary, SharedSchedulerConfig, ShutdownSettings};
use super::work_item::{WorkItem, WorkItemId};
use crate::config::{BatcherConfig, ConfigManager, SchedulerConfig};
use crate::error::{BatcherError, Result};

/// Per-submission options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Higher values are batched first when priority is enabled
    pub priority: i32,
    /// Stop waiting after this long and return `Cancelled`
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Snapshot returned by [`Batcher::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct BatcherStats {
    pub batcher_id: Uuid,
    pub running: bool,
    pub total_submitted: u64,
    pub total_batches: u64,
    pub avg_batch_size: f64,
    pub pending_count: usize,
    pub avg_cost_saved_pct: f64,
    /// Scheduler thresholds currently in effect
    pub config: SchedulerConfig,
    pub total_completed: u64,
    pub total_failed_items: u64,
    pub total_failed_batches: u64,
    pub total_cancelled: u64,
    pub total_rejected: u64,
    pub avg_batch_duration_ms: f64,
    pub recent_load: Vec<LoadSample>,
}

struct BackgroundTasks {
    scheduler: JoinHandle<SchedulerSummary>,
    adaptive: Option<JoinHandle<u64>>,
}

enum Lifecycle {
    NotStarted,
    Running(BackgroundTasks),
    Stopped,
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "not_started",
            Lifecycle::Running(_) => "running",
            Lifecycle::Stopped => "stopped",
        }
    }
}

pub struct Batcher<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    id: Uuid,
    config: BatcherConfig,
    queue: Arc<AdmissionQueue<P, R>>,
    scheduler_config: SharedSchedulerConfig,
    executor: Arc<BatchExecutor<P, R>>,
    metrics: Arc<BatchMetrics>,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    lifecycle: Mutex<Lifecycle>,
}

impl<P, R> std::fmt::Debug for Batcher<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("id", &self.id)
            .field("state", &self.lifecycle.lock().name())
            .field("pending", &self.queue.depth())
            .finish_non_exhaustive()
    }
}

impl<P, R> Batcher<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Build a batcher around a downstream handler. Nothing runs until [`start`](Self::start).
    pub fn new<H>(config: BatcherConfig, handler: H) -> Result<Self>
    where
        H: BatchHandler<P, R>,
    {
        Self::with_shared_handler(config, Arc::new(handler))
    }

    /// Build a batcher from a loaded [`ConfigManager`]
    pub fn from_manager<H>(manager: &ConfigManager, handler: H) -> Result<Self>
    where
        H: BatchHandler<P, R>,
    {
        Self::new(manager.config().clone(), handler)
    }

    pub fn with_shared_handler(
        config: BatcherConfig,
        handler: Arc<dyn BatchHandler<P, R>>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(BatchMetrics::new(config.metrics.load_sample_capacity));
        let executor = Arc::new(BatchExecutor::new(
            handler,
            metrics.clone(),
            &config.execution,
        ));
        let scheduler_config = SharedSchedulerConfig::new(config.initial_scheduler_config());
        let (shutdown, _) = watch::channel(false);
        let id = Uuid::new_v4();

        info!(
            batcher_id = %id,
            max_batch_size = scheduler_config.snapshot().max_batch_size,
            max_wait_ms = scheduler_config.snapshot().max_wait_ms,
            adaptive = config.adaptive.enabled,
            capacity = ?config.queue.capacity,
            "🏗️ BATCHER: Created"
        );

        Ok(Self {
            id,
            queue: Arc::new(AdmissionQueue::new(&config.queue)),
            scheduler_config,
            executor,
            metrics,
            wake: Arc::new(Notify::new()),
            shutdown,
            lifecycle: Mutex::new(Lifecycle::NotStarted),
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Scheduler thresholds currently in effect
    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler_config.snapshot()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    pub fn pending_count(&self) -> usize {
        self.queue.depth()
    }

    /// Spawn the scheduler (and adaptive controller) on the current Tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BatcherError::InvalidState(format!("start requires a Tokio runtime: {e}"))
        })?;

        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::NotStarted => {}
            Lifecycle::Running(_) => {
                return Err(BatcherError::InvalidState(
                    "batcher is already running".to_string(),
                ))
            }
            Lifecycle::Stopped => {
                return Err(BatcherError::InvalidState(
                    "a stopped batcher cannot be restarted".to_string(),
                ))
            }
        }

        let scheduler = BatchScheduler::new(
            self.queue.clone(),
            self.executor.clone(),
            self.scheduler_config.clone(),
            self.metrics.clone(),
            self.wake.clone(),
            self.shutdown.subscribe(),
            ShutdownSettings {
                policy: self.config.execution.shutdown_policy,
                timeout: self.config.execution.shutdown_timeout(),
            },
        );
        let scheduler = runtime.spawn(scheduler.run());

        let adaptive = self.config.adaptive.enabled.then(|| {
            let controller = AdaptiveController::new(self.config.adaptive.clone())
                .with_configured_min_batch_size(self.config.scheduler.min_batch_size);
            runtime.spawn(controller.run(
                self.queue.clone(),
                self.scheduler_config.clone(),
                self.metrics.clone(),
                self.shutdown.subscribe(),
            ))
        });

        *lifecycle = Lifecycle::Running(BackgroundTasks {
            scheduler,
            adaptive,
        });
        info!(batcher_id = %self.id, "✅ BATCHER: Started");
        Ok(())
    }

    /// Stop accepting work, finish in-flight batches, then drain or fail what is
    /// still pending according to the shutdown policy. Calling it again is a no-op.
    pub async fn stop(&self) -> Result<SchedulerSummary> {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        self.queue.close();
        self.shutdown.send_replace(true);

        let tasks = match previous {
            Lifecycle::Running(tasks) => tasks,
            Lifecycle::NotStarted => {
                let items = self.queue.drain_all();
                let count = items.len();
                for item in items {
                    let item_id = item.id();
                    item.fail(BatcherError::Shutdown { item_id });
                }
                self.metrics.record_unexecuted_failures(count);
                info!(
                    batcher_id = %self.id,
                    failed = count,
                    "🛑 BATCHER: Stopped before start, pending items failed"
                );
                return Ok(SchedulerSummary {
                    items_failed_on_shutdown: count as u64,
                    ..SchedulerSummary::default()
                });
            }
            Lifecycle::Stopped => {
                debug!(batcher_id = %self.id, "BATCHER: Already stopped");
                return Ok(SchedulerSummary::default());
            }
        };

        info!(batcher_id = %self.id, pending = self.queue.depth(), "BATCHER: Stopping");

        if let Some(adaptive) = tasks.adaptive {
            match adaptive.await {
                Ok(adjustments) => debug!(adjustments, "BATCHER: Adaptive controller joined"),
                Err(e) => warn!(error = %e, "BATCHER: Adaptive controller task failed"),
            }
        }

        let summary = tasks.scheduler.await.map_err(|e| {
            BatcherError::InvalidState(format!("scheduler task failed: {e}"))
        })?;

        info!(
            batcher_id = %self.id,
            batches = summary.batches_executed,
            drained = summary.items_drained,
            failed_on_shutdown = summary.items_failed_on_shutdown,
            "🛑 BATCHER: Stopped"
        );
        Ok(summary)
    }

    /// Submit with default priority and no timeout
    pub async fn submit(&self, payload: P) -> Result<R> {
        self.submit_with(payload, SubmitOptions::default()).await
    }

    pub async fn submit_with_priority(&self, payload: P, priority: i32) -> Result<R> {
        self.submit_with(payload, SubmitOptions::default().with_priority(priority))
            .await
    }

    pub async fn submit_with_timeout(&self, payload: P, timeout: Duration) -> Result<R> {
        self.submit_with(payload, SubmitOptions::default().with_timeout(timeout))
            .await
    }

    /// Enqueue a payload and wait until its batch resolves it
    ///
    /// If the timeout elapses (or this future is dropped) while the item is
    /// still queued, the item is removed. An item already in a batch keeps
    /// executing and its result is discarded.
    pub async fn submit_with(&self, payload: P, options: SubmitOptions) -> Result<R> {
        let item_id = WorkItemId::new();

        let permit = match self.queue.admit(item_id).await {
            Ok(permit) => permit,
            Err(e) => {
                if matches!(e, BatcherError::QueueFull { .. }) {
                    self.metrics.record_rejected();
                    debug!(item_id = %item_id, error = %e, "BATCHER: Submission rejected");
                }
                return Err(e);
            }
        };

        let (item, receiver) = WorkItem::new(item_id, payload, options.priority);
        let submitted_at = item.submitted_at();
        let depth = self.queue.enqueue(item.with_admission(permit))?;
        self.metrics.record_submitted();

        if depth >= self.wake_threshold() {
            self.wake.notify_one();
        }

        let guard = PendingGuard {
            queue: &self.queue,
            metrics: &self.metrics,
            item_id,
            armed: true,
        };

        let received = match options.timeout {
            None => receiver.await,
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    drop(guard);
                    let waited_ms = Instant::now()
                        .saturating_duration_since(submitted_at)
                        .as_millis() as u64;
                    return Err(BatcherError::Cancelled { item_id, waited_ms });
                }
            },
        };
        guard.disarm();

        // A dropped slot means the item was discarded without a result
        received.unwrap_or(Err(BatcherError::Shutdown { item_id }))
    }

    pub fn stats(&self) -> BatcherStats {
        let snapshot = self.metrics.snapshot();
        BatcherStats {
            batcher_id: self.id,
            running: self.is_running(),
            total_submitted: snapshot.total_submitted,
            total_batches: snapshot.total_batches,
            avg_batch_size: snapshot.avg_batch_size,
            pending_count: self.queue.depth(),
            avg_cost_saved_pct: snapshot.avg_cost_saved_pct,
            config: self.scheduler_config.snapshot(),
            total_completed: snapshot.total_completed,
            total_failed_items: snapshot.total_failed_items,
            total_failed_batches: snapshot.total_failed_batches,
            total_cancelled: snapshot.total_cancelled,
            total_rejected: snapshot.total_rejected,
            avg_batch_duration_ms: snapshot.avg_batch_duration_ms,
            recent_load: self.metrics.recent_load(),
        }
    }

    /// Depth at which a submission wakes the scheduler: the current min batch
    /// size, or an explicit high-water mark when that is lower
    fn wake_threshold(&self) -> usize {
        let current = self.scheduler_config.snapshot();
        let min_batch_size = current.min_batch_size.max(1);
        self.config
            .queue
            .high_water_mark
            .map_or(min_batch_size, |mark| mark.clamp(1, min_batch_size))
    }
}

/// Removes a still-queued item when its submitter stops waiting
struct PendingGuard<'a, P, R> {
    queue: &'a AdmissionQueue<P, R>,
    metrics: &'a BatchMetrics,
    item_id: WorkItemId,
    armed: bool,
}

impl<P, R> PendingGuard<'_, P, R> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<P, R> Drop for PendingGuard<'_, P, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.metrics.record_cancelled();
        if self.queue.remove(self.item_id).is_none() {
            debug!(item_id = %self.item_id, "BATCHER: Cancelled item already batched, result will be discarded");
        }
    }
}
