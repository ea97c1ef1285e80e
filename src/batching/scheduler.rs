//! # Batch Scheduler
//!
//! The driver loop that decides *when* to form and execute a batch. One
//! scheduler task runs per batcher. Each iteration it:
//!
//! 1. Waits until the oldest pending item reaches `max_wait_ms` (or a full tick
//!    when the queue is empty), a submission reaching the wake depth, or shutdown.
//! 2. Forms every batch the admission queue considers due.
//! 3. Executes them, inline when `max_in_flight_batches` is 1, otherwise on a
//!    bounded `JoinSet`.
//!
//! On shutdown it finishes in-flight batches, then drains or fails whatever is
//! still queued so no caller is left waiting.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::batch::BatchReport;
use super::executor::BatchExecutor;
use super::metrics::BatchMetrics;
use super::queue::AdmissionQueue;
use super::work_item::WorkItem;
use crate::config::{SchedulerConfig, ShutdownPolicy};
use crate::error::BatcherError;
use crate::logging::log_error;

/// Shortest tick; keeps a zero `max_wait_ms` from spinning on an empty queue
const MIN_TICK: Duration = Duration::from_millis(1);

/// Scheduler thresholds shared between the scheduler (reader) and the
/// adaptive controller (sole writer)
#[derive(Debug, Clone)]
pub struct SharedSchedulerConfig {
    inner: Arc<RwLock<SchedulerConfig>>,
}

impl SharedSchedulerConfig {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> SchedulerConfig {
        *self.inner.read()
    }

    /// Apply a change atomically and return the new value
    pub(crate) fn update<F>(&self, change: F) -> SchedulerConfig
    where
        F: FnOnce(&mut SchedulerConfig),
    {
        let mut guard = self.inner.write();
        change(&mut guard);
        *guard
    }
}

/// What the scheduler did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub batches_executed: u64,
    pub items_executed: u64,
    /// Items executed by the shutdown drain
    pub items_drained: u64,
    /// Items resolved with a shutdown error instead of executing
    pub items_failed_on_shutdown: u64,
}

impl SchedulerSummary {
    fn record(&mut self, report: &BatchReport) {
        self.batches_executed += 1;
        self.items_executed += report.item_count as u64;
    }
}

/// Settings the scheduler needs beyond the shared thresholds
#[derive(Debug, Clone, Copy)]
pub struct ShutdownSettings {
    pub policy: ShutdownPolicy,
    pub timeout: Duration,
}

pub struct BatchScheduler<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    queue: Arc<AdmissionQueue<P, R>>,
    executor: Arc<BatchExecutor<P, R>>,
    config: SharedSchedulerConfig,
    metrics: Arc<BatchMetrics>,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    shutdown_settings: ShutdownSettings,
}

impl<P, R> BatchScheduler<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        queue: Arc<AdmissionQueue<P, R>>,
        executor: Arc<BatchExecutor<P, R>>,
        config: SharedSchedulerConfig,
        metrics: Arc<BatchMetrics>,
        wake: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
        shutdown_settings: ShutdownSettings,
    ) -> Self {
        Self {
            queue,
            executor,
            config,
            metrics,
            wake,
            shutdown,
            shutdown_settings,
        }
    }

    /// Drive batches until shutdown is signalled (or the signal sender is dropped)
    pub async fn run(mut self) -> SchedulerSummary {
        let mut in_flight: JoinSet<BatchReport> = JoinSet::new();
        let mut summary = SchedulerSummary::default();

        info!(
            max_batch_size = self.config.snapshot().max_batch_size,
            max_wait_ms = self.config.snapshot().max_wait_ms,
            "🚀 SCHEDULER: Driver loop started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let config = self.config.snapshot();
            let tick = config.max_wait().max(MIN_TICK);
            let tick_deadline = Instant::now() + tick;
            let deadline = self
                .queue
                .next_deadline(&config)
                .map_or(tick_deadline, |oldest| oldest.min(tick_deadline));

            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("SCHEDULER: Shutdown signal received");
                        break;
                    }
                    continue;
                }
                _ = self.wake.notified() => {
                    debug!("SCHEDULER: Woken by submission at wake depth");
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }

            self.dispatch_ready(&mut in_flight, &mut summary).await;
        }

        // Exit only after in-flight batches complete
        while let Some(joined) = in_flight.join_next().await {
            Self::record_joined(joined, &mut summary);
        }

        self.finish_pending(&mut summary).await;

        info!(
            batches = summary.batches_executed,
            items = summary.items_executed,
            drained = summary.items_drained,
            failed_on_shutdown = summary.items_failed_on_shutdown,
            "🛑 SCHEDULER: Driver loop stopped"
        );
        summary
    }

    /// Form and execute every batch that is currently due
    async fn dispatch_ready(
        &self,
        in_flight: &mut JoinSet<BatchReport>,
        summary: &mut SchedulerSummary,
    ) {
        loop {
            while let Some(joined) = in_flight.try_join_next() {
                Self::record_joined(joined, summary);
            }

            let config = self.config.snapshot();
            let Some(batch) = self.queue.try_form_batch(&config, Instant::now()) else {
                break;
            };
            debug!(
                batch_id = %batch.id(),
                size = batch.len(),
                max_queue_wait_ms = batch.max_queue_wait().as_millis() as u64,
                "SCHEDULER: Batch formed"
            );

            if config.max_in_flight_batches <= 1 {
                let report = self.executor.execute(batch).await;
                summary.record(&report);
                continue;
            }

            while in_flight.len() >= config.max_in_flight_batches {
                match in_flight.join_next().await {
                    Some(joined) => Self::record_joined(joined, summary),
                    None => break,
                }
            }
            let executor = self.executor.clone();
            in_flight.spawn(async move { executor.execute(batch).await });
        }
    }

    fn record_joined(
        joined: std::result::Result<BatchReport, JoinError>,
        summary: &mut SchedulerSummary,
    ) {
        match joined {
            Ok(report) => summary.record(&report),
            Err(e) => log_error("scheduler", "execute_batch", &e.to_string(), None),
        }
    }

    /// Resolve everything still queued according to the shutdown policy
    async fn finish_pending(&self, summary: &mut SchedulerSummary) {
        self.queue.close();
        let pending = self.queue.depth();
        if pending == 0 {
            return;
        }

        match self.shutdown_settings.policy {
            ShutdownPolicy::Drain => {
                info!(pending, "SCHEDULER: Draining pending items before exit");
                let deadline = Instant::now() + self.shutdown_settings.timeout;
                let config = self.config.snapshot();

                while let Some(batch) = self.queue.force_batch(&config) {
                    if Instant::now() >= deadline {
                        warn!(
                            remaining = batch.len() + self.queue.depth(),
                            "SCHEDULER: Drain deadline reached, failing remaining items"
                        );
                        let mut leftovers = batch.into_items();
                        leftovers.extend(self.queue.drain_all());
                        summary.items_failed_on_shutdown += self.fail_items(leftovers);
                        break;
                    }
                    let item_ids = batch.item_ids();
                    match tokio::time::timeout_at(deadline, self.executor.execute(batch)).await {
                        Ok(report) => {
                            summary.items_drained += report.item_count as u64;
                            summary.record(&report);
                        }
                        Err(_) => {
                            // Dropping the execution drops its completion slots,
                            // which submitters observe as a shutdown error
                            warn!(
                                abandoned = ?item_ids,
                                remaining = self.queue.depth(),
                                "SCHEDULER: Drain deadline reached mid-batch, abandoning it"
                            );
                            self.metrics.record_unexecuted_failures(item_ids.len());
                            summary.items_failed_on_shutdown += item_ids.len() as u64;
                            summary.items_failed_on_shutdown += self.fail_items(self.queue.drain_all());
                            break;
                        }
                    }
                }
            }
            ShutdownPolicy::FailPending => {
                info!(pending, "SCHEDULER: Failing pending items on shutdown");
                let items = self.queue.drain_all();
                summary.items_failed_on_shutdown += self.fail_items(items);
            }
        }
    }

    fn fail_items(&self, items: Vec<WorkItem<P, R>>) -> u64 {
        let count = items.len();
        for item in items {
            let item_id = item.id();
            item.fail(BatcherError::Shutdown { item_id });
        }
        self.metrics.record_unexecuted_failures(count);
        count as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::handler::{handler_fn, ItemResult};
    use crate::batching::work_item::{ItemOutcome, WorkItemId};
    use crate::config::ExecutionConfig;
    use crate::error::BatchFailure;
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    type HandlerResult = std::result::Result<Vec<ItemResult<u32>>, BatchFailure>;

    struct Harness {
        queue: Arc<AdmissionQueue<u32, u32>>,
        config: SharedSchedulerConfig,
        wake: Arc<Notify>,
        shutdown_tx: watch::Sender<bool>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
        handle: tokio::task::JoinHandle<SchedulerSummary>,
    }

    fn spawn_scheduler(scheduler_config: SchedulerConfig, policy: ShutdownPolicy) -> Harness {
        spawn_scheduler_with(
            scheduler_config,
            policy,
            Duration::from_millis(5),
            Duration::from_secs(5),
        )
    }

    fn spawn_scheduler_with(
        scheduler_config: SchedulerConfig,
        policy: ShutdownPolicy,
        handler_delay: Duration,
        shutdown_timeout: Duration,
    ) -> Harness {
        let queue = Arc::new(AdmissionQueue::unbounded());
        let metrics = Arc::new(BatchMetrics::new(10));
        let batch_sizes = Arc::new(Mutex::new(Vec::new()));
        let sizes = batch_sizes.clone();
        let handler = handler_fn(move |payloads: Vec<u32>| {
            let sizes = sizes.clone();
            async move {
                sizes.lock().push(payloads.len());
                tokio::time::sleep(handler_delay).await;
                let results: HandlerResult = Ok(payloads.into_iter().map(|p| Ok(p + 1)).collect());
                results
            }
        });
        let executor = Arc::new(BatchExecutor::new(
            Arc::new(handler),
            metrics.clone(),
            &ExecutionConfig::default(),
        ));
        let config = SharedSchedulerConfig::new(scheduler_config);
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = BatchScheduler::new(
            queue.clone(),
            executor,
            config.clone(),
            metrics,
            wake.clone(),
            shutdown_rx,
            ShutdownSettings {
                policy,
                timeout: shutdown_timeout,
            },
        );
        let handle = tokio::spawn(scheduler.run());

        Harness {
            queue,
            config,
            wake,
            shutdown_tx,
            batch_sizes,
            handle,
        }
    }

    fn submit(queue: &AdmissionQueue<u32, u32>, payload: u32) -> oneshot::Receiver<ItemOutcome<u32>> {
        let (item, receiver) = WorkItem::new(WorkItemId::new(), payload, 0);
        queue.enqueue(item).unwrap();
        receiver
    }

    fn scheduler_config(max: usize, min: usize, wait_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            max_batch_size: max,
            min_batch_size: min,
            max_wait_ms: wait_ms,
            priority_enabled: true,
            max_in_flight_batches: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_undersized_batch_forced_after_max_wait() {
        let harness = spawn_scheduler(scheduler_config(10, 5, 100), ShutdownPolicy::Drain);
        let started = Instant::now();
        let receiver = submit(&harness.queue, 41);

        assert_eq!(receiver.await.unwrap(), Ok(42));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        // max wait plus one execution (5ms) and scheduling slack
        assert!(elapsed <= Duration::from_millis(110), "took {elapsed:?}");

        harness.shutdown_tx.send(true).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_never_exceed_max_size() {
        let harness = spawn_scheduler(scheduler_config(4, 1, 50), ShutdownPolicy::Drain);
        let receivers: Vec<_> = (0..10).map(|p| submit(&harness.queue, p)).collect();
        harness.wake.notify_one();

        for receiver in receivers {
            assert!(receiver.await.unwrap().is_ok());
        }
        let sizes = harness.batch_sizes.lock().clone();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().all(|&size| size <= 4), "sizes: {sizes:?}");

        harness.shutdown_tx.send(true).unwrap();
        let summary = harness.handle.await.unwrap();
        assert_eq!(summary.items_executed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_updated_config_each_tick() {
        let harness = spawn_scheduler(scheduler_config(10, 10, 1_000), ShutdownPolicy::Drain);
        harness.config.update(|config| {
            config.min_batch_size = 2;
            config.max_wait_ms = 10;
        });
        // Let the loop pick up the shorter tick
        harness.wake.notify_one();

        let first = submit(&harness.queue, 1);
        let second = submit(&harness.queue, 2);
        let started = Instant::now();
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_millis(100));

        harness.shutdown_tx.send(true).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_pending_items() {
        let harness = spawn_scheduler(scheduler_config(3, 3, 10_000), ShutdownPolicy::Drain);
        let receivers: Vec<_> = (0..2).map(|p| submit(&harness.queue, p)).collect();

        harness.shutdown_tx.send(true).unwrap();
        let summary = harness.handle.await.unwrap();
        assert_eq!(summary.items_drained, 2);

        for receiver in receivers {
            assert!(receiver.await.unwrap().is_ok());
        }
        assert!(harness.queue.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline_bounds_slow_batches() {
        let harness = spawn_scheduler_with(
            scheduler_config(1, 1, 10_000),
            ShutdownPolicy::Drain,
            Duration::from_secs(60),
            Duration::from_millis(100),
        );
        let receivers: Vec<_> = (0..3).map(|p| submit(&harness.queue, p)).collect();

        // Signalled before the loop first runs, so every item goes through the drain
        let started = Instant::now();
        harness.shutdown_tx.send(true).unwrap();
        let summary = harness.handle.await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(1), "stop took {elapsed:?}");
        assert_eq!(summary.items_drained, 0);
        assert_eq!(summary.items_failed_on_shutdown, 3);
        assert_eq!(harness.batch_sizes.lock().clone(), vec![1]);
        assert_eq!(harness.queue.depth(), 0);

        // The abandoned batch drops its slot; the rest are failed explicitly
        let mut receivers = receivers.into_iter();
        assert!(receivers.next().unwrap().await.is_err());
        for receiver in receivers {
            assert!(receiver.await.unwrap().unwrap_err().is_shutdown());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_pending_items() {
        let harness = spawn_scheduler(scheduler_config(3, 3, 10_000), ShutdownPolicy::FailPending);
        let receivers: Vec<_> = (0..2).map(|p| submit(&harness.queue, p)).collect();

        harness.shutdown_tx.send(true).unwrap();
        let summary = harness.handle.await.unwrap();
        assert_eq!(summary.items_failed_on_shutdown, 2);

        for receiver in receivers {
            assert!(receiver.await.unwrap().unwrap_err().is_shutdown());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_signal_sender_stops_loop() {
        let harness = spawn_scheduler(scheduler_config(3, 1, 10), ShutdownPolicy::Drain);
        let receiver = submit(&harness.queue, 9);
        drop(harness.shutdown_tx);

        harness.handle.await.unwrap();
        assert_eq!(receiver.await.unwrap(), Ok(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_in_flight_batches() {
        let mut config = scheduler_config(2, 1, 20);
        config.max_in_flight_batches = 3;
        let harness = spawn_scheduler(config, ShutdownPolicy::Drain);

        let receivers: Vec<_> = (0..12).map(|p| submit(&harness.queue, p)).collect();
        harness.wake.notify_one();
        for (expected, receiver) in receivers.into_iter().enumerate() {
            assert_eq!(receiver.await.unwrap(), Ok(expected as u32 + 1));
        }

        harness.shutdown_tx.send(true).unwrap();
        let summary = harness.handle.await.unwrap();
        assert_eq!(summary.items_executed, 12);
        assert_eq!(summary.batches_executed, 6);
    }
}
