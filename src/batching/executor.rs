//! # Batch Executor
//!
//! Invokes the injected [`BatchHandler`] exactly once per batch and resolves
//! every member item. Call-level failures (handler error, timeout, panic, or a
//! result list of the wrong length) are delivered to every item in the batch;
//! per-item failures only to their own item. No item leaves here unresolved.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::batch::{Batch, BatchReport};
use super::handler::{BatchHandler, ItemResult};
use super::metrics::{cost_saved_pct, BatchMetrics, BatchObservation};
use crate::config::ExecutionConfig;
use crate::error::BatcherError;
use crate::logging::log_batch_operation;

pub struct BatchExecutor<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    handler: Arc<dyn BatchHandler<P, R>>,
    metrics: Arc<BatchMetrics>,
    estimated_single_call_ms: f64,
    batch_timeout: Option<Duration>,
}

impl<P, R> std::fmt::Debug for BatchExecutor<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("estimated_single_call_ms", &self.estimated_single_call_ms)
            .field("batch_timeout", &self.batch_timeout)
            .finish_non_exhaustive()
    }
}

impl<P, R> BatchExecutor<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        handler: Arc<dyn BatchHandler<P, R>>,
        metrics: Arc<BatchMetrics>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            handler,
            metrics,
            estimated_single_call_ms: config.estimated_single_call_ms,
            batch_timeout: config.batch_timeout(),
        }
    }

    /// Execute one batch and resolve every item in it
    #[instrument(skip(self, batch), fields(batch_id = %batch.id(), item_count = batch.len()))]
    pub async fn execute(&self, batch: Batch<P, R>) -> BatchReport {
        let batch_id = batch.id();
        let formed_at = batch.formed_at_utc();
        let item_count = batch.len();

        let mut ids = Vec::with_capacity(item_count);
        let mut payloads = Vec::with_capacity(item_count);
        let mut completions = Vec::with_capacity(item_count);
        for item in batch.into_items() {
            let (id, payload, completion) = item.into_parts();
            ids.push(id);
            payloads.push(payload);
            completions.push(completion);
        }

        let started = Instant::now();
        let outcome = self.call_handler(payloads, item_count).await;
        let duration = started.elapsed();

        let mut succeeded = 0;
        let mut failed = 0;
        let mut discarded = 0;
        let batch_failed = outcome.is_err();

        match outcome {
            Ok(results) => {
                for ((id, completion), result) in ids.into_iter().zip(completions).zip(results) {
                    let delivered = match result {
                        Ok(value) => {
                            succeeded += 1;
                            completion.complete(Ok(value))
                        }
                        Err(failure) => {
                            failed += 1;
                            completion.complete(Err(BatcherError::Item {
                                item_id: id,
                                message: failure.message,
                            }))
                        }
                    };
                    if !delivered {
                        discarded += 1;
                    }
                }
            }
            Err(message) => {
                warn!(
                    batch_id = %batch_id,
                    item_count,
                    error = %message,
                    "EXECUTOR: Batch call failed, failing every item"
                );
                let error = BatcherError::Batch { batch_id, message };
                for completion in completions {
                    failed += 1;
                    if !completion.complete(Err(error.clone())) {
                        discarded += 1;
                    }
                }
            }
        }

        if discarded > 0 {
            debug!(batch_id = %batch_id, discarded, "EXECUTOR: Results discarded for abandoned items");
        }

        let cost_saved = cost_saved_pct(self.estimated_single_call_ms, item_count, duration);
        self.metrics.record_batch(BatchObservation {
            item_count,
            succeeded,
            failed,
            batch_failed,
            duration,
            cost_saved_pct: cost_saved,
        });

        let duration_ms = duration.as_secs_f64() * 1000.0;
        log_batch_operation(
            "execute",
            Some(&batch_id.to_string()),
            item_count,
            if batch_failed { "failed" } else { "completed" },
            Some(duration.as_millis() as u64),
            None,
        );

        BatchReport {
            batch_id,
            item_count,
            succeeded,
            failed,
            batch_failed,
            discarded,
            formed_at,
            completed_at: Utc::now(),
            duration_ms,
            cost_saved_pct: cost_saved,
        }
    }

    /// Run the handler, folding every call-level failure into an error message
    async fn call_handler(
        &self,
        payloads: Vec<P>,
        expected: usize,
    ) -> std::result::Result<Vec<ItemResult<R>>, String> {
        let call = AssertUnwindSafe(self.handler.execute_batch(payloads)).catch_unwind();

        let joined = match self.batch_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(format!(
                        "batch call timed out after {}ms",
                        limit.as_millis()
                    ))
                }
            },
            None => call.await,
        };

        match joined {
            Ok(Ok(results)) if results.len() == expected => Ok(results),
            Ok(Ok(results)) => Err(format!(
                "handler returned {} results for {} items",
                results.len(),
                expected
            )),
            Ok(Err(failure)) => Err(failure.message),
            Err(panic) => Err(format!("handler panicked: {}", panic_message(&*panic))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
