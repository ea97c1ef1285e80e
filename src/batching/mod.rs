//! # Batching Core
//!
//! Groups concurrently submitted work items into batches for one downstream call.
//!
//! ## Components
//!
//! - [`AdmissionQueue`]: lock-protected pending items and batch formation
//! - [`BatchScheduler`]: driver loop deciding when a batch is due
//! - [`BatchExecutor`]: one handler call per batch, fail-closed result delivery
//! - [`AdaptiveController`]: hysteresis loop tuning batch size and wait
//! - [`BatchMetrics`]: counters and rolling load samples
//! - [`Batcher`]: lifecycle and submission facade tying the above together
//!
//! ## Flow
//!
//! ```text
//! submit() ──► AdmissionQueue ──► BatchScheduler ──► BatchExecutor ──► BatchHandler
//!    ▲              ▲                   ▲                  │
//!    │              │ depth             │ thresholds       │ per-item results
//!    │         AdaptiveController ──────┘                  │
//!    └─────────────────────────────────────────────────────┘
//! ```

pub mod adaptive;
pub mod batch;
pub mod batcher;
pub mod executor;
pub mod handler;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod work_item;

pub use adaptive::{AdaptiveAction, AdaptiveController, Adjustment};
pub use batch::{Batch, BatchId, BatchReport};
pub use batcher::{Batcher, BatcherStats, SubmitOptions};
pub use executor::BatchExecutor;
pub use handler::{handler_fn, BatchHandler, FnBatchHandler, ItemResult};
pub use metrics::{cost_saved_pct, BatchMetrics, LoadSample, MetricsSnapshot};
pub use queue::AdmissionQueue;
pub use scheduler::{BatchScheduler, SchedulerSummary, SharedSchedulerConfig, ShutdownSettings};
pub use work_item::{Completion, ItemOutcome, WorkItem, WorkItemId};
