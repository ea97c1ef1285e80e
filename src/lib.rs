#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Request Batcher
//!
//! Adaptive batching core for expensive downstream calls.
//!
//! ## Overview
//!
//! Many independent producers submit work concurrently. The batcher groups those
//! submissions and hands each group to a single downstream call (a model
//! inference backend, a bulk API, a database round trip), trading a bounded amount
//! of added latency per request for far fewer calls.
//!
//! ## Key Features
//!
//! - **Latency ceiling**: no item waits longer than `max_wait_ms` plus one batch execution
//! - **Priority ordering**: higher-priority items leave the queue first, ties in submission order
//! - **Adaptive tuning**: batch size and wait follow queue depth through a hysteresis loop
//! - **Fail-closed delivery**: every item is resolved exactly once, including on shutdown
//! - **Bounded admission**: optional queue capacity with reject or block overflow
//!
//! ## Module Organization
//!
//! - [`batching`] - Queue, scheduler, executor, adaptive controller and the [`Batcher`] facade
//! - [`config`] - Layered configuration (defaults, YAML, environment)
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`constants`] - Defaults and environment variable names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use request_batcher::config::ConfigManager;
//! use request_batcher::{handler_fn, BatchFailure, Batcher, ItemResult};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! request_batcher::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//!
//! let handler = handler_fn(|payloads: Vec<u64>| async move {
//!     let results: Result<Vec<ItemResult<u64>>, BatchFailure> =
//!         Ok(payloads.into_iter().map(|p| Ok(p * 2)).collect());
//!     results
//! });
//! let batcher = Arc::new(Batcher::from_manager(&manager, handler)?);
//! batcher.start()?;
//!
//! let doubled = batcher.submit_with_priority(21, 5).await?;
//! println!("{doubled} / {}", serde_json::to_string(&batcher.stats())?);
//!
//! batcher.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod batching;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

pub use batching::{
    handler_fn, AdaptiveAction, BatchHandler, BatchId, BatchReport, Batcher, BatcherStats,
    ItemResult, MetricsSnapshot, SchedulerSummary, SubmitOptions, WorkItemId,
};
pub use config::{
    BatcherConfig, ConfigManager, ConfigurationError, OverflowPolicy, SchedulerConfig,
    ShutdownPolicy,
};
pub use error::{BatchFailure, BatcherError, ItemFailure, Result};
