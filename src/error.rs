//! # Batcher Error Types
//!
//! Structured error handling for the batching core using thiserror. Every work item
//! is resolved with either its result or exactly one of these errors.

use thiserror::Error;

use crate::batching::{BatchId, WorkItemId};
use crate::config::ConfigurationError;

/// Errors surfaced to callers of [`crate::Batcher`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatcherError {
    /// The batch call succeeded but this item's result was a failure
    #[error("Item {item_id} failed: {message}")]
    Item { item_id: WorkItemId, message: String },

    /// The downstream batch call itself failed; every item in the batch receives it
    #[error("Batch {batch_id} failed: {message}")]
    Batch { batch_id: BatchId, message: String },

    /// The batcher is stopping (or stopped) and the item was not executed
    #[error("Batcher is shutting down; item {item_id} was not executed")]
    Shutdown { item_id: WorkItemId },

    /// The caller stopped waiting for its own item
    #[error("Item {item_id} cancelled by caller after {waited_ms}ms")]
    Cancelled { item_id: WorkItemId, waited_ms: u64 },

    /// Bounded admission queue rejected the submission
    #[error("Admission queue full: {depth} pending, capacity {capacity}")]
    QueueFull { depth: usize, capacity: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BatcherError {
    /// True for a call-level failure shared by a whole batch
    pub fn is_batch_error(&self) -> bool {
        matches!(self, BatcherError::Batch { .. })
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, BatcherError::Shutdown { .. })
    }

    /// Whether a caller may reasonably resubmit. The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BatcherError::Batch { .. } | BatcherError::QueueFull { .. }
        )
    }
}

impl From<ConfigurationError> for BatcherError {
    fn from(err: ConfigurationError) -> Self {
        BatcherError::Configuration(err.to_string())
    }
}

/// Call-level failure reported by a [`crate::BatchHandler`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BatchFailure {
    pub message: String,
}

impl BatchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a single item inside an otherwise successful batch call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ItemFailure {
    pub message: String,
}

impl ItemFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BatcherError>;
