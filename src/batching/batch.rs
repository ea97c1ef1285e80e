//! # Batches
//!
//! A group of work items removed from the admission queue together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::work_item::{WorkItem, WorkItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Items that leave the queue and execute together
#[derive(Debug)]
pub struct Batch<P, R> {
    id: BatchId,
    items: Vec<WorkItem<P, R>>,
    formed_at: Instant,
    formed_at_utc: DateTime<Utc>,
}

impl<P, R> Batch<P, R> {
    pub(crate) fn new(items: Vec<WorkItem<P, R>>) -> Self {
        Self {
            id: BatchId::new(),
            items,
            formed_at: Instant::now(),
            formed_at_utc: Utc::now(),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem<P, R>] {
        &self.items
    }

    pub fn item_ids(&self) -> Vec<WorkItemId> {
        self.items.iter().map(WorkItem::id).collect()
    }

    pub fn formed_at(&self) -> Instant {
        self.formed_at
    }

    pub fn formed_at_utc(&self) -> DateTime<Utc> {
        self.formed_at_utc
    }

    /// Longest time any member spent in the queue before formation
    pub fn max_queue_wait(&self) -> Duration {
        self.items
            .iter()
            .map(|item| item.age(self.formed_at))
            .max()
            .unwrap_or_default()
    }

    pub(crate) fn into_items(self) -> Vec<WorkItem<P, R>> {
        self.items
    }
}

/// Execution record for one batch, produced by the executor
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub item_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Whether the whole downstream call failed
    pub batch_failed: bool,
    /// Completions whose waiter had already gone away
    pub discarded: usize,
    pub formed_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub cost_saved_pct: f64,
}
