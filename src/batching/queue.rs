//! # Admission Queue
//!
//! Lock-protected holding area for pending work items and the sole authority on
//! which items leave together as a batch. Every mutation (enqueue, formation,
//! cancellation, drain) happens under one `parking_lot::Mutex`, so an item can
//! only ever be selected into a single batch.
//!
//! Items are stored in submission order. Batch selection without priority takes
//! from the front; with priority it picks the top `max_batch_size` by
//! `(priority desc, submission order asc)` and leaves the rest in order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::batch::Batch;
use super::work_item::{WorkItem, WorkItemId};
use crate::config::{OverflowPolicy, QueueConfig, SchedulerConfig};
use crate::error::{BatcherError, Result};

#[derive(Debug)]
struct QueueState<P, R> {
    items: VecDeque<WorkItem<P, R>>,
    next_sequence: u64,
    closed: bool,
}

/// Shared admission queue
#[derive(Debug)]
pub struct AdmissionQueue<P, R> {
    state: Mutex<QueueState<P, R>>,
    capacity: Option<usize>,
    overflow_policy: OverflowPolicy,
    /// One permit per free slot when the queue is bounded
    permits: Option<Arc<Semaphore>>,
}

impl<P, R> AdmissionQueue<P, R> {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                next_sequence: 0,
                closed: false,
            }),
            capacity: config.capacity,
            overflow_policy: config.overflow_policy,
            permits: config.capacity.map(|c| Arc::new(Semaphore::new(c))),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(&QueueConfig::default())
    }

    /// Reserve capacity for one item. Unbounded queues always succeed immediately;
    /// bounded queues reject or wait according to the overflow policy.
    pub async fn admit(&self, item_id: WorkItemId) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(permits) = &self.permits else {
            if self.is_closed() {
                return Err(BatcherError::Shutdown { item_id });
            }
            return Ok(None);
        };

        match self.overflow_policy {
            OverflowPolicy::Reject => match permits.clone().try_acquire_owned() {
                Ok(permit) => Ok(Some(permit)),
                Err(TryAcquireError::NoPermits) => Err(BatcherError::QueueFull {
                    depth: self.depth(),
                    capacity: self.capacity.unwrap_or_default(),
                }),
                Err(TryAcquireError::Closed) => Err(BatcherError::Shutdown { item_id }),
            },
            OverflowPolicy::Block => permits
                .clone()
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| BatcherError::Shutdown { item_id }),
        }
    }

    /// Append an item. Returns the depth after insertion, or a shutdown error
    /// once the queue has been closed.
    pub fn enqueue(&self, mut item: WorkItem<P, R>) -> Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BatcherError::Shutdown { item_id: item.id() });
        }
        item.sequence = state.next_sequence;
        state.next_sequence += 1;
        state.items.push_back(item);
        Ok(state.items.len())
    }

    /// Decide whether a batch is due and, if so, remove its items atomically
    pub fn try_form_batch(&self, config: &SchedulerConfig, now: Instant) -> Option<Batch<P, R>> {
        let mut state = self.state.lock();
        let pending = state.items.len();
        if pending == 0 {
            return None;
        }

        let max_batch_size = config.max_batch_size.max(1);
        let take = if pending >= max_batch_size {
            max_batch_size
        } else if pending >= config.min_batch_size {
            pending
        } else if state
            .items
            .front()
            .is_some_and(|oldest| oldest.age(now) >= config.max_wait())
        {
            trace!(pending, "QUEUE: Oldest item reached max wait, forcing undersized batch");
            pending
        } else {
            return None;
        };

        let items = Self::select(&mut state.items, take, config.priority_enabled);
        Some(Batch::new(items))
    }

    /// Remove up to `max_batch_size` items regardless of size or age thresholds
    pub fn force_batch(&self, config: &SchedulerConfig) -> Option<Batch<P, R>> {
        let mut state = self.state.lock();
        if state.items.is_empty() {
            return None;
        }
        let take = state.items.len().min(config.max_batch_size.max(1));
        let items = Self::select(&mut state.items, take, config.priority_enabled);
        Some(Batch::new(items))
    }

    fn select(
        items: &mut VecDeque<WorkItem<P, R>>,
        take: usize,
        priority_enabled: bool,
    ) -> Vec<WorkItem<P, R>> {
        let mut selected: Vec<WorkItem<P, R>> = if !priority_enabled {
            items.drain(..take).collect()
        } else if take == items.len() {
            let mut all: Vec<_> = items.drain(..).collect();
            all.sort_by_key(|item| (std::cmp::Reverse(item.priority()), item.sequence));
            all
        } else {
            // Rank by (priority desc, sequence asc) and keep the first `take` positions
            let mut ranked: Vec<(std::cmp::Reverse<i32>, u64, usize)> = items
                .iter()
                .enumerate()
                .map(|(idx, item)| (std::cmp::Reverse(item.priority()), item.sequence, idx))
                .collect();
            ranked.select_nth_unstable(take - 1);
            ranked.truncate(take);
            ranked.sort_unstable();

            let mut slots: Vec<Option<WorkItem<P, R>>> = items.drain(..).map(Some).collect();
            let chosen = ranked
                .iter()
                .filter_map(|&(_, _, idx)| slots[idx].take())
                .collect();
            items.extend(slots.into_iter().flatten());
            chosen
        };

        for item in &mut selected {
            item.release_admission();
        }
        selected
    }

    /// Earliest instant at which the oldest pending item hits `max_wait`
    pub fn next_deadline(&self, config: &SchedulerConfig) -> Option<Instant> {
        self.state
            .lock()
            .items
            .front()
            .map(|oldest| oldest.submitted_at() + config.max_wait())
    }

    /// Remove a still-pending item by id (O(n)); `None` if it was already batched
    pub fn remove(&self, item_id: WorkItemId) -> Option<WorkItem<P, R>> {
        let mut state = self.state.lock();
        let position = state.items.iter().position(|item| item.id() == item_id)?;
        let mut item = state.items.remove(position)?;
        item.release_admission();
        debug!(item_id = %item_id, "QUEUE: Removed cancelled item");
        Some(item)
    }

    /// Stop admitting items. Producers blocked on capacity are released with a
    /// shutdown error.
    pub fn close(&self) {
        self.state.lock().closed = true;
        if let Some(permits) = &self.permits {
            permits.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Remove every pending item, in submission order
    pub fn drain_all(&self) -> Vec<WorkItem<P, R>> {
        let mut state = self.state.lock();
        let mut drained: Vec<_> = state.items.drain(..).collect();
        for item in &mut drained {
            item.release_admission();
        }
        drained
    }

    pub fn depth(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
