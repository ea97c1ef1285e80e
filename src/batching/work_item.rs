//! # Work Items
//!
//! One caller-submitted unit of work plus its single-assignment completion slot.
//! The slot wraps a `tokio::sync::oneshot` sender and is consumed on use, so an
//! item can be completed at most once by construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::BatcherError;

/// Unique identifier for a submitted work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(Uuid);

impl WorkItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Final state delivered to the submitting caller
pub type ItemOutcome<R> = std::result::Result<R, BatcherError>;

/// Single-assignment result slot
pub struct Completion<R> {
    sender: oneshot::Sender<ItemOutcome<R>>,
}

impl<R> Completion<R> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<ItemOutcome<R>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Resolve the slot. Returns `false` when the waiter has already gone away,
    /// in which case the outcome is discarded.
    pub fn complete(self, outcome: ItemOutcome<R>) -> bool {
        self.sender.send(outcome).is_ok()
    }
}

/// A pending unit of work owned by the admission queue until batched
pub struct WorkItem<P, R> {
    id: WorkItemId,
    payload: P,
    submitted_at: Instant,
    priority: i32,
    /// Assigned by the admission queue; breaks ties between equal instants
    pub(crate) sequence: u64,
    completion: Completion<R>,
    /// Queue capacity held while the item is pending
    admission: Option<OwnedSemaphorePermit>,
}

impl<P, R> WorkItem<P, R> {
    /// Create an item and the receiver its submitter waits on
    pub fn new(
        id: WorkItemId,
        payload: P,
        priority: i32,
    ) -> (Self, oneshot::Receiver<ItemOutcome<R>>) {
        let (completion, receiver) = Completion::channel();
        let item = Self {
            id,
            payload,
            submitted_at: Instant::now(),
            priority,
            sequence: 0,
            completion,
            admission: None,
        };
        (item, receiver)
    }

    pub(crate) fn with_admission(mut self, permit: Option<OwnedSemaphorePermit>) -> Self {
        self.admission = permit;
        self
    }

    /// Give back queue capacity once the item leaves the queue
    pub(crate) fn release_admission(&mut self) {
        self.admission.take();
    }

    pub fn id(&self) -> WorkItemId {
        self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }

    /// Split into the pieces the executor needs
    pub fn into_parts(self) -> (WorkItemId, P, Completion<R>) {
        (self.id, self.payload, self.completion)
    }

    /// Resolve this item with an error without executing it
    pub fn fail(self, error: BatcherError) -> bool {
        self.completion.complete(Err(error))
    }
}

impl<P, R> fmt::Debug for WorkItem<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("age_ms", &self.submitted_at.elapsed().as_millis())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_delivers_once() {
        let (item, receiver) = WorkItem::<&str, usize>::new(WorkItemId::new(), "hello", 3);
        assert_eq!(item.priority(), 3);
        assert_eq!(*item.payload(), "hello");

        let (_, payload, completion) = item.into_parts();
        assert!(completion.complete(Ok(payload.len())));
        assert_eq!(receiver.await.unwrap(), Ok(5));
    }

    #[tokio::test]
    async fn test_abandoned_completion_is_discarded() {
        let (item, receiver) = WorkItem::<(), ()>::new(WorkItemId::new(), (), 0);
        drop(receiver);
        let (_, _, completion) = item.into_parts();
        assert!(!completion.complete(Ok(())));
    }

    #[tokio::test]
    async fn test_fail_delivers_error() {
        let id = WorkItemId::new();
        let (item, receiver) = WorkItem::<(), ()>::new(id, (), 0);
        assert!(item.fail(BatcherError::Shutdown { item_id: id }));
        assert_eq!(
            receiver.await.unwrap(),
            Err(BatcherError::Shutdown { item_id: id })
        );
    }
}
