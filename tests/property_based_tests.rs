mod common;

use common::strategies::*;
use proptest::prelude::*;
use std::collections::HashSet;
use tokio::time::Instant;

use request_batcher::batching::{AdmissionQueue, WorkItem};
use request_batcher::WorkItemId;

/// Enqueue one item per priority; payload is the submission index
fn queue_with(priorities: &[i32]) -> AdmissionQueue<usize, ()> {
    let queue = AdmissionQueue::unbounded();
    for (index, &priority) in priorities.iter().enumerate() {
        let (item, receiver) = WorkItem::new(WorkItemId::new(), index, priority);
        drop(receiver);
        queue.enqueue(item).unwrap();
    }
    queue
}

proptest! {
    /// Property: Draining the queue batch by batch never exceeds max size and
    /// hands out every item exactly once
    #[test]
    fn formed_batches_respect_size_and_never_duplicate(
        priorities in priorities_strategy(),
        config in scheduler_config_strategy(),
    ) {
        let queue = queue_with(&priorities);
        let mut seen = HashSet::new();

        while let Some(batch) = queue.force_batch(&config) {
            prop_assert!(batch.len() <= config.max_batch_size);
            prop_assert!(!batch.is_empty());
            for item in batch.items() {
                prop_assert!(seen.insert(*item.payload()), "item {} batched twice", item.payload());
            }
        }
        prop_assert_eq!(seen.len(), priorities.len());
    }

    /// Property: With priority enabled, no item left behind outranks one selected
    #[test]
    fn priority_selection_takes_the_highest(
        priorities in priorities_strategy(),
        config in scheduler_config_strategy(),
    ) {
        let mut config = config;
        config.priority_enabled = true;
        let queue = queue_with(&priorities);

        if let Some(batch) = queue.try_form_batch(&config, Instant::now()) {
            let lowest_selected = batch.items().iter().map(|item| item.priority()).min().unwrap();
            let rest = queue.drain_all();
            for item in &rest {
                prop_assert!(item.priority() <= lowest_selected);
            }

            // Within the batch: priority descending, submission order on ties
            let order: Vec<(i32, usize)> = batch
                .items()
                .iter()
                .map(|item| (item.priority(), *item.payload()))
                .collect();
            for pair in order.windows(2) {
                let ((p0, i0), (p1, i1)) = (pair[0], pair[1]);
                prop_assert!(p0 > p1 || (p0 == p1 && i0 < i1), "bad order {:?}", order);
            }

            // Remaining items keep submission order
            let indices: Vec<usize> = rest.iter().map(|item| *item.payload()).collect();
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        }
    }

    /// Property: Without priority, batches are a FIFO prefix of the queue
    #[test]
    fn fifo_selection_takes_the_oldest(
        priorities in priorities_strategy(),
        config in scheduler_config_strategy(),
    ) {
        let mut config = config;
        config.priority_enabled = false;
        let queue = queue_with(&priorities);

        let mut expected = 0usize;
        while let Some(batch) = queue.force_batch(&config) {
            for item in batch.items() {
                prop_assert_eq!(*item.payload(), expected);
                expected += 1;
            }
        }
    }

    /// Property: A batch is due exactly when size or age thresholds say so
    #[test]
    fn formation_follows_thresholds(
        pending in 1usize..40,
        config in scheduler_config_strategy(),
    ) {
        let queue = queue_with(&vec![0; pending]);
        let now = Instant::now();

        let formed = queue.try_form_batch(&config, now);
        if pending >= config.min_batch_size {
            let batch = formed.unwrap();
            prop_assert_eq!(batch.len(), pending.min(config.max_batch_size));
        } else {
            prop_assert!(formed.is_none());
            prop_assert_eq!(queue.depth(), pending);

            let late = now + config.max_wait();
            let batch = queue.try_form_batch(&config, late).unwrap();
            prop_assert_eq!(batch.len(), pending);
        }
    }
}
