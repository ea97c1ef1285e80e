use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use tokio::time::Instant;

use request_batcher::batching::{AdmissionQueue, WorkItem};
use request_batcher::{
    handler_fn, BatchFailure, Batcher, BatcherConfig, ItemResult, SchedulerConfig, WorkItemId,
};

fn filled_queue(items: usize) -> AdmissionQueue<u64, u64> {
    let queue = AdmissionQueue::unbounded();
    for n in 0..items {
        let (item, receiver) = WorkItem::new(WorkItemId::new(), n as u64, (n % 7) as i32);
        drop(receiver);
        let _ = queue.enqueue(item);
    }
    queue
}

fn benchmark_priority_formation(c: &mut Criterion) {
    let config = SchedulerConfig {
        max_batch_size: 20,
        ..SchedulerConfig::default()
    };
    c.bench_function("priority_batch_formation_1000_pending", |b| {
        b.iter_batched(
            || filled_queue(1_000),
            |queue| black_box(queue.try_form_batch(&config, Instant::now())),
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_fifo_formation(c: &mut Criterion) {
    let config = SchedulerConfig {
        max_batch_size: 20,
        priority_enabled: false,
        ..SchedulerConfig::default()
    };
    c.bench_function("fifo_batch_formation_1000_pending", |b| {
        b.iter_batched(
            || filled_queue(1_000),
            |queue| black_box(queue.try_form_batch(&config, Instant::now())),
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_submit_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut config = BatcherConfig::default();
    config.adaptive.enabled = false;
    config.scheduler.max_wait_ms = 1;

    c.bench_function("submit_1000_concurrent", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let handler = handler_fn(|payloads: Vec<u64>| async move {
                    let results: Result<Vec<ItemResult<u64>>, BatchFailure> =
                        Ok(payloads.into_iter().map(Ok).collect());
                    results
                });
                let batcher = Arc::new(Batcher::new(config.clone(), handler).unwrap());
                batcher.start().unwrap();

                let handles: Vec<_> = (0..1_000u64)
                    .map(|n| {
                        let batcher = batcher.clone();
                        tokio::spawn(async move { batcher.submit(n).await })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
                batcher.stop().await.unwrap();
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_priority_formation,
    benchmark_fifo_formation,
    benchmark_submit_throughput
);
criterion_main!(benches);
