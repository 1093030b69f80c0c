//! Queue push/pop throughput under a single shared-pool consumer and under
//! a three-way broadcast, mirroring the `spsc`/`mpmc` comparisons in the
//! teacher's original (nightly-only) bench harness but ported onto
//! `criterion` for stable-toolchain use.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use staged_pipeline::message::wrap;
use staged_pipeline::observer::ObserverRegistry;
use staged_pipeline::queue::{Queue, SHARED_POOL};

fn shared_pool_push_pop(c: &mut Criterion) {
    c.bench_function("queue/shared_pool_push_pop", |b| {
        b.iter_batched(
            || {
                let pipeline_active = Arc::new(AtomicBool::new(true));
                let observer = Arc::new(ObserverRegistry::new());
                let queue = Queue::new("bench".into(), 1024, pipeline_active, observer);
                queue.register_consumer(SHARED_POOL);
                queue
            },
            |queue| {
                for i in 0..1024i32 {
                    queue.push(wrap(i));
                }
                for _ in 0..1024 {
                    queue.pop(SHARED_POOL);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn broadcast_push_pop(c: &mut Criterion) {
    c.bench_function("queue/broadcast_push_pop_3_consumers", |b| {
        b.iter_batched(
            || {
                let pipeline_active = Arc::new(AtomicBool::new(true));
                let observer = Arc::new(ObserverRegistry::new());
                let queue = Queue::new("bench".into(), 1024, pipeline_active, observer);
                queue.register_consumer(1);
                queue.register_consumer(2);
                queue.register_consumer(3);
                queue
            },
            |queue| {
                for i in 0..256i32 {
                    queue.push(wrap(i));
                }
                for id in [1, 2, 3] {
                    for _ in 0..256 {
                        queue.pop(id);
                    }
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, shared_pool_push_pop, broadcast_push_pop);
criterion_main!(benches);
