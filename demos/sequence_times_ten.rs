//! Generates a sequence of jobs, doubles each one, then fans the doubled
//! jobs out across three `same_pool` workers that square the original
//! input, and prints the final message. Ported from
//! `examples/original_source/main.cpp`.

use staged_pipeline::typed::{typed_consumer, typed_producer, typed_transformer};
use staged_pipeline::{PipelineSystem, RoutingPolicy};

struct Job {
    input: i64,
    doubled: i64,
}

struct FinalJob {
    msg: String,
}

const MAX: i64 = 30;

fn main() {
    let pipeline = PipelineSystem::new(false);
    let jobs = pipeline.create_queue("jobs", 5).unwrap();
    let jobs_processed = pipeline.create_queue("jobs_processed", 5).unwrap();
    let jobs_collected = pipeline.create_queue("jobs_collected", 5).unwrap();

    let mut counter = 1i64;
    pipeline
        .spawn_producer(
            None,
            &jobs,
            typed_producer(move || {
                if counter > MAX {
                    return None;
                }
                let job = Job { input: counter, doubled: 0 };
                counter += 1;
                Some(job)
            }),
        )
        .unwrap();

    pipeline
        .spawn_transformer(
            None,
            &jobs,
            RoutingPolicy::SamePool,
            &jobs_processed,
            typed_transformer(|job: &Job| Some(Job { input: job.input, doubled: 2 * job.input })),
        )
        .unwrap();

    for worker in ["worker 1", "worker 2", "worker 3"] {
        pipeline
            .spawn_transformer(
                Some(worker.into()),
                &jobs_processed,
                RoutingPolicy::SamePool,
                &jobs_collected,
                typed_transformer(|job: &Job| {
                    let squared = job.input * job.input;
                    Some(FinalJob {
                        msg: format!("FINAL JOB RESULT: {} * {} ==== {}", job.doubled, job.doubled, squared),
                    })
                }),
            )
            .unwrap();
    }

    pipeline
        .spawn_consumer(
            Some("consumer".into()),
            &jobs_collected,
            RoutingPolicy::SamePool,
            typed_consumer(|job: &FinalJob| println!("{}", job.msg)),
        )
        .unwrap();

    pipeline.start(true).expect("pipeline threads panicked");
}
