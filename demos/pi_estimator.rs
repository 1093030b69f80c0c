//! Estimates pi via Monte Carlo circle sampling: a producer emits random
//! (x, y) points in the unit square, a transformer slowed down by a small
//! sleep (standing in for real work) tags each with whether it falls
//! inside the inscribed circle, and a consumer accumulates the running
//! estimate. Ported from `examples/original_source/example.cpp`.

use std::time::Duration;

use staged_pipeline::typed::{typed_consumer, typed_producer, typed_transformer};
use staged_pipeline::PipelineSystem;

struct RandomXy {
    x: f64,
    y: f64,
}

struct InCircle {
    value: bool,
}

/// A small xorshift64* generator; good enough for sampling, no external
/// dependency required.
struct Rng(u64);

impl Rng {
    fn next_unit(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

const SAMPLE_COUNT: usize = 2000;

fn main() {
    let pipeline = PipelineSystem::new(false);
    let points = pipeline.create_queue("points", 5).unwrap();
    let results = pipeline.create_queue("results", 5).unwrap();

    let mut rng = Rng(0x2545F4914F6CDD1D);
    let mut remaining = SAMPLE_COUNT;
    pipeline
        .spawn_producer(
            Some("sampler".into()),
            &points,
            typed_producer(move || {
                if remaining == 0 {
                    return None;
                }
                remaining -= 1;
                Some(RandomXy { x: rng.next_unit(), y: rng.next_unit() })
            }),
        )
        .unwrap();

    pipeline
        .spawn_transformer(
            Some("circle_check".into()),
            &points,
            staged_pipeline::RoutingPolicy::SamePool,
            &results,
            typed_transformer(|point: &RandomXy| {
                std::thread::sleep(Duration::from_millis(1));
                let dist = ((point.x - 0.5).powi(2) + (point.y - 0.5).powi(2)).sqrt();
                Some(InCircle { value: dist <= 0.5 })
            }),
        )
        .unwrap();

    let mut inside = 0u64;
    let mut total = 0u64;
    pipeline
        .spawn_consumer(
            Some("estimator".into()),
            &results,
            staged_pipeline::RoutingPolicy::SamePool,
            typed_consumer(move |result: &InCircle| {
                total += 1;
                if result.value {
                    inside += 1;
                }
                if total % 200 == 0 || total as usize == SAMPLE_COUNT {
                    println!("estimated pi after {total} samples: {}", 4.0 * (inside as f64 / total as f64));
                }
            }),
        )
        .unwrap();

    pipeline.start(true).expect("pipeline threads panicked");
}
