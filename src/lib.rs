//! A staged dataflow runtime for in-process pipelines.
//!
//! Stages (producers, transformers, consumers) are connected by bounded,
//! multi-consumer [`Queue`]s and run concurrently on their own OS threads.
//! A queue dispatches each pushed item to every consumer id registered on
//! it at push time: consumers sharing [`SHARED_POOL`] compete for the same
//! items (work-sharing), consumers holding a distinct id each get their
//! own copy (broadcast). Backpressure blocks a full queue's producer-side
//! pushers; end-of-stream cascades downstream automatically once every
//! upstream provider of a queue has gone inactive.
//!
//! ```no_run
//! use staged_pipeline::{PipelineSystem, RoutingPolicy};
//! use staged_pipeline::typed::{typed_consumer, typed_producer};
//!
//! let pipeline = PipelineSystem::new(false);
//! let queue = pipeline.create_queue("numbers", 16).unwrap();
//!
//! let mut remaining = (0..10).rev().collect::<Vec<i32>>();
//! pipeline
//!     .spawn_producer(None, &queue, typed_producer(move || remaining.pop()))
//!     .unwrap();
//! pipeline
//!     .spawn_consumer(None, &queue, RoutingPolicy::SamePool, typed_consumer(|n: &i32| {
//!         println!("{n}");
//!     }))
//!     .unwrap();
//!
//! pipeline.start(true).unwrap();
//! ```

pub mod error;
pub mod message;
pub mod observer;
pub mod pipeline;
pub mod queue;
pub mod typed;
pub mod worker;

pub use error::PipelineError;
pub use message::{downcast_ref, wrap, Payload};
pub use observer::{ObserverRegistry, StageKind, StageSnapshot};
pub use pipeline::PipelineSystem;
pub use queue::{Queue, RoutingId, SHARED_POOL};
pub use worker::{Role, RoutingPolicy, Worker};
