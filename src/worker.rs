//! Stage workers: the producer/transformer/consumer main loops.
//!
//! Grounded in `examples/original_source/src/node.cpp` (`piper`'s `node`):
//! a worker's role is inferred from which queues it was wired to (no input
//! queue means producer, no output queue means consumer, both means
//! transformer), and its main loop shape follows directly from that role.
//! Every callback invocation runs under `catch_unwind` so a panicking
//! producer/transformer/consumer closure ends its stage the same way a
//! clean end-of-stream does, logged instead of propagated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::message::Payload;
use crate::observer::ObserverRegistry;
use crate::queue::{Queue, RoutingId};

/// A stage's role, inferred from its wiring at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Transformer,
    Consumer,
}

/// How a stage's routing id relates to its sibling workers on the same
/// input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Shares [`crate::queue::SHARED_POOL`] with every other `same_pool`
    /// sibling; each item is delivered to exactly one of them.
    SamePool,
    /// Holds a distinct id; every item pushed to the queue is delivered to
    /// it independently of its siblings (broadcast/fan-out).
    SameWorkload,
}

enum Body {
    Producer(Box<dyn FnMut() -> Option<Payload> + Send>),
    Transformer(Box<dyn FnMut(Payload) -> Option<Payload> + Send>),
    Consumer(Box<dyn FnMut(Payload) + Send>),
}

struct Input {
    queue: Arc<Queue>,
    routing_id: RoutingId,
}

/// One stage: a callback plus its wiring. Built by
/// [`crate::pipeline::PipelineSystem`]'s `spawn_*` methods, run on its own
/// OS thread by [`Worker::run`].
pub struct Worker {
    name: String,
    liveness: Arc<AtomicBool>,
    input: Option<Input>,
    output: Option<Arc<Queue>>,
    observer: Arc<ObserverRegistry>,
    body: Body,
}

impl Worker {
    pub(crate) fn producer(
        name: String,
        liveness: Arc<AtomicBool>,
        output: Arc<Queue>,
        observer: Arc<ObserverRegistry>,
        callback: impl FnMut() -> Option<Payload> + Send + 'static,
    ) -> Self {
        observer.register_worker(&name);
        Self {
            name,
            liveness,
            input: None,
            output: Some(output),
            observer,
            body: Body::Producer(Box::new(callback)),
        }
    }

    pub(crate) fn transformer(
        name: String,
        liveness: Arc<AtomicBool>,
        input: Arc<Queue>,
        routing_id: RoutingId,
        output: Arc<Queue>,
        observer: Arc<ObserverRegistry>,
        callback: impl FnMut(Payload) -> Option<Payload> + Send + 'static,
    ) -> Self {
        observer.register_worker(&name);
        Self {
            name,
            liveness,
            input: Some(Input { queue: input, routing_id }),
            output: Some(output),
            observer,
            body: Body::Transformer(Box::new(callback)),
        }
    }

    pub(crate) fn consumer(
        name: String,
        liveness: Arc<AtomicBool>,
        input: Arc<Queue>,
        routing_id: RoutingId,
        observer: Arc<ObserverRegistry>,
        callback: impl FnMut(Payload) + Send + 'static,
    ) -> Self {
        observer.register_worker(&name);
        Self {
            name,
            liveness,
            input: Some(Input { queue: input, routing_id }),
            output: None,
            observer,
            body: Body::Consumer(Box::new(callback)),
        }
    }

    pub fn role(&self) -> Role {
        match &self.body {
            Body::Producer(_) => Role::Producer,
            Body::Transformer(_) => Role::Transformer,
            Body::Consumer(_) => Role::Consumer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs this stage's main loop to completion, then cascades shutdown:
    /// marks itself inactive and probes its output queue for termination
    /// so downstream stages wake up and notice their provider is gone.
    pub fn run(mut self) {
        tracing::debug!(stage = %self.name, "worker starting");
        match &mut self.body {
            Body::Producer(callback) => Self::run_producer(&self.name, callback, self.output.as_deref(), &self.observer),
            Body::Transformer(callback) => Self::run_transformer(
                &self.name,
                callback,
                self.input.as_ref().expect("transformer has an input"),
                self.output.as_deref(),
                &self.observer,
            ),
            Body::Consumer(callback) => {
                Self::run_consumer(&self.name, callback, self.input.as_ref().expect("consumer has an input"), &self.observer)
            }
        }
        self.liveness.store(false, Ordering::Release);
        if let Some(output) = &self.output {
            output.probe_terminate();
        }
        tracing::debug!(stage = %self.name, "worker stopped");
    }

    fn run_producer(
        name: &str,
        callback: &mut (dyn FnMut() -> Option<Payload> + Send),
        output: Option<&Queue>,
        observer: &ObserverRegistry,
    ) {
        let output = output.expect("producer has an output");
        loop {
            if !output.should_keep_running() {
                break;
            }
            let produced = catch_unwind(AssertUnwindSafe(|| callback()));
            let item = match produced {
                Ok(item) => item,
                Err(_) => {
                    tracing::error!(stage = %name, "producer callback panicked");
                    break;
                }
            };
            match item {
                Some(payload) => {
                    output.push(payload);
                    observer.record_op(name);
                }
                None => break,
            }
        }
    }

    fn run_transformer(
        name: &str,
        callback: &mut (dyn FnMut(Payload) -> Option<Payload> + Send),
        input: &Input,
        output: Option<&Queue>,
        observer: &ObserverRegistry,
    ) {
        let output = output.expect("transformer has an output");
        loop {
            input.queue.sleep_until_items_available(input.routing_id);
            let Some(received) = input.queue.pop(input.routing_id) else {
                break;
            };
            let transformed = catch_unwind(AssertUnwindSafe(|| callback(received)));
            match transformed {
                Ok(result) => {
                    observer.record_op(name);
                    if let Some(payload) = result {
                        output.push(payload);
                    }
                }
                Err(_) => {
                    tracing::error!(stage = %name, "transformer callback panicked");
                    break;
                }
            }
        }
    }

    fn run_consumer(
        name: &str,
        callback: &mut (dyn FnMut(Payload) + Send),
        input: &Input,
        observer: &ObserverRegistry,
    ) {
        loop {
            input.queue.sleep_until_items_available(input.routing_id);
            let Some(received) = input.queue.pop(input.routing_id) else {
                break;
            };
            let result = catch_unwind(AssertUnwindSafe(|| callback(received)));
            match result {
                Ok(()) => observer.record_op(name),
                Err(_) => {
                    tracing::error!(stage = %name, "consumer callback panicked");
                    break;
                }
            }
        }
    }
}
