//! The pipeline registry: queue/worker factory, start/join/shutdown.
//!
//! Grounded in `examples/original_source/src/pipeline_system.cpp` (`piper`'s
//! `pipeline_system`): `spawn_producer`/`spawn_transformer`/`spawn_consumer`
//! wire a new stage onto its queues synchronously, a routing id is assigned
//! from the requested [`RoutingPolicy`], and `start()` is the one place OS
//! threads actually come into being — by then every queue already knows
//! about every consumer and provider it will ever have, so there is no
//! window where a thread can observe a half-wired graph.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{JoinPanics, PipelineError};
use crate::message::Payload;
use crate::observer::{Observer, ObserverRegistry};
use crate::queue::{Queue, RoutingId, SHARED_POOL};
use crate::worker::{RoutingPolicy, Worker};

/// How often the visualization thread, when enabled, renders a dashboard
/// tick.
const OBSERVER_PERIOD: Duration = Duration::from_secs(1);

struct Handle {
    name: String,
    thread: std::thread::JoinHandle<()>,
}

/// Owns every queue and worker in a dataflow graph, and drives it from
/// construction through shutdown.
///
/// Stages are wired with `spawn_producer`/`spawn_transformer`/
/// `spawn_consumer` while the pipeline is unstarted; `start` spawns one OS
/// thread per stage and, if requested, a periodic stats-dashboard thread.
pub struct PipelineSystem {
    queues: Mutex<Vec<Arc<Queue>>>,
    pending: Mutex<Vec<Worker>>,
    handles: Mutex<Vec<Handle>>,
    observer_registry: Arc<ObserverRegistry>,
    observer: Mutex<Option<Observer>>,
    pipeline_active: Arc<AtomicBool>,
    started: AtomicBool,
    stage_counter: AtomicU64,
    routing_counter: AtomicU64,
    visualize: bool,
}

impl PipelineSystem {
    /// Creates an empty, unstarted pipeline. When `visualize` is true,
    /// `start` also spawns a thread that renders a plain-text stats
    /// dashboard to stdout roughly once a second.
    pub fn new(visualize: bool) -> Self {
        Self {
            queues: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            observer_registry: Arc::new(ObserverRegistry::new()),
            observer: Mutex::new(None),
            pipeline_active: Arc::new(AtomicBool::new(true)),
            started: AtomicBool::new(false),
            stage_counter: AtomicU64::new(0),
            routing_counter: AtomicU64::new(SHARED_POOL + 1),
            visualize,
        }
    }

    fn next_name(&self, prefix: &str) -> String {
        let n = self.stage_counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }

    fn routing_id(&self, policy: RoutingPolicy) -> RoutingId {
        match policy {
            RoutingPolicy::SamePool => SHARED_POOL,
            RoutingPolicy::SameWorkload => self.routing_counter.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Creates a new bounded queue, registered with this pipeline's stats
    /// registry and liveness flag.
    pub fn create_queue(&self, name: impl Into<String>, capacity: usize) -> Result<Arc<Queue>, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::ZeroCapacity);
        }
        let queue = Queue::new(
            name.into(),
            capacity,
            Arc::clone(&self.pipeline_active),
            Arc::clone(&self.observer_registry),
        );
        self.queues.lock().push(Arc::clone(&queue));
        Ok(queue)
    }

    fn ensure_not_started(&self) -> Result<(), PipelineError> {
        if self.started.load(Ordering::Acquire) {
            Err(PipelineError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    /// Wires a producer stage: registers it as a provider of `output` and
    /// queues its thread for creation at `start`. `callback` is polled
    /// until it returns `None`, which ends the stage.
    pub fn spawn_producer(
        &self,
        name: Option<String>,
        output: &Arc<Queue>,
        callback: impl FnMut() -> Option<Payload> + Send + 'static,
    ) -> Result<(), PipelineError> {
        self.ensure_not_started()?;
        let name = name.unwrap_or_else(|| self.next_name("producer"));
        let liveness = Arc::new(AtomicBool::new(true));
        output.register_provider(Arc::clone(&liveness));
        let worker = Worker::producer(name, liveness, Arc::clone(output), Arc::clone(&self.observer_registry), callback);
        self.pending.lock().push(worker);
        Ok(())
    }

    /// Wires a transformer stage between `input` and `output`. `policy`
    /// decides whether it shares `input`'s shared-pool id with its
    /// siblings or gets a fresh broadcast id. `callback` returning `None`
    /// skips that message rather than forwarding it.
    pub fn spawn_transformer(
        &self,
        name: Option<String>,
        input: &Arc<Queue>,
        policy: RoutingPolicy,
        output: &Arc<Queue>,
        callback: impl FnMut(Payload) -> Option<Payload> + Send + 'static,
    ) -> Result<(), PipelineError> {
        self.ensure_not_started()?;
        let name = name.unwrap_or_else(|| self.next_name("transformer"));
        let routing_id = self.routing_id(policy);
        input.register_consumer(routing_id);
        let liveness = Arc::new(AtomicBool::new(true));
        output.register_provider(Arc::clone(&liveness));
        let worker = Worker::transformer(
            name,
            liveness,
            Arc::clone(input),
            routing_id,
            Arc::clone(output),
            Arc::clone(&self.observer_registry),
            callback,
        );
        self.pending.lock().push(worker);
        Ok(())
    }

    /// Wires a consumer stage on `input`. See `spawn_transformer` for the
    /// meaning of `policy`.
    pub fn spawn_consumer(
        &self,
        name: Option<String>,
        input: &Arc<Queue>,
        policy: RoutingPolicy,
        callback: impl FnMut(Payload) + Send + 'static,
    ) -> Result<(), PipelineError> {
        self.ensure_not_started()?;
        let name = name.unwrap_or_else(|| self.next_name("consumer"));
        let routing_id = self.routing_id(policy);
        input.register_consumer(routing_id);
        let worker = Worker::consumer(
            name,
            Arc::new(AtomicBool::new(true)),
            Arc::clone(input),
            routing_id,
            Arc::clone(&self.observer_registry),
            callback,
        );
        self.pending.lock().push(worker);
        Ok(())
    }

    /// Spawns one OS thread per wired stage (and, if requested, the
    /// dashboard thread). Idempotent: a second call is a no-op. When
    /// `auto_join` is true, blocks until every worker has finished and
    /// returns `join`'s result; when false, returns immediately and the
    /// caller is responsible for calling `join` later.
    pub fn start(&self, auto_join: bool) -> Result<(), PipelineError> {
        if !self.started.swap(true, Ordering::AcqRel) {
            if self.visualize {
                let observer = Observer::spawn(Arc::clone(&self.observer_registry), OBSERVER_PERIOD, std::io::stdout());
                *self.observer.lock() = Some(observer);
            }
            let workers = std::mem::take(&mut *self.pending.lock());
            let mut handles = self.handles.lock();
            for worker in workers {
                let name = worker.name().to_string();
                let thread = std::thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || worker.run())
                    .expect("failed to spawn worker thread");
                handles.push(Handle { name, thread });
            }
        }
        if auto_join {
            self.join()
        } else {
            Ok(())
        }
    }

    /// Blocks until every worker thread has exited. Returns
    /// [`PipelineError::JoinPanicked`] naming every stage whose thread
    /// panicked past its `catch_unwind` boundary.
    pub fn join(&self) -> Result<(), PipelineError> {
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut panicked = Vec::new();
        for handle in handles {
            if handle.thread.join().is_err() {
                panicked.push(handle.name);
            }
        }
        if panicked.is_empty() {
            Ok(())
        } else {
            let count = panicked.len();
            Err(PipelineError::JoinPanicked(count, JoinPanics(panicked)))
        }
    }

    /// Whether the pipeline has been asked to shut down.
    pub fn is_active(&self) -> bool {
        self.pipeline_active.load(Ordering::Acquire)
    }

    /// Requests shutdown: every queue stops accepting new waits and wakes
    /// its blocked threads, which then unwind their loops and exit. Does
    /// not itself join worker threads; call `join` afterwards for that.
    pub fn shutdown(&self) {
        self.pipeline_active.store(false, Ordering::Release);
        for queue in self.queues.lock().iter() {
            queue.notify_shutdown();
        }
    }
}

impl Drop for PipelineSystem {
    fn drop(&mut self) {
        self.shutdown();
        // The observer thread is ours to join; worker threads are the
        // caller's responsibility via `join`, same as std::thread::JoinHandle.
        self.observer.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{downcast_ref, wrap};
    use std::sync::Mutex as StdMutex;

    #[test]
    fn identity_pipeline_delivers_every_item_in_order() {
        let pipeline = PipelineSystem::new(false);
        let input = pipeline.create_queue("in", 4).unwrap();
        let output = pipeline.create_queue("out", 4).unwrap();

        let mut remaining = vec![1, 2, 3, 4, 5];
        remaining.reverse();
        pipeline
            .spawn_producer(Some("producer".into()), &input, move || remaining.pop().map(wrap))
            .unwrap();
        pipeline
            .spawn_transformer(Some("identity".into()), &input, RoutingPolicy::SamePool, &output, Some)
            .unwrap();

        let collected = Arc::new(StdMutex::new(Vec::new()));
        let collected_clone = Arc::clone(&collected);
        pipeline
            .spawn_consumer(Some("consumer".into()), &output, RoutingPolicy::SamePool, move |payload| {
                collected_clone.lock().unwrap().push(*downcast_ref::<i32>(&payload).unwrap());
            })
            .unwrap();

        pipeline.start(true).unwrap();

        assert_eq!(*collected.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn broadcast_fan_out_reaches_every_distinct_consumer() {
        let pipeline = PipelineSystem::new(false);
        let input = pipeline.create_queue("in", 4).unwrap();

        let mut remaining = vec![1, 2, 3];
        remaining.reverse();
        pipeline
            .spawn_producer(Some("producer".into()), &input, move || remaining.pop().map(wrap))
            .unwrap();

        let totals: Vec<Arc<StdMutex<i32>>> = (0..3).map(|_| Arc::new(StdMutex::new(0))).collect();
        for total in &totals {
            let total = Arc::clone(total);
            pipeline
                .spawn_consumer(None, &input, RoutingPolicy::SameWorkload, move |payload| {
                    *total.lock().unwrap() += *downcast_ref::<i32>(&payload).unwrap();
                })
                .unwrap();
        }

        pipeline.start(true).unwrap();

        for total in &totals {
            assert_eq!(*total.lock().unwrap(), 6);
        }
    }

    #[test]
    fn spawning_after_start_is_rejected() {
        let pipeline = PipelineSystem::new(false);
        let queue = pipeline.create_queue("q", 4).unwrap();
        pipeline.start(true).unwrap();
        let result = pipeline.spawn_consumer(None, &queue, RoutingPolicy::SamePool, |_| {});
        assert!(matches!(result, Err(PipelineError::AlreadyStarted)));
    }

    #[test]
    fn zero_capacity_queue_is_rejected() {
        let pipeline = PipelineSystem::new(false);
        assert!(matches!(pipeline.create_queue("q", 0), Err(PipelineError::ZeroCapacity)));
    }
}
