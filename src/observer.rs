//! Read-only stats sampler and the registry its setters write into.
//!
//! Grounded in `examples/original_source/src/stats.cpp` (`piper`'s `stats`
//! class): one mutex guards one map from stage name to a small record,
//! setters are called from queue/worker code on every state change, and a
//! periodic thread renders the whole table as plain text. The teacher
//! (`fedemagnani-veloce`) cache-pads its hot atomics to avoid false sharing
//! between producer/consumer threads (see `src/spsc/mod.rs`'s module docs);
//! the same concern applies here since every worker thread increments its
//! own operation counter on every message, so each counter gets its own
//! cache line via `crossbeam_utils::CachePadded`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

/// Whether a named record describes a queue or a worker stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Queue,
    Worker,
}

/// The read side of a single stage's record, as rendered by the dashboard.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub name: String,
    pub kind: StageKind,
    pub sleeping_not_full: bool,
    pub sleeping_not_empty: bool,
    pub size: usize,
    pub active: bool,
    pub op_count: u64,
}

struct StageRecord {
    kind: StageKind,
    sleeping_not_full: AtomicBool,
    sleeping_not_empty: AtomicBool,
    size: AtomicU64,
    active: AtomicBool,
    op_count: CachePadded<AtomicU64>,
}

impl StageRecord {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            sleeping_not_full: AtomicBool::new(false),
            sleeping_not_empty: AtomicBool::new(false),
            size: AtomicU64::new(0),
            active: AtomicBool::new(true),
            op_count: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn snapshot(&self, name: &str) -> StageSnapshot {
        StageSnapshot {
            name: name.to_string(),
            kind: self.kind,
            sleeping_not_full: self.sleeping_not_full.load(Ordering::Relaxed),
            sleeping_not_empty: self.sleeping_not_empty.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed) as usize,
            active: self.active.load(Ordering::Relaxed),
            op_count: self.op_count.load(Ordering::Relaxed),
        }
    }
}

/// The per-name records map, plus the registration order so the dashboard
/// renders stages in a stable, human-followable order.
struct Registry {
    records: HashMap<String, StageRecord>,
    order: Vec<String>,
}

/// Owns every stage's counters; read only by the observer thread, written
/// only through the setters below (called from queue/worker code).
pub struct ObserverRegistry {
    state: Mutex<Registry>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Registry {
                records: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    fn register(&self, name: &str, kind: StageKind) {
        let mut state = self.state.lock();
        if !state.records.contains_key(name) {
            state.order.push(name.to_string());
            state.records.insert(name.to_string(), StageRecord::new(kind));
        }
    }

    pub fn register_queue(&self, name: &str, _capacity: usize) {
        self.register(name, StageKind::Queue);
    }

    pub fn register_worker(&self, name: &str) {
        self.register(name, StageKind::Worker);
    }

    pub fn set_sleeping_not_full(&self, name: &str, value: bool) {
        if let Some(r) = self.state.lock().records.get(name) {
            r.sleeping_not_full.store(value, Ordering::Relaxed);
        }
    }

    pub fn set_sleeping_not_empty(&self, name: &str, value: bool) {
        if let Some(r) = self.state.lock().records.get(name) {
            r.sleeping_not_empty.store(value, Ordering::Relaxed);
        }
    }

    pub fn set_size(&self, name: &str, size: usize) {
        if let Some(r) = self.state.lock().records.get(name) {
            r.size.store(size as u64, Ordering::Relaxed);
        }
    }

    pub fn set_active(&self, name: &str, active: bool) {
        if let Some(r) = self.state.lock().records.get(name) {
            r.active.store(active, Ordering::Relaxed);
        }
    }

    /// Incremented once per `produce`/`transform`/`consume` callback
    /// invocation; the dashboard derives a per-tick rate from the delta.
    pub fn record_op(&self, name: &str) {
        if let Some(r) = self.state.lock().records.get(name) {
            r.op_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A consistent-enough snapshot of every stage, in registration order.
    pub fn snapshot_all(&self) -> Vec<StageSnapshot> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|name| state.records.get(name).map(|r| r.snapshot(name)))
            .collect()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders one dashboard tick as plain text, given the previous tick's
/// operation counts (for the per-stage rate column).
pub fn render(snapshots: &[StageSnapshot], previous_ops: &HashMap<String, u64>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- begin ---");
    for s in snapshots {
        let rate = s.op_count.saturating_sub(*previous_ops.get(&s.name).unwrap_or(&0));
        let _ = writeln!(out, "{}:", s.name);
        let _ = writeln!(out, "  active: {}", s.active);
        match s.kind {
            StageKind::Queue => {
                let _ = writeln!(out, "  items.size(): {}", s.size);
            }
            StageKind::Worker => {
                let _ = writeln!(out, "  sleep until not empty: {}", s.sleeping_not_empty);
                let _ = writeln!(out, "  sleep until not full: {}", s.sleeping_not_full);
            }
        }
        let _ = writeln!(out, "  ops: {} (+{}/tick)", s.op_count, rate);
    }
    let _ = writeln!(out, "---  end  ---");
    out
}

/// Drives the periodic sampler on its own OS thread until told to stop.
pub struct Observer {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Observer {
    /// Spawns the observer thread, which ticks roughly every `period` and
    /// writes the rendered dashboard to `writer`.
    pub fn spawn<W>(registry: Arc<ObserverRegistry>, period: Duration, mut writer: W) -> Self
    where
        W: std::io::Write + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_handle = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("pipeline-observer".into())
            .spawn(move || {
                let mut previous_ops: HashMap<String, u64> = HashMap::new();
                let (lock, cv) = &*stop_handle;
                let mut guard = lock.lock();
                loop {
                    let timed_out = cv.wait_for(&mut guard, period).timed_out();
                    if *guard {
                        break;
                    }
                    if !timed_out {
                        continue;
                    }
                    let snapshots = registry.snapshot_all();
                    let text = render(&snapshots, &previous_ops);
                    let _ = writer.write_all(text.as_bytes());
                    previous_ops = snapshots.into_iter().map(|s| (s.name, s.op_count)).collect();
                }
            })
            .expect("failed to spawn observer thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn request_stop(&self) {
        let (lock, cv) = &*self.stop;
        *lock.lock() = true;
        cv.notify_all();
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
