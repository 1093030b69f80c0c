//! The bounded, multi-consumer queue — the core of the concurrency kernel.
//!
//! Each enqueued payload is tagged with the full set of consumer ids
//! registered at push time. A `pop(id)` call only ever removes `id` from
//! that item's pending set; the item itself is only dropped from the queue
//! once every id that was pending for it has popped. Consumers sharing id
//! `0` (the "shared pool" sentinel) therefore compete for the same items
//! (work-sharing); consumers with distinct ids each receive their own copy
//! (broadcast).
//!
//! Grounded in `examples/original_source/src/queue.cpp` (`piper`'s
//! `queue::push`/`pop`/`check_terminate`), reworked onto
//! `parking_lot::{Mutex, Condvar}` in the style of
//! `examples/snowdamiz-mesh-lang/crates/snow-rt/src/actor/mailbox.rs`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::message::Payload;
use crate::observer::ObserverRegistry;

/// Integer tag identifying which logical consumer a `pop` is for.
///
/// `0` is the shared-pool sentinel: any number of workers may register it,
/// and they compete for the same items. Any other value is a distinct,
/// broadcast-style id.
pub type RoutingId = u64;

/// The shared-pool sentinel routing id.
pub const SHARED_POOL: RoutingId = 0;

struct Item {
    pending: HashSet<RoutingId>,
    payload: Payload,
}

struct Inner {
    items: VecDeque<Item>,
    consumer_ids: HashSet<RoutingId>,
    active: bool,
    terminating: bool,
    /// Liveness handles of every registered upstream provider, used by
    /// `probe_terminate`. Not back-references to worker structs — see
    /// DESIGN.md's resolution of the queue/worker cyclic reference.
    provider_liveness: Vec<Arc<AtomicBool>>,
}

/// A bounded FIFO buffer between stages, with per-consumer pending sets.
pub struct Queue {
    pub(crate) name: String,
    capacity: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    /// Shared with [`crate::pipeline::PipelineSystem`]; checked alongside
    /// `active` so dropping the pipeline always wakes blocked workers.
    pipeline_active: Arc<AtomicBool>,
    observer: Arc<ObserverRegistry>,
}

impl Queue {
    pub(crate) fn new(
        name: String,
        capacity: usize,
        pipeline_active: Arc<AtomicBool>,
        observer: Arc<ObserverRegistry>,
    ) -> Arc<Self> {
        observer.register_queue(&name, capacity);
        Arc::new(Self {
            name,
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                consumer_ids: HashSet::new(),
                active: true,
                terminating: false,
                provider_liveness: Vec::new(),
            }),
            cv: Condvar::new(),
            pipeline_active,
            observer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registers a downstream consumer id. Idempotent for a repeated id —
    /// this is how multiple `same_pool` workers all end up sharing id `0`.
    pub fn register_consumer(&self, id: RoutingId) {
        let mut inner = self.inner.lock();
        inner.consumer_ids.insert(id);
    }

    /// Registers an upstream provider's liveness handle, consulted by
    /// [`Queue::probe_terminate`].
    pub fn register_provider(&self, liveness: Arc<AtomicBool>) {
        let mut inner = self.inner.lock();
        inner.provider_liveness.push(liveness);
    }

    /// Blocks the caller until `len(items) < capacity` or the queue is
    /// inactive, then appends `payload` tagged with a snapshot of the
    /// currently registered consumer ids. Silently drops the payload if the
    /// queue already became inactive (not expected in normal flow).
    pub fn push(&self, payload: Payload) {
        let mut inner = self.inner.lock();
        loop {
            if !self.is_runnable(&inner) {
                return;
            }
            if inner.items.len() < self.capacity {
                break;
            }
            self.observer.set_sleeping_not_full(&self.name, true);
            self.cv.wait(&mut inner);
            self.observer.set_sleeping_not_full(&self.name, false);
        }
        let pending = inner.consumer_ids.clone();
        inner.items.push_back(Item { pending, payload });
        self.observer.set_size(&self.name, inner.items.len());
        self.cv.notify_all();
    }

    /// Non-blocking snapshot: is the queue at capacity right now?
    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.items.len() >= self.capacity
    }

    /// Non-blocking snapshot: does any item have `id` in its pending set?
    pub fn has_items(&self, id: RoutingId) -> bool {
        let inner = self.inner.lock();
        Self::has_items_locked(&inner, id)
    }

    fn has_items_locked(inner: &Inner, id: RoutingId) -> bool {
        inner.items.iter().any(|item| item.pending.contains(&id))
    }

    /// Blocks until `has_items(id)` or the queue is inactive.
    pub fn sleep_until_items_available(&self, id: RoutingId) {
        let mut inner = self.inner.lock();
        self.observer.set_sleeping_not_empty(&self.name, true);
        while Self::is_runnable_static(&inner, &self.pipeline_active) && !Self::has_items_locked(&inner, id) {
            self.cv.wait(&mut inner);
        }
        self.observer.set_sleeping_not_empty(&self.name, false);
    }

    /// Finds the first item (in insertion order) whose pending set contains
    /// `id`, removes `id` from it, and returns the payload. If `id` was the
    /// last pending consumer for that item, the item is erased from the
    /// queue. Returns `None` only once the queue is inactive and no eligible
    /// item remains.
    pub fn pop(&self, id: RoutingId) -> Option<Payload> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(idx) = inner.items.iter().position(|item| item.pending.contains(&id)) {
                let item = &mut inner.items[idx];
                item.pending.remove(&id);
                let payload = if item.pending.is_empty() {
                    inner.items.remove(idx).unwrap().payload
                } else {
                    Arc::clone(&item.payload)
                };
                self.observer.set_size(&self.name, inner.items.len());
                if inner.items.is_empty() && inner.terminating {
                    self.deactivate_locked(&mut inner);
                } else {
                    self.cv.notify_all();
                }
                return Some(payload);
            }
            if !self.is_runnable(&inner) {
                return None;
            }
            self.cv.wait(&mut inner);
        }
    }

    /// If every registered provider is inactive, latches `terminating`; if
    /// `items` is also empty at that point, deactivates immediately.
    pub fn probe_terminate(&self) {
        let mut inner = self.inner.lock();
        let all_providers_inactive = inner
            .provider_liveness
            .iter()
            .all(|alive| !alive.load(Ordering::Acquire));
        if all_providers_inactive {
            inner.terminating = true;
            if inner.items.is_empty() {
                self.deactivate_locked(&mut inner);
            }
        }
    }

    /// Idempotent: marks the queue inactive and wakes every waiter.
    pub fn deactivate(&self) {
        let mut inner = self.inner.lock();
        self.deactivate_locked(&mut inner);
    }

    fn deactivate_locked(&self, inner: &mut Inner) {
        if inner.active {
            inner.active = false;
            self.observer.set_active(&self.name, false);
        }
        self.cv.notify_all();
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// The same combined predicate `push`/`pop`/`sleep_until_items_available`
    /// check internally: this queue's own `active` flag *and* the owning
    /// pipeline's liveness flag. Unlike [`Queue::is_active`], this goes false
    /// as soon as [`crate::pipeline::PipelineSystem::shutdown`] runs, even
    /// though `deactivate`/`probe_terminate` are never called on this queue
    /// directly. A producer loop must poll this, not `is_active`, or it will
    /// spin forever after shutdown without ever blocking in `push`.
    pub(crate) fn should_keep_running(&self) -> bool {
        let inner = self.inner.lock();
        self.is_runnable(&inner)
    }

    fn is_runnable(&self, inner: &Inner) -> bool {
        Self::is_runnable_static(inner, &self.pipeline_active)
    }

    fn is_runnable_static(inner: &Inner, pipeline_active: &AtomicBool) -> bool {
        inner.active && pipeline_active.load(Ordering::Acquire)
    }

    /// Wakes every waiter; used by [`crate::pipeline::PipelineSystem`] on
    /// emergency shutdown (dropped without an explicit `join`).
    pub(crate) fn notify_shutdown(&self) {
        let _inner = self.inner.lock();
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::wrap;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    fn test_queue(capacity: usize) -> Arc<Queue> {
        let pipeline_active = Arc::new(AtomicBool::new(true));
        let observer = Arc::new(ObserverRegistry::new());
        Queue::new("q".into(), capacity, pipeline_active, observer)
    }

    #[test]
    fn push_then_pop_single_consumer() {
        let q = test_queue(4);
        q.register_consumer(1);
        q.push(wrap(10i32));
        let got = q.pop(1).unwrap();
        assert_eq!(*crate::message::downcast_ref::<i32>(&got).unwrap(), 10);
        assert!(!q.has_items(1));
    }

    #[test]
    fn shared_pool_delivers_each_item_once() {
        let q = test_queue(8);
        q.register_consumer(SHARED_POOL);
        for i in 0..5 {
            q.push(wrap(i));
        }
        let mut seen = Vec::new();
        while let Some(p) = q.pop(SHARED_POOL) {
            seen.push(*crate::message::downcast_ref::<i32>(&p).unwrap());
            if seen.len() == 5 {
                break;
            }
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn broadcast_delivers_full_copy_to_every_distinct_id() {
        let q = test_queue(8);
        q.register_consumer(1);
        q.register_consumer(2);
        q.register_consumer(3);
        q.push(wrap(42i32));

        for id in [1, 2, 3] {
            let p = q.pop(id).unwrap();
            assert_eq!(*crate::message::downcast_ref::<i32>(&p).unwrap(), 42);
        }
        // All three drained it; the item must now be gone.
        assert!(!q.has_items(1));
        assert!(!q.has_items(2));
        assert!(!q.has_items(3));
    }

    #[test]
    fn item_stays_queued_until_every_pending_id_pops() {
        let q = test_queue(8);
        q.register_consumer(1);
        q.register_consumer(2);
        q.push(wrap(7i32));

        assert!(q.has_items(1));
        assert!(q.has_items(2));
        q.pop(1).unwrap();
        assert!(!q.has_items(1));
        assert!(q.has_items(2), "id 2 must still see the item");
        q.pop(2).unwrap();
        assert!(!q.has_items(2));
    }

    #[test]
    fn never_exceeds_capacity() {
        let q = test_queue(2);
        q.register_consumer(SHARED_POOL);
        q.push(wrap(1i32));
        q.push(wrap(2i32));
        assert!(q.is_full());

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || {
            q2.push(wrap(3i32));
        });
        thread::sleep(Duration::from_millis(50));
        assert!(q.is_full(), "third push should still be blocked");

        q.pop(SHARED_POOL).unwrap();
        handle.join().unwrap();
        assert!(q.is_full());
    }

    #[test]
    fn probe_terminate_deactivates_once_drained_and_providerless() {
        let q = test_queue(4);
        q.register_consumer(SHARED_POOL);
        let provider_alive = Arc::new(AtomicBool::new(true));
        q.register_provider(Arc::clone(&provider_alive));

        q.push(wrap(1i32));
        provider_alive.store(false, Ordering::Release);
        q.probe_terminate();
        assert!(q.is_active(), "items still pending, must not deactivate yet");

        q.pop(SHARED_POOL).unwrap();
        assert!(!q.is_active(), "draining the last item while terminating deactivates");
    }

    #[test]
    fn probe_terminate_deactivates_immediately_when_already_empty() {
        let q = test_queue(4);
        let provider_alive = Arc::new(AtomicBool::new(false));
        q.register_provider(provider_alive);
        q.probe_terminate();
        assert!(!q.is_active());
    }

    #[test]
    fn pop_returns_none_once_inactive_and_drained() {
        let q = test_queue(4);
        q.register_consumer(1);
        q.deactivate();
        assert_eq!(q.pop(1), None);
    }
}
