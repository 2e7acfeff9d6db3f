//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It manages the dependency graph and schedules updates when
//! sources change.
//!
//! # How It Works
//!
//! 1. When a memo or effect is created, it registers with the runtime.
//!
//! 2. When a computation reads a source, the runtime records an edge from
//!    the source to the computation.
//!
//! 3. When a source changes, the runtime:
//!    a. Immediately marks direct subscribers dirty, so reads that happen
//!       before the update pass already observe staleness
//!    b. Queues the source and, once no computation is mid-run, flushes
//!    c. The update pass walks the affected subgraph breadth-first, orders
//!       it topologically (Kahn), refreshes memos dependencies-first, and
//!       only follows a memo's out-edges when its value actually changed
//!    d. Effects collect during the pass and run last, once each
//!
//! # Batching
//!
//! [`Runtime::batch`] defers the flush to the end of the outermost batch.
//! Writes inside a batch are visible immediately; effects observe only the
//! final state, once.
//!
//! # Thread Safety
//!
//! The registry and edge table are concurrent maps shared across threads.
//! The pending queue and flush state are thread-local: notifications run on
//! the thread that performed the write, which keeps independent graphs on
//! different threads from interleaving their flushes.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::context::ReactiveContext;
use super::ids::{SourceId, SubscriberId};

/// A trait for computations the runtime can drive.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// The source identity readers subscribe to, if this computation is
    /// itself observable (memos). Effects return `None`.
    fn source_id(&self) -> Option<SourceId>;

    /// Mark this computation as needing an update.
    fn mark_dirty(&self);

    /// Bring a lazy computation up to date. Returns whether its observable
    /// value changed since the previous refresh.
    fn refresh(&self) -> bool;

    /// Re-run an eager computation (effects only).
    fn schedule(&self);

    /// Check if this computation is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered computation.
///
/// Dropping this handle unregisters the computation from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
    source_id: Option<SourceId>,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id, self.source_id);
    }
}

/// The global reactive runtime.
///
/// This is a singleton that manages all reactive computations in the
/// application.
pub struct Runtime;

// Global registry of computations.
// Maps subscriber IDs to weak references to avoid preventing cleanup.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();

// Edge table: source -> subscribers, insertion-ordered and deduplicated.
static EDGES: OnceLock<DashMap<SourceId, IndexSet<SubscriberId>>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn edges() -> &'static DashMap<SourceId, IndexSet<SubscriberId>> {
    EDGES.get_or_init(DashMap::new)
}

thread_local! {
    /// Sources that changed but have not been processed by a pass yet.
    static PENDING: RefCell<IndexSet<SourceId>> = RefCell::new(IndexSet::new());

    /// Whether a flush loop is running on this thread.
    static FLUSHING: Cell<bool> = Cell::new(false);

    /// Depth of nested [`Runtime::batch`] calls on this thread.
    static BATCH_DEPTH: Cell<usize> = Cell::new(0);
}

impl Runtime {
    /// Register a computation with the runtime.
    ///
    /// Returns a handle that unregisters the computation when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let subscriber_id = reactive.subscriber_id();
        let source_id = reactive.source_id();

        registry().insert(subscriber_id, Arc::downgrade(&reactive));

        ReactiveHandle {
            subscriber_id,
            source_id,
        }
    }

    /// Unregister a computation.
    fn unregister(subscriber_id: SubscriberId, source_id: Option<SourceId>) {
        registry().remove(&subscriber_id);

        // The computation is no longer observable.
        if let Some(source_id) = source_id {
            edges().remove(&source_id);
        }

        // Remove the computation from every source it subscribed to.
        for mut entry in edges().iter_mut() {
            entry.value_mut().shift_remove(&subscriber_id);
        }
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source_id: SourceId, subscriber_id: SubscriberId) {
        edges().entry(source_id).or_default().insert(subscriber_id);
    }

    /// Remove a subscriber from the given sources.
    ///
    /// Called before re-running a computation to clear stale subscriptions.
    pub fn remove_subscriptions(subscriber_id: SubscriberId, sources: &HashSet<SourceId>) {
        for source_id in sources {
            if let Some(mut entry) = edges().get_mut(source_id) {
                entry.shift_remove(&subscriber_id);
            }
        }
    }

    /// Drop the edge entry for a source that will never notify again.
    ///
    /// Registered computations release their source on unregister; plain
    /// triggers have no registration, so their owners call this when they
    /// die. Tracking the source again recreates the entry.
    pub(crate) fn release_source(source_id: SourceId) {
        edges().remove(&source_id);
    }

    /// Get the number of live subscriptions recorded for a source.
    pub fn subscriber_count(source_id: SourceId) -> usize {
        edges().get(&source_id).map(|e| e.len()).unwrap_or(0)
    }

    /// Notify the runtime that a source changed.
    ///
    /// Direct subscribers are marked dirty immediately, so a read that
    /// happens before the update pass already sees the staleness. The pass
    /// itself runs once no computation is mid-run and no batch is open.
    pub fn notify_source_change(source_id: SourceId) {
        for reactive in Self::live_subscribers(source_id) {
            reactive.mark_dirty();
        }

        PENDING.with(|pending| {
            pending.borrow_mut().insert(source_id);
        });

        Self::flush_if_idle();
    }

    /// Group several writes into a single update pass.
    ///
    /// Writes inside the closure apply immediately (reads see fresh
    /// values), but effects run only after the outermost batch exits.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        struct BatchGuard;

        impl Drop for BatchGuard {
            fn drop(&mut self) {
                BATCH_DEPTH.with(|depth| depth.set(depth.get() - 1));
                if !std::thread::panicking() {
                    Runtime::flush_if_idle();
                }
            }
        }

        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let _guard = BatchGuard;
        f()
    }

    /// Run a pass now unless one is already running, a batch is open, or a
    /// computation is mid-run on this thread.
    pub(crate) fn flush_if_idle() {
        if FLUSHING.with(Cell::get) {
            return;
        }
        if BATCH_DEPTH.with(Cell::get) > 0 {
            return;
        }
        if ReactiveContext::depth() > 0 {
            return;
        }
        if PENDING.with(|pending| pending.borrow().is_empty()) {
            return;
        }
        Self::flush();
    }

    /// Drain the pending queue, running update passes until it stays empty.
    ///
    /// Effects run inside the pass; writes they perform land back on the
    /// queue and are drained by the next iteration.
    fn flush() {
        struct FlushGuard;

        impl Drop for FlushGuard {
            fn drop(&mut self) {
                FLUSHING.with(|flushing| flushing.set(false));
            }
        }

        FLUSHING.with(|flushing| flushing.set(true));
        let _guard = FlushGuard;

        loop {
            let sources: Vec<SourceId> =
                PENDING.with(|pending| pending.borrow_mut().drain(..).collect());
            if sources.is_empty() {
                break;
            }
            Self::run_update_pass(sources);
        }
    }

    /// Process one batch of changed sources.
    ///
    /// Collects the affected subgraph breadth-first, orders it with Kahn's
    /// algorithm so dependencies refresh before dependents, follows memo
    /// out-edges only on actual change, and runs collected effects last.
    fn run_update_pass(sources: Vec<SourceId>) {
        let source_set: HashSet<SourceId> = sources.iter().copied().collect();

        // Collect every subscriber reachable from the changed sources.
        let mut affected: IndexMap<SubscriberId, Arc<dyn Reactive>> = IndexMap::new();
        let mut triggered: IndexSet<SubscriberId> = IndexSet::new();
        let mut seen: HashSet<SourceId> = source_set.clone();
        let mut queue: VecDeque<SourceId> = sources.into_iter().collect();

        while let Some(source_id) = queue.pop_front() {
            for reactive in Self::live_subscribers(source_id) {
                let subscriber_id = reactive.subscriber_id();

                // Direct subscribers of the changed sources start triggered;
                // everything else waits for an upstream change to arrive.
                if source_set.contains(&source_id) {
                    triggered.insert(subscriber_id);
                }

                if !affected.contains_key(&subscriber_id) {
                    if let Some(next) = reactive.source_id() {
                        if seen.insert(next) {
                            queue.push_back(next);
                        }
                    }
                    affected.insert(subscriber_id, reactive);
                }
            }
        }

        if affected.is_empty() {
            return;
        }

        // Topological order within the affected set (Kahn's algorithm).
        let mut in_degree: IndexMap<SubscriberId, usize> =
            affected.keys().map(|&id| (id, 0)).collect();
        let mut out_edges: HashMap<SubscriberId, Vec<SubscriberId>> = HashMap::new();

        for (&subscriber_id, reactive) in &affected {
            if let Some(source_id) = reactive.source_id() {
                for downstream in Self::subscriber_ids(source_id) {
                    if let Some(degree) = in_degree.get_mut(&downstream) {
                        *degree += 1;
                        out_edges.entry(subscriber_id).or_default().push(downstream);
                    }
                }
            }
        }

        let mut ready: VecDeque<SubscriberId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order: Vec<SubscriberId> = Vec::with_capacity(affected.len());

        while let Some(subscriber_id) = ready.pop_front() {
            order.push(subscriber_id);

            if let Some(outs) = out_edges.get(&subscriber_id) {
                for &downstream in outs {
                    if let Some(degree) = in_degree.get_mut(&downstream) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(downstream);
                        }
                    }
                }
            }
        }

        // Refresh memos in order; effects collect and run last.
        let mut effects: Vec<Arc<dyn Reactive>> = Vec::new();

        for subscriber_id in order {
            if !triggered.contains(&subscriber_id) {
                continue;
            }

            let reactive = &affected[&subscriber_id];

            if reactive.is_eager() {
                effects.push(Arc::clone(reactive));
                continue;
            }

            if reactive.refresh() {
                if let Some(source_id) = reactive.source_id() {
                    for downstream in Self::live_subscribers(source_id) {
                        downstream.mark_dirty();
                        triggered.insert(downstream.subscriber_id());
                    }
                }
            }
        }

        debug!(
            affected = affected.len(),
            effects = effects.len(),
            "update pass"
        );

        for effect in effects {
            effect.schedule();
        }
    }

    /// Upgrade a source's subscribers, pruning entries whose computation
    /// has been dropped.
    fn live_subscribers(source_id: SourceId) -> Vec<Arc<dyn Reactive>> {
        let ids = Self::subscriber_ids(source_id);
        if ids.is_empty() {
            return Vec::new();
        }

        let mut live = Vec::with_capacity(ids.len());
        let mut dead = Vec::new();

        for subscriber_id in ids {
            match registry().get(&subscriber_id).and_then(|weak| weak.upgrade()) {
                Some(reactive) => live.push(reactive),
                None => dead.push(subscriber_id),
            }
        }

        if !dead.is_empty() {
            if let Some(mut entry) = edges().get_mut(&source_id) {
                for subscriber_id in dead {
                    entry.shift_remove(&subscriber_id);
                }
            }
        }

        live
    }

    /// Snapshot the subscriber IDs recorded for a source.
    fn subscriber_ids(source_id: SourceId) -> Vec<SubscriberId> {
        edges()
            .get(&source_id)
            .map(|entry| entry.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
