//! Memoized Deep Tracking
//!
//! [`track_store`] subscribes the current computation to an entire
//! container graph, like [`super::eager::deep_track`], but through a
//! per-node cache of trackers so that repeat traversals only re-read the
//! parts of the graph that actually changed.
//!
//! # How It Works
//!
//! Each node gets one [`Tracker`]: a dirty-flip [`Trigger`] plus a memo
//! whose computation runs in one of two modes.
//!
//! - **Read**: the traversal is visiting this node. The memo subscribes to
//!   the node's own trigger, then invokes every child's tracker. Because
//!   the memo is a source for whoever read it, the parent memo (or the
//!   consuming computation) subscribes to it here.
//! - **Passive**: a store write invalidated the memo between traversals.
//!   The re-run subscribes to nothing but the flip trigger and marks the
//!   tracker stale, so invalidation costs one flag store per node instead
//!   of a graph walk.
//!
//! Invoking a tracker flips it back: if it went stale, the flip trigger
//! fires (dirtying the memo), the memo is read in Read mode, and the mode
//! returns to Passive. A global traversal version, bumped once per
//! [`track_store`] call, guards against cycles and repeat visits: a node
//! whose tracker already ran this traversal is skipped.
//!
//! # Cache Lifetime
//!
//! The cache holds nodes weakly and owns each tracker's runtime
//! registration, so a tracker outlives the computation that first created
//! it and dies with its node. Dead entries are swept when the cache
//! doubles past a floor, or explicitly via [`purge_dead_trackers`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::reactive::{Equality, Memo, NodeId, Runtime, SourceId, Trigger};

use super::trackable::ReactiveContainer;

/// Traversal generation, bumped once per [`track_store`] call.
static TRAVERSAL_VERSION: AtomicU64 = AtomicU64::new(0);

const MODE_PASSIVE: u8 = 0;
const MODE_READ: u8 = 1;

/// The two states a tracker's computation can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackerMode {
    /// A traversal is visiting the node; subscribe deeply.
    Read,
    /// Between traversals; subscribe to the flip trigger only.
    Passive,
}

struct TrackerState {
    mode: AtomicU8,
    stale: AtomicBool,
    version: AtomicU64,
    read_runs: AtomicU64,
}

impl TrackerState {
    fn new() -> Self {
        TrackerState {
            mode: AtomicU8::new(MODE_PASSIVE),
            stale: AtomicBool::new(false),
            version: AtomicU64::new(0),
            read_runs: AtomicU64::new(0),
        }
    }

    fn mode(&self) -> TrackerMode {
        if self.mode.load(Ordering::SeqCst) == MODE_READ {
            TrackerMode::Read
        } else {
            TrackerMode::Passive
        }
    }

    fn set_mode(&self, mode: TrackerMode) {
        let tag = match mode {
            TrackerMode::Read => MODE_READ,
            TrackerMode::Passive => MODE_PASSIVE,
        };
        self.mode.store(tag, Ordering::SeqCst);
    }
}

/// A cached per-node tracker.
#[derive(Clone)]
struct Tracker {
    invoke: Arc<dyn Fn() + Send + Sync>,
    state: Arc<TrackerState>,
    alive: Arc<dyn Fn() -> bool + Send + Sync>,
    /// The flip trigger's source, released when the tracker leaves the
    /// cache. The trigger itself has no owner to do it.
    flip_id: SourceId,
}

// Process-wide tracker cache, keyed by node identity. Holds nodes weakly.
static TRACKERS: OnceLock<DashMap<NodeId, Tracker>> = OnceLock::new();

/// Cache size at which the next insertion sweeps dead entries.
static PURGE_THRESHOLD: AtomicUsize = AtomicUsize::new(PURGE_FLOOR);

const PURGE_FLOOR: usize = 64;

fn trackers() -> &'static DashMap<NodeId, Tracker> {
    TRACKERS.get_or_init(DashMap::new)
}

/// Subscribe the current computation to every node reachable from
/// `store`, through the memoized tracker cache, then return `store`
/// unchanged.
///
/// The first traversal reads the whole graph. Later traversals re-read
/// only nodes whose trackers were invalidated by a write since the last
/// visit; clean subtrees are skipped wholesale. Calling outside a
/// tracking context is a plain read and subscribes nothing; the trackers
/// it creates stay cached either way.
pub fn track_store<C: ReactiveContainer>(store: C) -> C {
    TRAVERSAL_VERSION.fetch_add(1, Ordering::SeqCst);

    let tracker = tracker_for(&store);
    Runtime::batch(|| (tracker.invoke)());

    store
}

/// Get the cached tracker for a node, building one if the cache has no
/// live entry. Insertion completes before the tracker is ever invoked, so
/// re-entry through a cycle finds the cache hit instead of building twice.
fn tracker_for<C: ReactiveContainer>(node: &C) -> Tracker {
    let id = node.identity();

    if let Some(entry) = trackers().get(&id) {
        if (entry.alive)() {
            return entry.clone();
        }
    }

    let tracker = build_tracker(node);
    if let Some(old) = trackers().insert(id, tracker.clone()) {
        Runtime::release_source(old.flip_id);
    }
    maybe_purge();
    tracker
}

fn build_tracker<C: ReactiveContainer>(node: &C) -> Tracker {
    let id = node.identity();
    trace!(node = ?id, "creating tracker");

    let state = Arc::new(TrackerState::new());
    let weak = ReactiveContainer::downgrade(node);
    let flip = Trigger::new();

    let memo_state = Arc::clone(&state);
    let memo_weak = weak.clone();
    let memo = Memo::with_equality(
        move || match memo_state.mode() {
            TrackerMode::Read => {
                let Some(node) = C::upgrade(&memo_weak) else { return };
                memo_state.read_runs.fetch_add(1, Ordering::Relaxed);

                node.track_own();
                for child in node.child_containers() {
                    let child_tracker = tracker_for(&child);
                    (child_tracker.invoke)();
                }
            }
            TrackerMode::Passive => {
                flip.track();
                memo_state.stale.store(true, Ordering::SeqCst);
            }
        },
        Equality::Never,
    );

    let invoke_state = Arc::clone(&state);
    let invoke: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        invoke_state.set_mode(TrackerMode::Read);

        // A passive run armed the flip; firing it dirties the memo so the
        // read below recomputes instead of returning the stale cache.
        if invoke_state.stale.swap(false, Ordering::SeqCst) {
            flip.fire();
        }

        let current = TRAVERSAL_VERSION.load(Ordering::SeqCst);
        if invoke_state.version.load(Ordering::SeqCst) != current {
            // Record the version before reading, so re-entry through a
            // cycle treats this node as already visited.
            invoke_state.version.store(current, Ordering::SeqCst);
            memo.get();
        }

        invoke_state.set_mode(TrackerMode::Passive);
    });

    let alive: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(move || C::upgrade(&weak).is_some());

    Tracker {
        invoke,
        state,
        alive,
        flip_id: flip.id(),
    }
}

/// Sweep once the cache outgrows its threshold, then set the next
/// threshold to double the surviving size.
fn maybe_purge() {
    if trackers().len() < PURGE_THRESHOLD.load(Ordering::Relaxed) {
        return;
    }

    let removed = purge_dead_trackers();
    let live = trackers().len();
    PURGE_THRESHOLD.store((live * 2).max(PURGE_FLOOR), Ordering::Relaxed);
    debug!(removed, live, "swept tracker cache");
}

/// Number of trackers currently cached, dead entries included.
pub fn cached_tracker_count() -> usize {
    trackers().len()
}

/// Drop every cached tracker whose node is gone. Returns how many were
/// removed.
pub fn purge_dead_trackers() -> usize {
    let before = trackers().len();
    trackers().retain(|_, tracker| {
        let keep = (tracker.alive)();
        if !keep {
            Runtime::release_source(tracker.flip_id);
        }
        keep
    });
    before - trackers().len()
}

/// A snapshot of one tracker's bookkeeping, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Mode the tracker is currently in. Settles to
    /// [`TrackerMode::Passive`] between traversals.
    pub mode: TrackerMode,
    /// How many times the tracker's computation has run in Read mode.
    pub read_runs: u64,
    /// The traversal version that last visited the node.
    pub version: u64,
}

/// Look up the cached tracker for a node identity.
pub fn tracker_stats(id: NodeId) -> Option<TrackerStats> {
    trackers().get(&id).map(|tracker| TrackerStats {
        mode: tracker.state.mode(),
        read_runs: tracker.state.read_runs.load(Ordering::Relaxed),
        version: tracker.state.version.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreNode;

    fn read_runs(id: NodeId) -> u64 {
        tracker_stats(id).map(|stats| stats.read_runs).unwrap_or(0)
    }

    #[test]
    fn returns_the_same_store() {
        let store = StoreNode::from_json(serde_json::json!({"a": 1})).unwrap();
        let returned = track_store(store.clone());
        assert_eq!(returned.id(), store.id());
    }

    #[test]
    fn repeat_traversal_skips_clean_nodes() {
        let store = StoreNode::from_json(serde_json::json!({"child": {"x": 1}})).unwrap();
        let child = store.get_untracked("child").unwrap().as_node().unwrap().clone();

        track_store(store.clone());
        assert_eq!(read_runs(store.id()), 1);
        assert_eq!(read_runs(child.id()), 1);

        // Nothing changed: neither node is re-read.
        track_store(store.clone());
        assert_eq!(read_runs(store.id()), 1);
        assert_eq!(read_runs(child.id()), 1);
    }

    #[test]
    fn mutation_re_reads_only_the_dirty_path() {
        let store = StoreNode::from_json(serde_json::json!({
            "left": {"x": 1},
            "right": {"y": 1}
        }))
        .unwrap();
        let left = store.get_untracked("left").unwrap().as_node().unwrap().clone();
        let right = store.get_untracked("right").unwrap().as_node().unwrap().clone();

        track_store(store.clone());
        left.set("x", 2).unwrap();
        track_store(store.clone());

        assert_eq!(read_runs(store.id()), 2);
        assert_eq!(read_runs(left.id()), 2);
        // The untouched sibling stayed memoized.
        assert_eq!(read_runs(right.id()), 1);
    }

    #[test]
    fn diamond_node_is_read_once_per_traversal() {
        let shared = StoreNode::object();
        shared.set("x", 1).unwrap();

        let root = StoreNode::object();
        let a = StoreNode::object();
        let b = StoreNode::object();
        a.set("shared", shared.clone()).unwrap();
        b.set("shared", shared.clone()).unwrap();
        root.set("a", a).unwrap();
        root.set("b", b).unwrap();

        track_store(root.clone());
        assert_eq!(read_runs(shared.id()), 1);

        shared.set("x", 2).unwrap();
        track_store(root.clone());
        assert_eq!(read_runs(shared.id()), 2);
    }

    #[test]
    fn cycles_terminate_with_one_read_each() {
        let a = StoreNode::object();
        let b = StoreNode::object();
        a.set("peer", b.clone()).unwrap();
        b.set("peer", a.clone()).unwrap();

        track_store(a.clone());

        assert_eq!(read_runs(a.id()), 1);
        assert_eq!(read_runs(b.id()), 1);
    }

    #[test]
    fn trackers_settle_to_passive() {
        let store = StoreNode::object();
        track_store(store.clone());

        let stats = tracker_stats(store.id()).unwrap();
        assert_eq!(stats.mode, TrackerMode::Passive);
    }

    #[test]
    fn version_is_monotonic_across_calls() {
        let store = StoreNode::object();

        track_store(store.clone());
        let first = tracker_stats(store.id()).unwrap().version;

        track_store(store.clone());
        let second = tracker_stats(store.id()).unwrap().version;

        assert!(second > first);
    }

    #[test]
    fn purge_drops_trackers_for_dead_nodes() {
        let id = {
            let store = StoreNode::object();
            track_store(store.clone());
            store.id()
        };
        purge_dead_trackers();
        assert!(tracker_stats(id).is_none());
    }
}
