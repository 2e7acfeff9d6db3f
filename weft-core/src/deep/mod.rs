//! Deep Tracking
//!
//! Fine-grained reactivity subscribes to exactly the keys a computation
//! reads. Sometimes that is the wrong granularity: a serializer, a change
//! logger, or a persistence layer wants to re-run when *anything* in a
//! store changes, however deep. This module provides that, two ways:
//!
//! - [`deep_track`]: eagerly read every entry of every reachable node.
//!   Simple, stateless, pays the full walk on every run.
//! - [`track_store`]: the same subscription through a per-node tracker
//!   cache, so repeat traversals skip subtrees that have not changed.
//!
//! Both terminate on cyclic graphs, visit each node once per call, treat
//! opaque values as atomic leaves, and return the store they were given.
//! They walk anything implementing [`ReactiveContainer`].

mod trackable;
mod eager;
mod tracker;

pub use trackable::ReactiveContainer;
pub use eager::deep_track;
pub use tracker::{
    cached_tracker_count, purge_dead_trackers, track_store, tracker_stats, TrackerMode,
    TrackerStats,
};
