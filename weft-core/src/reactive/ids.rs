//! Identity types for the reactive system.
//!
//! Everything observable (signals, triggers, memos-as-sources) carries a
//! `SourceId`; everything that observes (memos-as-readers, effects) carries a
//! `SubscriberId`. Store containers carry a `NodeId`, the identity the deep
//! tracking engine keys its caches and visited sets by.
//!
//! All three are minted from process-wide atomic counters, so ids are unique
//! across threads for the lifetime of the process and never reused.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observable value.
///
/// Signals, triggers, and memos each own one `SourceId`. Subscribers are
/// recorded against this id in the runtime's edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or other reactive computation) gets a unique
/// ID when created. This ID is used to track dependencies and avoid duplicate
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a store container node.
///
/// Two handles cloned from the same container share one `NodeId`, which is
/// what lets visited sets and the tracker cache recognize a node reached
/// through different paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}
