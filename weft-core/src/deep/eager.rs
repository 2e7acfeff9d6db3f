//! Eager Deep Tracking
//!
//! [`deep_track`] subscribes the current computation to an entire
//! container graph in one pass, by reading every entry of every reachable
//! node through the tracked getters. It is the simple counterpart to the
//! memoized walk in [`super::tracker`]: nothing is cached, so each caller
//! pays the full traversal on every run, but there is also no shared
//! state to manage.

use std::collections::HashSet;

use crate::reactive::NodeId;

use super::trackable::ReactiveContainer;

/// Subscribe the current computation to every node reachable from
/// `store`, then return `store` unchanged.
///
/// For each node, the walk subscribes to the node's shape, then reads
/// every own entry through the tracked getter, then recurses into child
/// containers in entry order. A per-call visited set terminates cycles:
/// each node is visited at most once per call. Non-container values end
/// the walk.
///
/// Outside a tracking context this is a plain read of the whole graph and
/// subscribes nothing.
pub fn deep_track<C: ReactiveContainer>(store: C) -> C {
    let mut visited = HashSet::new();
    visit(&store, &mut visited);
    store
}

fn visit<C: ReactiveContainer>(node: &C, visited: &mut HashSet<NodeId>) {
    if !visited.insert(node.identity()) {
        return;
    }

    // Shape first, so key insertions and removals are covered even on
    // nodes whose entries are all leaves.
    node.track_shape();

    for child in node.tracked_children() {
        visit(&child, visited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use crate::store::StoreNode;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn returns_the_same_store() {
        let store = StoreNode::from_json(serde_json::json!({"a": {"b": 1}})).unwrap();
        let returned = deep_track(store.clone());
        assert_eq!(returned.id(), store.id());
    }

    #[test]
    fn subscribes_to_nested_leaf_writes() {
        let store = StoreNode::from_json(serde_json::json!({
            "user": { "profile": { "name": "ada" } }
        }))
        .unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let store_clone = store.clone();

        let _fx = Effect::new(move || {
            deep_track(store_clone.clone());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let profile = [
            crate::store::Key::from("user"),
            crate::store::Key::from("profile"),
            crate::store::Key::from("name"),
        ];
        store.set_path(&profile, "grace").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribes_to_deep_shape_changes() {
        let store = StoreNode::from_json(serde_json::json!({"inner": {}})).unwrap();
        let inner = store.get_untracked("inner").unwrap().as_node().unwrap().clone();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let store_clone = store.clone();

        let _fx = Effect::new(move || {
            deep_track(store_clone.clone());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        inner.set("added", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn terminates_on_cycles() {
        let a = StoreNode::object();
        let b = StoreNode::object();
        a.set("peer", b.clone()).unwrap();
        b.set("peer", a.clone()).unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let a_clone = a.clone();

        let _fx = Effect::new(move || {
            deep_track(a_clone.clone());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        b.set("value", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn does_not_traverse_opaque_values() {
        let store = StoreNode::object();
        store
            .set("blob", crate::store::Value::opaque(vec![1u8, 2, 3]))
            .unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let store_clone = store.clone();

        let _fx = Effect::new(move || {
            deep_track(store_clone.clone());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Replacing the opaque reference notifies.
        store
            .set("blob", crate::store::Value::opaque(vec![9u8]))
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
