//! Container Capability
//!
//! The deep-tracking engine does not know about any concrete store type.
//! It walks anything that implements [`ReactiveContainer`]: a cheaply
//! clonable handle with stable identity, weak references, per-node change
//! sources, and child enumeration. The store's [`StoreNode`] supplies the
//! in-crate implementation; host bindings can supply their own.

use crate::reactive::NodeId;
use crate::store::StoreNode;

/// A reactive container node the deep-tracking engine can traverse.
///
/// Implementations are handles: cloning one yields another view of the
/// same underlying node, and [`identity`](ReactiveContainer::identity)
/// stays stable across clones. The engine keys its caches on that
/// identity, and holds nodes only through
/// [`downgrade`](ReactiveContainer::downgrade), never owning them.
pub trait ReactiveContainer: Clone + Send + Sync + 'static {
    /// The weak form of this handle.
    type Weak: Clone + Send + Sync + 'static;

    /// The node's stable identity. Two handles to the same node return
    /// the same value.
    fn identity(&self) -> NodeId;

    /// Create a weak handle. Must not keep the node alive.
    fn downgrade(&self) -> Self::Weak;

    /// Recover a strong handle, if the node is still alive.
    fn upgrade(weak: &Self::Weak) -> Option<Self>;

    /// Subscribe the current computation to every own mutation of this
    /// node: value writes, insertions, removals.
    fn track_own(&self);

    /// Subscribe the current computation to structural changes of this
    /// node: keys appearing or disappearing.
    fn track_shape(&self);

    /// Enumerate the container children, without subscribing to anything.
    /// Order must match entry order.
    fn child_containers(&self) -> Vec<Self>;

    /// Read every own entry through the tracked getter, subscribing the
    /// current computation to each key, and return the children that are
    /// themselves containers, in entry order.
    fn tracked_children(&self) -> Vec<Self>;
}

impl ReactiveContainer for StoreNode {
    type Weak = crate::store::WeakStoreNode;

    fn identity(&self) -> NodeId {
        self.id()
    }

    fn downgrade(&self) -> Self::Weak {
        StoreNode::downgrade(self)
    }

    fn upgrade(weak: &Self::Weak) -> Option<Self> {
        weak.upgrade()
    }

    fn track_own(&self) {
        StoreNode::track_own(self);
    }

    fn track_shape(&self) {
        StoreNode::track_shape(self);
    }

    fn child_containers(&self) -> Vec<Self> {
        self.values_untracked()
            .into_iter()
            .filter_map(|value| value.as_node().cloned())
            .collect()
    }

    fn tracked_children(&self) -> Vec<Self> {
        self.keys_untracked()
            .into_iter()
            .filter_map(|key| self.get(key).and_then(|value| value.as_node().cloned()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;

    #[test]
    fn children_are_containers_in_entry_order() {
        let node = StoreNode::object();
        node.set("leaf", 1).unwrap();
        node.set("first", StoreNode::object()).unwrap();
        node.set("opaque", Value::opaque(vec![1u8])).unwrap();
        node.set("second", StoreNode::list()).unwrap();

        let children = node.child_containers();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id(), node.get_untracked("first").unwrap().as_node().unwrap().id());
        assert_eq!(children[1].id(), node.get_untracked("second").unwrap().as_node().unwrap().id());
    }

    #[test]
    fn identity_is_stable_across_clones() {
        let node = StoreNode::object();
        let clone = node.clone();
        assert_eq!(node.identity(), clone.identity());
    }

    #[test]
    fn weak_handles_respect_node_lifetime() {
        let weak = {
            let node = StoreNode::list();
            ReactiveContainer::downgrade(&node)
        };
        assert!(StoreNode::upgrade(&weak).is_none());
    }
}
