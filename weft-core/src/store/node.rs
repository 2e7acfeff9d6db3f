//! Store Nodes
//!
//! A [`StoreNode`] is a shared, mutable container in a reactive document
//! tree: either an object (insertion-ordered string keys) or a list. Nodes
//! have stable identity, so clones of the same handle observe the same data
//! and the same subscriptions.
//!
//! # Reactivity
//!
//! Each node carries three kinds of notification sources:
//!
//! - **Per-key triggers**, created lazily the first time a key is read
//!   inside a tracking context. Keys nobody reads reactively cost nothing.
//! - An **own trigger** that fires on every mutation of the node's own
//!   entries. Deep tracking subscribes to this one per node instead of to
//!   every key.
//! - A **shape trigger** that fires when the set of keys changes:
//!   insertions, removals, and list length changes.
//!
//! All triggers for one mutation fire inside a single [`Runtime::batch`],
//! after the internal locks are released, so subscribers observe a
//! consistent node and re-run once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;
use thiserror::Error;

use crate::reactive::{NodeId, ReactiveContext, Runtime, Trigger};

use super::value::Value;

/// Address of one entry in a [`StoreNode`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// An object field.
    Field(Arc<str>),
    /// A list index.
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "{name}"),
            Key::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name.into())
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// What a write did to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The new value equals the current one; nothing changed, nobody was
    /// notified.
    Unchanged,
    /// An existing entry's value was replaced.
    Replaced,
    /// A new entry appeared.
    Inserted,
}

/// Errors from store mutations.
///
/// Reads are lenient: an absent key is `None`, never an error. Writes are
/// strict about addressing, since silently dropping them would hide bugs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A field key was used on a list, or an index key on an object.
    #[error("key {key} does not address {found} nodes")]
    KindMismatch { key: Key, found: &'static str },

    /// A list write beyond the appendable range.
    #[error("index {index} is out of bounds for a list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A path walk stepped into a leaf value.
    #[error("path segment {segment} is not a container")]
    NotAContainer { segment: Key },

    /// A path walk stepped into an absent entry.
    #[error("path segment {segment} is missing")]
    MissingKey { segment: Key },

    /// A path operation was given no segments.
    #[error("path is empty")]
    EmptyPath,
}

enum Entries {
    Object(IndexMap<Arc<str>, Value>),
    List(Vec<Value>),
}

impl Entries {
    fn kind_name(&self) -> &'static str {
        match self {
            Entries::Object(_) => "object",
            Entries::List(_) => "list",
        }
    }

    fn len(&self) -> usize {
        match self {
            Entries::Object(map) => map.len(),
            Entries::List(items) => items.len(),
        }
    }
}

struct NodeInner {
    id: NodeId,
    entries: RwLock<Entries>,
    /// Lazily-created per-key triggers. Entries are never removed; a key
    /// that disappears can reappear, and its subscribers must hear that.
    key_triggers: RwLock<HashMap<Key, Trigger>>,
    own: Trigger,
    shape: Trigger,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        // The node's triggers will never fire again; drop their edge
        // entries from the runtime.
        Runtime::release_source(self.own.id());
        Runtime::release_source(self.shape.id());
        if let Ok(triggers) = self.key_triggers.get_mut() {
            for trigger in triggers.values() {
                Runtime::release_source(trigger.id());
            }
        }
    }
}

/// A shared reactive container: an object or a list of [`Value`]s.
///
/// Cloning is cheap and shares identity, data, and subscriptions.
#[derive(Clone)]
pub struct StoreNode {
    inner: Arc<NodeInner>,
}

/// A weak handle to a [`StoreNode`], for caches that must not keep the
/// node alive.
#[derive(Clone)]
pub struct WeakStoreNode {
    inner: Weak<NodeInner>,
}

impl WeakStoreNode {
    /// Recover the node, if it is still alive.
    pub fn upgrade(&self) -> Option<StoreNode> {
        self.inner.upgrade().map(|inner| StoreNode { inner })
    }
}

impl StoreNode {
    fn with_entries(entries: Entries) -> Self {
        StoreNode {
            inner: Arc::new(NodeInner {
                id: NodeId::new(),
                entries: RwLock::new(entries),
                key_triggers: RwLock::new(HashMap::new()),
                own: Trigger::new(),
                shape: Trigger::new(),
            }),
        }
    }

    /// Create an empty object node.
    pub fn object() -> Self {
        Self::with_entries(Entries::Object(IndexMap::new()))
    }

    /// Create an empty list node.
    pub fn list() -> Self {
        Self::with_entries(Entries::List(Vec::new()))
    }

    /// Build a node tree from a JSON object or array.
    ///
    /// Returns `None` for JSON leaves, which have no container to root the
    /// tree in.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from_json(json) {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The node's stable identity. Clones share it.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Create a weak handle to this node.
    pub fn downgrade(&self) -> WeakStoreNode {
        WeakStoreNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Check whether this node is an object.
    pub fn is_object(&self) -> bool {
        matches!(*self.entries(), Entries::Object(_))
    }

    /// Check whether this node is a list.
    pub fn is_list(&self) -> bool {
        matches!(*self.entries(), Entries::List(_))
    }

    /// Subscribe the current computation to every own mutation of this
    /// node. No-op outside a tracking context.
    pub fn track_own(&self) {
        self.inner.own.track();
    }

    /// Subscribe the current computation to structural changes of this
    /// node (keys appearing or disappearing). No-op outside a tracking
    /// context.
    pub fn track_shape(&self) {
        self.inner.shape.track();
    }

    /// Read an entry, subscribing the current computation to that key.
    ///
    /// Absent keys and kind-mismatched keys read as `None`. Reading an
    /// absent key still subscribes, so the reader re-runs if the key
    /// appears later.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        if self.key_applies(&key) {
            self.track_key(&key);
        }
        self.read(&key)
    }

    /// Read an entry without subscribing.
    pub fn get_untracked(&self, key: impl Into<Key>) -> Option<Value> {
        self.read(&key.into())
    }

    /// Check whether a key currently has an entry, subscribing to that key.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries. Subscribes to the node's shape.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.entries().len()
    }

    /// Check whether the node has no entries. Subscribes to the node's
    /// shape.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the keys in entry order. Subscribes to the node's shape.
    pub fn keys(&self) -> Vec<Key> {
        self.track_shape();
        self.keys_untracked()
    }

    /// Snapshot the keys in entry order without subscribing.
    pub fn keys_untracked(&self) -> Vec<Key> {
        match &*self.entries() {
            Entries::Object(map) => map.keys().cloned().map(Key::Field).collect(),
            Entries::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Snapshot the values in entry order without subscribing.
    pub fn values_untracked(&self) -> Vec<Value> {
        match &*self.entries() {
            Entries::Object(map) => map.values().cloned().collect(),
            Entries::List(items) => items.clone(),
        }
    }

    /// Read a value at a key path, subscribing to each segment along the
    /// walk. Returns `None` if any step is absent or a leaf.
    pub fn get_path(&self, path: &[Key]) -> Option<Value> {
        let (last, walk) = path.split_last()?;
        let mut node = self.clone();
        for segment in walk {
            node = node.get(segment.clone())?.as_node()?.clone();
        }
        node.get(last.clone())
    }

    /// Write a value at a key path. Intermediate segments are read without
    /// subscribing and must address existing container entries.
    pub fn set_path(
        &self,
        path: &[Key],
        value: impl Into<Value>,
    ) -> Result<WriteOutcome, StoreError> {
        let (last, walk) = path.split_last().ok_or(StoreError::EmptyPath)?;
        let mut node = self.clone();
        for segment in walk {
            let next = node
                .get_untracked(segment.clone())
                .ok_or_else(|| StoreError::MissingKey {
                    segment: segment.clone(),
                })?;
            node = next
                .as_node()
                .ok_or_else(|| StoreError::NotAContainer {
                    segment: segment.clone(),
                })?
                .clone();
        }
        node.set(last.clone(), value)
    }

    /// Write an entry.
    ///
    /// On objects, a field key inserts or replaces. On lists, an index key
    /// replaces in range and appends at exactly `len`. Writing a value
    /// equal to the current one (leaf equality, container identity) is a
    /// no-op and notifies nobody.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<WriteOutcome, StoreError> {
        let key = key.into();
        let value = value.into();

        let outcome = {
            let mut entries = self.entries_mut();
            match (&mut *entries, &key) {
                (Entries::Object(map), Key::Field(name)) => match map.get(&**name) {
                    Some(existing) if *existing == value => WriteOutcome::Unchanged,
                    Some(_) => {
                        map.insert(Arc::clone(name), value);
                        WriteOutcome::Replaced
                    }
                    None => {
                        map.insert(Arc::clone(name), value);
                        WriteOutcome::Inserted
                    }
                },
                (Entries::List(items), Key::Index(index)) => {
                    let index = *index;
                    if index < items.len() {
                        if items[index] == value {
                            WriteOutcome::Unchanged
                        } else {
                            items[index] = value;
                            WriteOutcome::Replaced
                        }
                    } else if index == items.len() {
                        items.push(value);
                        WriteOutcome::Inserted
                    } else {
                        return Err(StoreError::IndexOutOfBounds {
                            index,
                            len: items.len(),
                        });
                    }
                }
                (other, key) => {
                    return Err(StoreError::KindMismatch {
                        key: key.clone(),
                        found: other.kind_name(),
                    })
                }
            }
        };

        match outcome {
            WriteOutcome::Unchanged => {}
            WriteOutcome::Replaced => self.fire(&[key], false),
            WriteOutcome::Inserted => self.fire(&[key], true),
        }
        Ok(outcome)
    }

    /// Remove an entry, returning its value.
    ///
    /// Removing an absent key is a no-op returning `None`. On lists, the
    /// entries after the removed index shift down, and their key triggers
    /// re-fire.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>, StoreError> {
        let key = key.into();

        let (removed, shifted) = {
            let mut entries = self.entries_mut();
            match (&mut *entries, &key) {
                (Entries::Object(map), Key::Field(name)) => {
                    (map.shift_remove(&**name), Vec::new())
                }
                (Entries::List(items), Key::Index(index)) => {
                    let index = *index;
                    if index < items.len() {
                        let old_len = items.len();
                        let removed = items.remove(index);
                        let shifted = (index..old_len).map(Key::Index).collect();
                        (Some(removed), shifted)
                    } else {
                        (None, Vec::new())
                    }
                }
                (other, key) => {
                    return Err(StoreError::KindMismatch {
                        key: key.clone(),
                        found: other.kind_name(),
                    })
                }
            }
        };

        if removed.is_some() {
            if shifted.is_empty() {
                self.fire(&[key], true);
            } else {
                self.fire(&shifted, true);
            }
        }
        Ok(removed)
    }

    /// Append a value to a list node, returning its index.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, StoreError> {
        let value = value.into();

        let index = {
            let mut entries = self.entries_mut();
            match &mut *entries {
                Entries::List(items) => {
                    items.push(value);
                    items.len() - 1
                }
                other => {
                    return Err(StoreError::KindMismatch {
                        key: Key::Index(0),
                        found: other.kind_name(),
                    })
                }
            }
        };

        self.fire(&[Key::Index(index)], true);
        Ok(index)
    }

    /// Insert a value into a list node at `index`, shifting later entries
    /// up. Their key triggers re-fire.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = value.into();

        let shifted = {
            let mut entries = self.entries_mut();
            match &mut *entries {
                Entries::List(items) => {
                    if index > items.len() {
                        return Err(StoreError::IndexOutOfBounds {
                            index,
                            len: items.len(),
                        });
                    }
                    items.insert(index, value);
                    (index..items.len()).map(Key::Index).collect::<Vec<_>>()
                }
                other => {
                    return Err(StoreError::KindMismatch {
                        key: Key::Index(index),
                        found: other.kind_name(),
                    })
                }
            }
        };

        self.fire(&shifted, true);
        Ok(())
    }

    /// Remove every entry, returning how many there were.
    ///
    /// Subscribers to the removed keys are notified; the triggers
    /// themselves survive, so re-inserted keys keep their subscribers.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut entries = self.entries_mut();
            match &mut *entries {
                Entries::Object(map) => {
                    let keys: Vec<Key> = map.keys().cloned().map(Key::Field).collect();
                    map.clear();
                    keys
                }
                Entries::List(items) => {
                    let keys: Vec<Key> = (0..items.len()).map(Key::Index).collect();
                    items.clear();
                    keys
                }
            }
        };

        if !cleared.is_empty() {
            self.fire(&cleared, true);
        }
        cleared.len()
    }

    /// Snapshot the node tree as JSON, without subscribing.
    ///
    /// Opaque leaves become `null`. Cyclic trees are not representable and
    /// recurse without bound.
    pub fn to_json(&self) -> serde_json::Value {
        // Snapshot before recursing so no lock is held across child reads.
        enum Snapshot {
            Object(Vec<(Arc<str>, Value)>),
            List(Vec<Value>),
        }

        let snapshot = match &*self.entries() {
            Entries::Object(map) => {
                Snapshot::Object(map.iter().map(|(k, v)| (Arc::clone(k), v.clone())).collect())
            }
            Entries::List(items) => Snapshot::List(items.clone()),
        };

        match snapshot {
            Snapshot::Object(pairs) => serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Snapshot::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Object-field write that never notifies. Construction only.
    pub(crate) fn set_untracked(&self, key: &str, value: Value) {
        if let Entries::Object(map) = &mut *self.entries_mut() {
            map.insert(key.into(), value);
        }
    }

    /// List append that never notifies. Construction only.
    pub(crate) fn push_untracked(&self, value: Value) {
        if let Entries::List(items) = &mut *self.entries_mut() {
            items.push(value);
        }
    }

    fn entries(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.inner
            .entries
            .read()
            .expect("store entries lock poisoned")
    }

    fn entries_mut(&self) -> std::sync::RwLockWriteGuard<'_, Entries> {
        self.inner
            .entries
            .write()
            .expect("store entries lock poisoned")
    }

    fn read(&self, key: &Key) -> Option<Value> {
        match (&*self.entries(), key) {
            (Entries::Object(map), Key::Field(name)) => map.get(&**name).cloned(),
            (Entries::List(items), Key::Index(index)) => items.get(*index).cloned(),
            _ => None,
        }
    }

    fn key_applies(&self, key: &Key) -> bool {
        matches!(
            (&*self.entries(), key),
            (Entries::Object(_), Key::Field(_)) | (Entries::List(_), Key::Index(_))
        )
    }

    /// Subscribe the current computation to one key's trigger, creating
    /// the trigger on first tracked read.
    fn track_key(&self, key: &Key) {
        if !ReactiveContext::is_active() {
            return;
        }

        let existing = {
            let triggers = self
                .inner
                .key_triggers
                .read()
                .expect("key trigger map lock poisoned");
            triggers.get(key).copied()
        };

        let trigger = match existing {
            Some(trigger) => trigger,
            None => *self
                .inner
                .key_triggers
                .write()
                .expect("key trigger map lock poisoned")
                .entry(key.clone())
                .or_insert_with(Trigger::new),
        };

        trigger.track();
    }

    /// Fire the triggers for one mutation: the touched keys' triggers
    /// (where they exist), the own trigger, and the shape trigger when the
    /// key set changed. Runs after all locks are released, in one batch.
    fn fire(&self, keys: &[Key], shape_changed: bool) {
        let key_triggers: Vec<Trigger> = {
            let triggers = self
                .inner
                .key_triggers
                .read()
                .expect("key trigger map lock poisoned");
            keys.iter().filter_map(|key| triggers.get(key).copied()).collect()
        };

        Runtime::batch(|| {
            for trigger in key_triggers {
                trigger.fire();
            }
            self.inner.own.fire();
            if shape_changed {
                self.inner.shape.fire();
            }
        });
    }
}

impl PartialEq for StoreNode {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for StoreNode {}

impl std::hash::Hash for StoreNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for StoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreNode")
            .field("id", &self.inner.id)
            .field("kind", &self.entries().kind_name())
            .field("len", &self.entries().len())
            .finish()
    }
}
