//! Reactive Storage
//!
//! A reactive wrapper over flat string key-value storage. Reads inside a
//! computation subscribe to the key they read; writes notify exactly the
//! subscribers of the written key. The per-key triggers are created
//! lazily, so keys nobody reads reactively never allocate one.
//!
//! The backend is pluggable through [`StorageBackend`]. [`MemoryStorage`]
//! is the in-process default; hosts supply their own for disk files,
//! browser storage, or anything else with get/set/remove semantics.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tracing::trace;

use crate::reactive::{ReactiveContext, Runtime, Trigger};

/// Flat string key-value storage.
///
/// Implementations are plain and synchronous; reactivity is layered on
/// top by [`ReactiveStorage`].
pub trait StorageBackend: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    fn set(&self, key: &str, value: &str);

    /// Delete a value. Deleting an absent key is a no-op.
    fn remove(&self, key: &str);

    /// Delete every value.
    fn clear(&self);
}

/// An in-process [`StorageBackend`].
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .expect("storage lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .expect("storage lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .expect("storage lock poisoned")
            .remove(key);
    }

    fn clear(&self) {
        self.entries.write().expect("storage lock poisoned").clear();
    }
}

/// Storage with per-key reactivity.
///
/// Triggers are keyed by the logical (unprefixed) key and created on the
/// first read that happens inside a tracking context. Reads outside a
/// context are plain backend reads.
pub struct ReactiveStorage {
    backend: Arc<dyn StorageBackend>,
    prefix: Option<String>,
    triggers: DashMap<String, Trigger>,
}

impl ReactiveStorage {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        ReactiveStorage {
            backend,
            prefix: None,
            triggers: DashMap::new(),
        }
    }

    /// Wrap a backend, prepending `prefix` verbatim to every backend key.
    ///
    /// Several wrappers with distinct prefixes can share one backend
    /// without colliding. The prefix applies to `get`, `set`, and
    /// `remove`; [`clear`](ReactiveStorage::clear) still wipes the whole
    /// backend.
    pub fn with_prefix(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        ReactiveStorage {
            backend,
            prefix: Some(prefix.into()),
            triggers: DashMap::new(),
        }
    }

    /// Wrap a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Read a key, subscribing the current computation to it.
    ///
    /// The first tracked read of a key creates its trigger; untracked
    /// reads never do.
    pub fn get(&self, key: &str) -> Option<String> {
        if ReactiveContext::is_active() {
            let trigger = *self
                .triggers
                .entry(key.to_string())
                .or_insert_with(Trigger::new);
            trigger.track();
        }
        self.backend.get(&self.backend_key(key))
    }

    /// Write a key and notify its subscribers, if it has any.
    pub fn set(&self, key: &str, value: &str) {
        self.backend.set(&self.backend_key(key), value);
        trace!(key, "storage write");
        self.fire(key);
    }

    /// Delete a key and notify its subscribers, if it has any.
    pub fn remove(&self, key: &str) {
        self.backend.remove(&self.backend_key(key));
        trace!(key, "storage remove");
        self.fire(key);
    }

    /// Wipe the backend and forget every trigger.
    ///
    /// Subscribers of existing keys are intentionally not notified, and
    /// later writes to those keys will not reach them: a cleared store is
    /// starting over, not changing. Reading a key again re-subscribes.
    pub fn clear(&self) {
        self.backend.clear();
        self.release_triggers();
        trace!("storage cleared");
    }

    /// Number of per-key triggers created so far.
    ///
    /// Stays at zero until something reads a key inside a computation.
    pub fn signal_count(&self) -> usize {
        self.triggers.len()
    }

    fn backend_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
            None => Cow::Borrowed(key),
        }
    }

    fn fire(&self, key: &str) {
        // Copy the trigger out before firing: subscribers may re-read
        // this storage while the map guard would still be held.
        let trigger = self.triggers.get(key).map(|entry| *entry);
        if let Some(trigger) = trigger {
            trigger.fire();
        }
    }

    /// Drop every trigger, releasing its runtime edge entry. The triggers
    /// never fire again, so the entries would otherwise linger.
    fn release_triggers(&self) {
        self.triggers.retain(|_, trigger| {
            Runtime::release_source(trigger.id());
            false
        });
    }
}

impl Drop for ReactiveStorage {
    fn drop(&mut self) {
        self.release_triggers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn reads_and_writes_reach_the_backend() {
        let storage = ReactiveStorage::in_memory();

        assert_eq!(storage.get("k"), None);
        storage.set("k", "v");
        assert_eq!(storage.get("k"), Some("v".to_string()));
        storage.remove("k");
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn triggers_are_created_lazily() {
        let storage = ReactiveStorage::in_memory();

        storage.set("a", "1");
        let _ = storage.get("a");
        assert_eq!(storage.signal_count(), 0);

        let storage = Arc::new(storage);
        let storage_clone = Arc::clone(&storage);
        let _fx = Effect::new(move || {
            let _ = storage_clone.get("a");
        });
        assert_eq!(storage.signal_count(), 1);
    }

    #[test]
    fn writes_notify_only_their_key() {
        let storage = Arc::new(ReactiveStorage::in_memory());
        storage.set("a", "1");
        storage.set("b", "1");

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let storage_clone = Arc::clone(&storage);

        let _fx = Effect::new(move || {
            let _ = storage_clone.get("a");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        storage.set("b", "2");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        storage.set("a", "2");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removal_notifies_subscribers() {
        let storage = Arc::new(ReactiveStorage::in_memory());
        storage.set("a", "1");

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = Arc::clone(&seen);
        let storage_clone = Arc::clone(&storage);

        let _fx = Effect::new(move || {
            let _ = storage_clone.get("a");
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        storage.remove("a");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prefix_applies_to_backend_keys() {
        let backend = Arc::new(MemoryStorage::new());
        let settings = ReactiveStorage::with_prefix(backend.clone(), "settings.");
        let session = ReactiveStorage::with_prefix(backend.clone(), "session.");

        settings.set("theme", "dark");
        session.set("theme", "light");

        assert_eq!(backend.get("settings.theme"), Some("dark".to_string()));
        assert_eq!(backend.get("session.theme"), Some("light".to_string()));
        assert_eq!(settings.get("theme"), Some("dark".to_string()));
        assert_eq!(session.get("theme"), Some("light".to_string()));
    }

    #[test]
    fn clear_resets_without_notifying() {
        let storage = Arc::new(ReactiveStorage::in_memory());
        storage.set("a", "1");

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);
        let storage_clone = Arc::clone(&storage);

        let _fx = Effect::new(move || {
            let _ = storage_clone.get("a");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(storage.signal_count(), 1);

        storage.clear();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(storage.signal_count(), 0);
        assert_eq!(storage.get("a"), None);

        // The old subscription died with its trigger.
        storage.set("a", "2");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
