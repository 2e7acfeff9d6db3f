//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, the runtime marks subscribers stale
//!    and schedules an update pass.
//!
//! 3. The update pass refreshes memos in dependency order and re-runs
//!    effects.
//!
//! # Equality
//!
//! [`Signal::new`] notifies on every `set`, whether or not the new value
//! differs from the old one. [`Signal::with_equality`] can skip
//! notification when the value compares equal, which is what most derived
//! state wants. [`Trigger`] is the degenerate case: no value at all, every
//! `fire` notifies.
//!
//! # Thread Safety
//!
//! Signals are designed to be thread-safe. The value is protected by a
//! RwLock, and subscriber management lives in the runtime's concurrent
//! edge table.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use super::context::ReactiveContext;
use super::ids::SourceId;
use super::runtime::Runtime;

/// Change-detection policy for signals and memos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// Notify only when the new value differs from the old one.
    Changed,
    /// Notify on every write, even if the value compares equal.
    Never,
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Unique identifier for this signal.
    id: SourceId,

    /// The current value, protected by RwLock for thread safety.
    value: Arc<RwLock<T>>,

    /// Comparison used to skip redundant notifications. `None` means every
    /// write notifies.
    compare: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Every `set` notifies subscribers ([`Equality::Never`]).
    pub fn new(value: T) -> Self {
        Self {
            id: SourceId::new(),
            value: Arc::new(RwLock::new(value)),
            compare: None,
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        // Track this signal as a dependency of the current computation
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.id);

            if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
                Runtime::add_dependency(self.id, subscriber_id);
            }
        }

        // Return a clone of the value
        self.value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// This will trigger re-execution of all dependent computations,
    /// unless the signal's equality policy judges the value unchanged.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.value.write().expect("value lock poisoned");
            let unchanged = self
                .compare
                .as_ref()
                .map(|eq| eq(&guard, &value))
                .unwrap_or(false);
            if !unchanged {
                *guard = value;
            }
            !unchanged
        };

        if changed {
            Runtime::notify_source_change(self.id);
        }
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read().expect("value lock poisoned");
            f(&guard)
        };
        self.set(new_value);
    }

    /// Get the number of subscribers currently registered for this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a signal with an explicit change-detection policy.
    ///
    /// With [`Equality::Changed`], setting a value equal to the current one
    /// is a no-op and subscribers are not notified.
    pub fn with_equality(value: T, equality: Equality) -> Self {
        let compare: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>> = match equality {
            Equality::Changed => Some(Arc::new(|a: &T, b: &T| a == b)),
            Equality::Never => None,
        };

        Self {
            id: SourceId::new(),
            value: Arc::new(RwLock::new(value)),
            compare,
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            compare: self.compare.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A value-less, always-unequal signal.
///
/// A trigger carries no data. Reading it with [`Trigger::track`] subscribes
/// the current computation; [`Trigger::fire`] notifies every subscriber.
/// This is the primitive behind per-key store signals and the deep
/// tracker's dirty flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    id: SourceId,
}

impl Trigger {
    /// Create a new trigger.
    pub fn new() -> Self {
        Self { id: SourceId::new() }
    }

    /// Get the trigger's unique ID.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Subscribe the current computation to this trigger.
    ///
    /// Outside a reactive context this is a no-op.
    pub fn track(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.id);

            if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
                Runtime::add_dependency(self.id, subscriber_id);
            }
        }
    }

    /// Notify all subscribers.
    pub fn fire(&self) {
        Runtime::notify_source_change(self.id);
    }

    /// Get the number of subscribers currently registered for this trigger.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn signal_notifies_dependent_effect() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let seen_clone = seen.clone();
        let signal_clone = signal.clone();
        let effect = Effect::new(move || {
            seen_clone.store(signal_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 1);

        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn default_signal_notifies_even_when_value_is_equal() {
        let signal = Signal::new(1);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equality_signal_skips_equal_writes() {
        let signal = Signal::with_equality(1, Equality::Changed);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trigger_fires_subscribers() {
        let trigger = Trigger::new();
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            trigger.track();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger.fire();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger.fire();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn trigger_fire_without_subscribers_is_noop() {
        let trigger = Trigger::new();
        trigger.fire();
        assert_eq!(trigger.subscriber_count(), 0);
    }
}
