//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime's update pass re-runs the
//!    effect after all affected memos have refreshed.
//!
//! 3. Before re-running, the effect clears its old subscriptions and tracks
//!    new ones during execution. Among other things, this keeps an effect's
//!    own writes from immediately re-triggering it mid-run.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Updating a UI when state changes
//! - Logging state changes
//! - Writing to files or storage
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::trace;

use super::context::ReactiveContext;
use super::ids::{SourceId, SubscriberId};
use super::runtime::{Reactive, ReactiveHandle, Runtime};

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(|| {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    /// The subscriber ID used for dependency tracking.
    subscriber_id: SubscriberId,

    /// The effect function.
    run: Box<dyn Fn() + Send + Sync>,

    /// Source IDs this effect subscribed to on its last run.
    dependencies: RwLock<HashSet<SourceId>>,

    /// Whether the effect has been disposed.
    disposed: AtomicBool,

    /// Number of times the effect has run.
    run_count: RwLock<usize>,

    /// Keeps the effect registered with the runtime for as long as it lives.
    registration: OnceLock<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);

        // Run immediately to establish dependencies
        effect.execute();

        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// Useful for cases where you want to control when the effect first runs.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            run_count: RwLock::new(0),
            registration: OnceLock::new(),
        });

        let handle = Runtime::register(inner.clone());
        let _ = inner.registration.set(handle);

        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function.
    ///
    /// This runs the function within a reactive context to track
    /// dependencies, then flushes any writes the run produced.
    pub fn execute(&self) {
        self.inner.execute();
        Runtime::flush_if_idle();
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and its subscriptions
    /// are dropped.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);

        let previous = std::mem::take(
            &mut *self
                .inner
                .dependencies
                .write()
                .expect("dependencies lock poisoned"),
        );
        Runtime::remove_subscriptions(self.inner.subscriber_id, &previous);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        *self.inner.run_count.read().expect("run_count lock poisoned")
    }

    /// Get the number of sources the effect is currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .dependencies
            .read()
            .expect("dependencies lock poisoned")
            .len()
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        trace!(subscriber = ?self.subscriber_id, "effect run");

        // Drop last run's subscriptions before re-reading
        let previous = std::mem::take(
            &mut *self
                .dependencies
                .write()
                .expect("dependencies lock poisoned"),
        );
        Runtime::remove_subscriptions(self.subscriber_id, &previous);

        // Enter a reactive context to track dependencies
        let _ctx = ReactiveContext::enter(self.subscriber_id);

        // Run the effect function
        (self.run)();

        // Get the dependencies that were accessed during execution
        let new_deps: HashSet<SourceId> = ReactiveContext::get_dependencies()
            .into_iter()
            .collect();

        // Update our dependency set
        *self
            .dependencies
            .write()
            .expect("dependencies lock poisoned") = new_deps;

        // Increment run count
        *self.run_count.write().expect("run_count lock poisoned") += 1;
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn source_id(&self) -> Option<SourceId> {
        None
    }

    fn mark_dirty(&self) {
        // Effects have no cached value; the update pass re-runs them.
    }

    fn refresh(&self) -> bool {
        false
    }

    fn schedule(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new_lazy(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Effect should not have run
        assert_eq!(run_count.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually execute
        effect.execute();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let run_count_clone = run_count.clone();
        let signal_clone = signal.clone();
        let effect = Effect::new(move || {
            signal_clone.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);

        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 3);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let run_count_clone = run_count.clone();
        let signal_clone = signal.clone();
        let effect = Effect::new(move || {
            signal_clone.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Ran once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // Dispose
        effect.dispose();
        assert!(effect.is_disposed());

        // Dependency changes no longer reach it
        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // Execute should not run either
        effect.execute();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_tracks_run_count() {
        let effect = Effect::new(|| {});

        assert_eq!(effect.run_count(), 1);

        effect.execute();
        assert_eq!(effect.run_count(), 2);

        effect.execute();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_tracks_dependency_count() {
        let a = Signal::new(0);
        let b = Signal::new(0);

        let (a_c, b_c) = (a.clone(), b.clone());
        let effect = Effect::new(move || {
            a_c.get();
            b_c.get();
        });

        assert_eq!(effect.dependency_count(), 2);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        // Same identity
        assert_eq!(effect1.subscriber_id(), effect2.subscriber_id());

        // Shared run count
        assert_eq!(effect1.run_count(), 1);
        assert_eq!(effect2.run_count(), 1);

        effect1.execute();
        assert_eq!(effect1.run_count(), 2);
        assert_eq!(effect2.run_count(), 2);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }

    #[test]
    fn dropped_effect_stops_receiving_updates() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        {
            let run_count_clone = run_count.clone();
            let signal_clone = signal.clone();
            let _effect = Effect::new(move || {
                signal_clone.get();
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            });

            signal.set(1);
            assert_eq!(run_count.load(Ordering::SeqCst), 2);
        }

        // The effect is gone; its registration was dropped with it.
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
    }
}
