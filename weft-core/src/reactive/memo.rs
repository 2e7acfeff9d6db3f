//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the runtime marks the memo dirty.
//!
//! 4. The memo recomputes on its next read, or when an update pass pulls it
//!    in dependency order.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Dynamic Dependencies
//!
//! A memo's dependency set is rebuilt on every run: before re-executing, the
//! memo removes itself from every source it subscribed to last time. A
//! computation whose branches read different sources therefore only ever
//! hears from the sources its latest run actually touched.
//!
//! # Thread Safety
//!
//! Memos are thread-safe. The cached value and dirty state are protected
//! by locks. The computation function runs without any memo lock held.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use super::context::ReactiveContext;
use super::ids::{SourceId, SubscriberId};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::signal::Equality;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed. The memo recomputes on next read.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos might return the same value even if inputs changed).
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Identity readers subscribe to.
    source_id: SourceId,

    /// Identity used for this memo's own subscriptions.
    subscriber_id: SubscriberId,

    /// The computation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// Policy deciding whether a recomputation counts as a change.
    equality: Equality,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    /// Current dirty state.
    state: RwLock<MemoState>,

    /// Source IDs this memo subscribed to on its last run.
    dependencies: RwLock<HashSet<SourceId>>,

    /// Whether a recomputation produced a change the update pass has not
    /// consumed yet. A read can recompute a dirty memo mid-batch; without
    /// this flag the later pass would find the memo clean and stop
    /// propagating.
    pending_changed: AtomicBool,

    /// Keeps the memo registered with the runtime for as long as it lives.
    registration: OnceLock<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    /// Recomputations that produce an equal value do not notify readers
    /// ([`Equality::Changed`]).
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_equality(compute, Equality::Changed)
    }

    /// Create a memo with an explicit change-detection policy.
    ///
    /// [`Equality::Never`] makes every recomputation count as a change,
    /// which is what purely subscription-carrying memos want.
    pub fn with_equality<F>(compute: F, equality: Equality) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            source_id: SourceId::new(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            equality,
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            dependencies: RwLock::new(HashSet::new()),
            pending_changed: AtomicBool::new(false),
            registration: OnceLock::new(),
        });

        let handle = Runtime::register(inner.clone());
        let _ = inner.registration.set(handle);

        Self { inner }
    }

    /// Get the source ID readers of this memo subscribe to.
    pub fn source_id(&self) -> SourceId {
        self.inner.source_id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Within a
    /// reactive context, the reader subscribes to the memo whether or not
    /// a recomputation was needed.
    pub fn get(&self) -> T {
        // Register the reader before anything else, so even a cached read
        // establishes the edge.
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.inner.source_id);

            if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
                Runtime::add_dependency(self.inner.source_id, subscriber_id);
            }
        }

        let state = *self.inner.state.read().expect("state lock poisoned");

        match state {
            MemoState::Clean => self
                .inner
                .value
                .read()
                .expect("value lock poisoned")
                .clone()
                .expect("clean memo should have a value"),
            MemoState::Dirty => self.inner.recompute(),
        }
    }

    /// Mark the memo as needing recomputation.
    ///
    /// Called by the runtime when a dependency changes.
    pub fn mark_dirty(&self) {
        Reactive::mark_dirty(&*self.inner);
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read().expect("state lock poisoned")
    }

    /// Get the number of readers currently subscribed to this memo.
    pub fn dependent_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.source_id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .is_some()
    }
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Recompute the memo's value.
    ///
    /// This runs the computation function within a reactive context to
    /// track dependencies. If the result counts as changed under this
    /// memo's equality policy, the change is recorded for the next
    /// [`Reactive::refresh`] to report.
    fn recompute(&self) -> T {
        // Drop last run's subscriptions before re-reading; the new run may
        // touch a different set of sources.
        let previous = std::mem::take(
            &mut *self
                .dependencies
                .write()
                .expect("dependencies lock poisoned"),
        );
        Runtime::remove_subscriptions(self.subscriber_id, &previous);

        // Enter a reactive context to track dependencies
        let _ctx = ReactiveContext::enter(self.subscriber_id);

        // Run the computation
        let new_value = (self.compute)();

        // Get the dependencies that were accessed during computation
        let new_deps: HashSet<SourceId> = ReactiveContext::get_dependencies()
            .into_iter()
            .collect();

        // Update our dependency set
        *self
            .dependencies
            .write()
            .expect("dependencies lock poisoned") = new_deps;

        // Check if value actually changed
        let (had_value, changed) = {
            let current = self.value.read().expect("value lock poisoned");
            let changed = match self.equality {
                Equality::Never => true,
                Equality::Changed => current.as_ref() != Some(&new_value),
            };
            (current.is_some(), changed)
        };

        // The first computation is not a change; no reader has seen an
        // earlier value.
        if changed && had_value {
            self.pending_changed.store(true, Ordering::SeqCst);
        }

        // Update cached value
        *self.value.write().expect("value lock poisoned") = Some(new_value.clone());

        // Mark as clean
        *self.state.write().expect("state lock poisoned") = MemoState::Clean;

        new_value
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn source_id(&self) -> Option<SourceId> {
        Some(self.source_id)
    }

    fn mark_dirty(&self) {
        let mut state = self.state.write().expect("state lock poisoned");
        *state = MemoState::Dirty;
    }

    fn refresh(&self) -> bool {
        let state = *self.state.read().expect("state lock poisoned");
        if state == MemoState::Dirty {
            self.recompute();
        }

        // A read may have recomputed this memo since it was marked; the
        // change still has to reach downstream exactly once.
        self.pending_changed.swap(false, Ordering::SeqCst)
    }

    fn schedule(&self) {
        // Memos are lazy; the update pass pulls them via refresh.
    }

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("source_id", &self.inner.source_id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
