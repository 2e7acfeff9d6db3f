//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo). [`untracked`] pushes a suppression frame instead,
//! which makes reads inert until it is popped; a computation entered inside
//! an untracked block still tracks its own dependencies normally.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::ids::{SourceId, SubscriberId};

/// The reactive context stack.
///
/// Each thread has its own stack to track which computation is running.
/// This thread-local approach avoids the need for synchronization in the
/// common case of single-threaded reactivity.
thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// A frame on the reactive context stack.
#[derive(Debug, Clone)]
enum Frame {
    /// A running computation collecting dependencies.
    Computation(ContextEntry),
    /// An `untracked` block. While this is the top frame, reads do not
    /// register dependencies.
    Suppressed,
}

/// Information about the currently executing computation.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The subscriber ID of the current computation.
    subscriber_id: SubscriberId,
    /// Dependencies collected during this computation.
    /// These are the source IDs that were read.
    dependencies: SmallVec<[SourceId; 8]>,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signals that are read will
    /// register the subscriber as a dependent.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Computation(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
            }));
        });

        Self { subscriber_id }
    }

    /// Check if reads should currently be tracked.
    ///
    /// Returns `false` when no computation is running or when the top of the
    /// stack is an `untracked` block.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            matches!(stack.borrow().last(), Some(Frame::Computation(_)))
        })
    }

    /// Get the current subscriber ID, if reads are being tracked.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Computation(entry)) => Some(entry.subscriber_id),
            _ => None,
        })
    }

    /// Record a dependency on the given source.
    ///
    /// This is called by signals and triggers when they are read.
    pub fn track_dependency(source_id: SourceId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(Frame::Computation(entry)) = stack.borrow_mut().last_mut() {
                entry.dependencies.push(source_id);
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> SmallVec<[SourceId; 8]> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Computation(entry)) => entry.dependencies.clone(),
            _ => SmallVec::new(),
        })
    }

    /// Number of frames on the stack, suppression frames included.
    ///
    /// The runtime uses this to decide whether a flush may start: a non-zero
    /// depth means user code is mid-computation, even inside `untracked`.
    pub(crate) fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(Frame::Computation(entry)) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            } else {
                debug_assert!(false, "ReactiveContext popped a suppression frame");
            }
        });
    }
}

/// Run `f` with dependency tracking suppressed.
///
/// Reads inside the closure do not subscribe the surrounding computation.
/// Computations created or re-evaluated inside the closure still track
/// their own dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct SuppressGuard;

    impl Drop for SuppressGuard {
        fn drop(&mut self) {
            CONTEXT_STACK.with(|stack| {
                let popped = stack.borrow_mut().pop();
                debug_assert!(
                    matches!(popped, Some(Frame::Suppressed)),
                    "untracked popped a computation frame"
                );
            });
        }
    }

    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Frame::Suppressed));
    let _guard = SuppressGuard;
    f()
}
