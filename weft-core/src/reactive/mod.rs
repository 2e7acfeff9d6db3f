//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, triggers, memos,
//! and effects. These primitives form the foundation of Weft's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Triggers
//!
//! A Trigger is a signal with no value. It exists purely to be tracked and
//! fired, which makes it the right primitive for invalidation that is not
//! tied to any particular piece of data.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes. Memos are useful for expensive
//! computations that should not be repeated unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as persisting to storage or logging.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod signal;
mod context;
mod ids;
mod memo;
mod effect;
mod runtime;

pub use signal::{Signal, Trigger, Equality};
pub use context::{ReactiveContext, untracked};
pub use ids::{SourceId, SubscriberId, NodeId};
pub use memo::{Memo, MemoState};
pub use effect::Effect;
pub use runtime::{Runtime, Reactive, ReactiveHandle};
