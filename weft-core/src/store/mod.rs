//! Reactive Store
//!
//! A store is a tree (or graph) of shared [`StoreNode`] containers holding
//! [`Value`]s. Reads subscribe at key granularity; writes notify exactly
//! the subscribers whose keys changed. Nodes compare by identity, so the
//! same node reached through two parents is still one node, with one set
//! of subscriptions.
//!
//! The deep-tracking engine in [`crate::deep`] builds on two node-level
//! primitives exposed here: the own trigger (any own mutation) and the
//! shape trigger (keys appearing or disappearing).

mod value;
mod node;

pub use value::Value;
pub use node::{StoreNode, WeakStoreNode, Key, StoreError, WriteOutcome};
