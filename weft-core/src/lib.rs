//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive store
//! framework. It implements:
//!
//! - Reactive primitives (signals, triggers, memos, effects)
//! - A reactive document store with per-key subscriptions
//! - Deep tracking: eager and memoized whole-graph subscription
//! - A reactive wrapper for flat key-value storage
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `store`: Shared reactive containers holding `Value` trees
//! - `deep`: Whole-graph subscription over any `ReactiveContainer`
//! - `storage`: Per-key reactive key-value storage
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::deep::track_store;
//! use weft_core::reactive::Effect;
//! use weft_core::store::StoreNode;
//!
//! let store = StoreNode::from_json(serde_json::json!({
//!     "user": { "name": "ada" }
//! })).unwrap();
//!
//! // Re-runs on any change anywhere in the store.
//! let store_clone = store.clone();
//! Effect::new(move || {
//!     let snapshot = track_store(store_clone.clone()).to_json();
//!     println!("store changed: {snapshot}");
//! });
//!
//! store.set_path(&["user".into(), "name".into()], "grace").unwrap();
//! // Effect automatically runs with the new snapshot.
//! ```

pub mod reactive;
pub mod store;
pub mod deep;
pub mod storage;
