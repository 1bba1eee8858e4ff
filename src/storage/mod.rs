// src/storage/mod.rs
//! Bounded in-memory storage
//!
//! - **Ring Store**: fixed-capacity append log with FIFO eviction
//! - **Index Store**: fixed-capacity keyed map with LRU eviction
//!
//! Both support an optional time-to-live with lazy expiry: expired entries
//! are hidden from reads and reclaimed by `remove_expired()`. Every entry
//! that leaves a store through capacity or TTL eviction is reported to the
//! store's `on_evict` callback exactly once.
//!
//! # Architecture
//!
//! ```text
//! push(data) ──► [ slot | slot | slot | ... ]  ring: oldest slot overwritten
//!                  ▲ head
//!
//! set(key)   ──► { key → entry }  +  [LRU ... MRU]  index: front key evicted
//! ```

pub mod entry;
pub mod index_store;
pub mod ring_store;

pub use entry::{StorageEntry, StoreStats};
pub use index_store::BoundedIndexStore;
pub use ring_store::BoundedRingStore;
