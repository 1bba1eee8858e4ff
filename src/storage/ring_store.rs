// src/storage/ring_store.rs
//! Fixed-capacity ring buffer with FIFO eviction and lazy TTL
//!
//! Writes go to the next free slot; once full, each write overwrites the
//! logically-oldest slot and reports it to `on_evict`. Expired entries stay
//! in their slots, invisible to reads, until `remove_expired()` compacts the
//! buffer.

use crate::storage::entry::{StorageEntry, StoreStats};
use crate::utils::errors::{InspectorError, Result};
use crate::utils::ids::EntryIdGenerator;
use crate::utils::time::{SharedClock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Eviction callback
pub type EvictFn<T> = Box<dyn Fn(&StorageEntry<T>) + Send + Sync>;

struct RingState<T> {
    slots: Vec<Option<StorageEntry<T>>>,
    /// Slot holding the oldest entry
    head: usize,
    len: usize,
    /// Entry id to slot
    index: HashMap<String, usize>,
    stats: StoreStats,
}

impl<T> RingState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            index: HashMap::with_capacity(capacity),
            stats: StoreStats {
                capacity,
                ..Default::default()
            },
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live slots from oldest to newest
    fn ordered(&self) -> impl Iterator<Item = &StorageEntry<T>> {
        let cap = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % cap].as_ref())
    }

    fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
        self.index.clear();
    }
}

/// Bounded FIFO store
pub struct BoundedRingStore<T> {
    name: String,
    ttl_ms: Option<u64>,
    clock: SharedClock,
    ids: EntryIdGenerator,
    on_evict: Option<EvictFn<T>>,
    state: Mutex<RingState<T>>,
}

impl<T: Clone> BoundedRingStore<T> {
    /// Create a store holding at most `max_size` entries
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(InspectorError::InvalidConfig(
                "ring store capacity must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            name: "ring".to_string(),
            ttl_ms: None,
            clock: SystemClock::shared(),
            ids: EntryIdGenerator::new(),
            on_evict: None,
            state: Mutex::new(RingState::new(max_size)),
        })
    }

    /// Name used in logs and metrics
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Expire entries older than `ttl_ms`
    pub fn with_ttl(mut self, ttl_ms: Option<u64>) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Callback for entries removed by capacity or TTL eviction
    pub fn with_on_evict<F>(mut self, on_evict: F) -> Self
    where
        F: Fn(&StorageEntry<T>) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    /// Append a value, evicting the oldest entry when full
    pub fn push(&self, data: T) -> String {
        let timestamp = self.clock.now_ms();
        let id = self.ids.next(timestamp);
        let entry = StorageEntry {
            id: id.clone(),
            timestamp,
            data,
        };

        let evicted = {
            let mut state = self.state.lock();
            let cap = state.capacity();
            state.stats.pushes += 1;

            if state.len == cap {
                let slot = state.head;
                let evicted = state.slots[slot].replace(entry);
                if let Some(old) = &evicted {
                    state.index.remove(&old.id);
                }
                state.index.insert(id.clone(), slot);
                state.head = (slot + 1) % cap;
                state.stats.evictions += 1;
                evicted
            } else {
                let slot = (state.head + state.len) % cap;
                state.slots[slot] = Some(entry);
                state.index.insert(id.clone(), slot);
                state.len += 1;
                None
            }
        };

        if let Some(old) = evicted {
            debug!(store = %self.name, id = %old.id, "Evicted oldest entry");
            metrics::counter!("inspector_store_evictions_total", "store" => self.name.clone())
                .increment(1);
            self.notify_evicted(&old);
        }

        id
    }

    /// Value for `id`, unless absent or expired
    pub fn get(&self, id: &str) -> Option<T> {
        self.get_entry(id).map(|entry| entry.data)
    }

    /// Full entry for `id`, unless absent or expired
    pub fn get_entry(&self, id: &str) -> Option<StorageEntry<T>> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let slot = *state.index.get(id)?;
        state.slots[slot]
            .as_ref()
            .filter(|entry| !entry.is_expired(self.ttl_ms, now))
            .cloned()
    }

    /// Mutate a live entry's payload in place
    ///
    /// Returns `false` when the entry was evicted, expired or never existed.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let Some(&slot) = state.index.get(id) else {
            return false;
        };
        match state.slots[slot].as_mut() {
            Some(entry) if !entry.is_expired(self.ttl_ms, now) => {
                f(&mut entry.data);
                true
            }
            _ => false,
        }
    }

    /// Live values from oldest to newest
    pub fn get_all(&self) -> Vec<T> {
        self.entries().into_iter().map(|entry| entry.data).collect()
    }

    /// Live entries from oldest to newest
    pub fn entries(&self) -> Vec<StorageEntry<T>> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let live = state
            .ordered()
            .filter(|entry| !entry.is_expired(self.ttl_ms, now))
            .cloned()
            .collect();
        live
    }

    /// First live value (oldest first) matching `predicate`
    pub fn find<P>(&self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let found = state
            .ordered()
            .filter(|entry| !entry.is_expired(self.ttl_ms, now))
            .find(|entry| predicate(&entry.data))
            .map(|entry| entry.data.clone());
        found
    }

    /// All live values (oldest first) matching `predicate`
    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let matching = state
            .ordered()
            .filter(|entry| !entry.is_expired(self.ttl_ms, now))
            .filter(|entry| predicate(&entry.data))
            .map(|entry| entry.data.clone())
            .collect();
        matching
    }

    /// Drop every entry without reporting evictions
    pub fn clear(&self) {
        self.state.lock().reset();
        debug!(store = %self.name, "Cleared");
    }

    /// Occupied slots, including expired entries not yet swept
    pub fn size(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        let state = self.state.lock();
        state.len == state.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Reclaim expired entries, reporting each to `on_evict`
    pub fn remove_expired(&self) -> usize {
        let Some(ttl) = self.ttl_ms else {
            return 0;
        };
        let now = self.clock.now_ms();

        let expired = {
            let mut state = self.state.lock();
            let cap = state.capacity();
            let mut live = Vec::with_capacity(state.len);
            let mut expired = Vec::new();

            for i in 0..state.len {
                let slot = (state.head + i) % cap;
                if let Some(entry) = state.slots[slot].take() {
                    if entry.is_expired(Some(ttl), now) {
                        expired.push(entry);
                    } else {
                        live.push(entry);
                    }
                }
            }

            state.reset();
            for (slot, entry) in live.into_iter().enumerate() {
                state.index.insert(entry.id.clone(), slot);
                state.slots[slot] = Some(entry);
                state.len += 1;
            }
            state.stats.expirations += expired.len() as u64;
            expired
        };

        if !expired.is_empty() {
            debug!(store = %self.name, count = expired.len(), "Removed expired entries");
            metrics::counter!("inspector_store_expirations_total", "store" => self.name.clone())
                .increment(expired.len() as u64);
        }
        for entry in &expired {
            self.notify_evicted(entry);
        }

        expired.len()
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            size: state.len,
            ..state.stats.clone()
        }
    }

    fn notify_evicted(&self, entry: &StorageEntry<T>) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(entry);
        }
    }
}
