// src/storage/index_store.rs
//! Fixed-capacity keyed store with LRU eviction and lazy TTL
//!
//! Holds "latest value per slot" data. An access-order list tracks key
//! usage: `set` and successful `get` move a key to the most-recently-used
//! end, and inserting a new key at capacity evicts the key at the front.

use crate::storage::entry::{StorageEntry, StoreStats};
use crate::utils::errors::{InspectorError, Result};
use crate::utils::ids::EntryIdGenerator;
use crate::utils::time::{SharedClock, SystemClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use tracing::debug;

/// Eviction callback receiving the evicted key and entry
pub type KeyedEvictFn<K, T> = Box<dyn Fn(&K, &StorageEntry<T>) + Send + Sync>;

struct IndexState<K, T> {
    entries: HashMap<K, StorageEntry<T>>,
    /// Least recently used at the front
    order: VecDeque<K>,
    stats: StoreStats,
}

impl<K: Eq + Hash + Clone, T> IndexState<K, T> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn remove(&mut self, key: &K) -> Option<StorageEntry<T>> {
        let entry = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry)
    }
}

/// Bounded LRU store
pub struct BoundedIndexStore<K, T> {
    name: String,
    capacity: usize,
    ttl_ms: Option<u64>,
    clock: SharedClock,
    ids: EntryIdGenerator,
    on_evict: Option<KeyedEvictFn<K, T>>,
    state: Mutex<IndexState<K, T>>,
}

impl<K, T> BoundedIndexStore<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone,
{
    /// Create a store holding at most `max_size` keys
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(InspectorError::InvalidConfig(
                "index store capacity must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            name: "index".to_string(),
            capacity: max_size,
            ttl_ms: None,
            clock: SystemClock::shared(),
            ids: EntryIdGenerator::new(),
            on_evict: None,
            state: Mutex::new(IndexState {
                entries: HashMap::with_capacity(max_size),
                order: VecDeque::with_capacity(max_size),
                stats: StoreStats {
                    capacity: max_size,
                    ..Default::default()
                },
            }),
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
        self.set_clock(clock);
        self
    }

    /// Swap the time source in place
    pub fn set_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }

    /// Callback for entries removed by LRU or TTL eviction
    pub fn with_on_evict<F>(mut self, on_evict: F) -> Self
    where
        F: Fn(&K, &StorageEntry<T>) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    /// Insert or replace the value under `key` and mark it most recently used
    pub fn set(&self, key: K, data: T) {
        let timestamp = self.clock.now_ms();
        let entry = StorageEntry {
            id: self.ids.next(timestamp),
            timestamp,
            data,
        };

        let evicted = {
            let mut state = self.state.lock();
            state.stats.pushes += 1;

            let mut evicted = None;
            if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
                if let Some(lru) = state.order.pop_front() {
                    if let Some(old) = state.entries.remove(&lru) {
                        state.stats.evictions += 1;
                        evicted = Some((lru, old));
                    }
                }
            }

            state.entries.insert(key.clone(), entry);
            state.touch(&key);
            evicted
        };

        if let Some((lru, old)) = evicted {
            debug!(store = %self.name, key = ?lru, "Evicted least recently used key");
            metrics::counter!("inspector_store_evictions_total", "store" => self.name.clone())
                .increment(1);
            self.notify_evicted(&lru, &old);
        }
    }

    /// Value under `key`; refreshes recency, drops the key if expired
    pub fn get(&self, key: &K) -> Option<T> {
        let now = self.clock.now_ms();

        let expired = {
            let mut state = self.state.lock();
            let is_expired = state.entries.get(key)?.is_expired(self.ttl_ms, now);
            if is_expired {
                state.stats.expirations += 1;
                state.remove(key)
            } else {
                state.touch(key);
                return state.entries.get(key).map(|entry| entry.data.clone());
            }
        };

        if let Some(entry) = expired {
            self.notify_evicted(key, &entry);
        }
        None
    }

    /// Whether a live value exists under `key`; does not refresh recency
    pub fn has(&self, key: &K) -> bool {
        let now = self.clock.now_ms();

        let expired = {
            let mut state = self.state.lock();
            match state.entries.get(key) {
                None => return false,
                Some(entry) if !entry.is_expired(self.ttl_ms, now) => return true,
                Some(_) => {
                    state.stats.expirations += 1;
                    state.remove(key)
                }
            }
        };

        if let Some(entry) = expired {
            self.notify_evicted(key, &entry);
        }
        false
    }

    /// Remove `key`; explicit deletion is not reported as an eviction
    pub fn delete(&self, key: &K) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Drop every entry without reporting evictions
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Stored keys, including expired ones not yet swept
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live keys from least to most recently used
    pub fn keys(&self) -> Vec<K> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let keys = state
            .order
            .iter()
            .filter(|key| {
                state
                    .entries
                    .get(*key)
                    .is_some_and(|entry| !entry.is_expired(self.ttl_ms, now))
            })
            .cloned()
            .collect();
        keys
    }

    /// Live values from least to most recently used
    pub fn values(&self) -> Vec<T> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let values = state
            .order
            .iter()
            .filter_map(|key| state.entries.get(key))
            .filter(|entry| !entry.is_expired(self.ttl_ms, now))
            .map(|entry| entry.data.clone())
            .collect();
        values
    }

    /// Reclaim expired entries, reporting each to `on_evict`
    pub fn remove_expired(&self) -> usize {
        if self.ttl_ms.is_none() {
            return 0;
        }
        let now = self.clock.now_ms();

        let expired: Vec<(K, StorageEntry<T>)> = {
            let mut state = self.state.lock();
            let keys: Vec<K> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(self.ttl_ms, now))
                .map(|(key, _)| key.clone())
                .collect();

            let removed: Vec<_> = keys
                .into_iter()
                .filter_map(|key| state.remove(&key).map(|entry| (key, entry)))
                .collect();
            state.stats.expirations += removed.len() as u64;
            removed
        };

        if !expired.is_empty() {
            debug!(store = %self.name, count = expired.len(), "Removed expired entries");
            metrics::counter!("inspector_store_expirations_total", "store" => self.name.clone())
                .increment(expired.len() as u64);
        }
        for (key, entry) in &expired {
            self.notify_evicted(key, entry);
        }

        expired.len()
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            size: state.entries.len(),
            ..state.stats.clone()
        }
    }

    fn notify_evicted(&self, key: &K, entry: &StorageEntry<T>) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use std::sync::Arc;

    type Evictions = Arc<Mutex<Vec<(&'static str, u32)>>>;

    fn recording_store(capacity: usize) -> (BoundedIndexStore<&'static str, u32>, Evictions) {
        let evicted: Evictions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let store = BoundedIndexStore::new(capacity).unwrap().with_on_evict(
            move |key: &&'static str, entry: &StorageEntry<u32>| sink.lock().push((*key, entry.data)),
        );
        (store, evicted)
    }

    #[test]
    fn test_set_and_get() {
        let (store, _) = recording_store(3);
        store.set("fps", 60);
        store.set("memory", 128);

        assert_eq!(store.get(&"fps"), Some(60));
        assert!(store.has(&"memory"));
        assert!(!store.has(&"metrics"));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let (store, evicted) = recording_store(2);
        store.set("fps", 30);
        store.set("fps", 60);

        assert_eq!(store.size(), 1);
        assert_eq!(store.get(&"fps"), Some(60));
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn test_lru_eviction_respects_reads() {
        let (store, evicted) = recording_store(3);
        store.set("a", 1);
        store.set("b", 2);
        store.set("c", 3);

        // Reading "a" makes "b" the least recently used
        assert_eq!(store.get(&"a"), Some(1));
        store.set("d", 4);

        assert_eq!(*evicted.lock(), vec![("b", 2)]);
        assert_eq!(store.keys(), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_lru_eviction_respects_writes() {
        let (store, evicted) = recording_store(2);
        store.set("a", 1);
        store.set("b", 2);
        store.set("a", 10);
        store.set("c", 3);

        assert_eq!(*evicted.lock(), vec![("b", 2)]);
        assert_eq!(store.values(), vec![10, 3]);
    }

    #[test]
    fn test_has_does_not_refresh() {
        let (store, evicted) = recording_store(2);
        store.set("a", 1);
        store.set("b", 2);
        assert!(store.has(&"a"));
        store.set("c", 3);

        assert_eq!(*evicted.lock(), vec![("a", 1)]);
    }

    #[test]
    fn test_delete_and_clear() {
        let (store, evicted) = recording_store(3);
        store.set("a", 1);
        store.set("b", 2);

        assert!(store.delete(&"a"));
        assert!(!store.delete(&"a"));
        assert_eq!(store.keys(), vec!["b"]);

        store.clear();
        assert!(store.is_empty());
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn test_expired_read_deletes_and_reports() {
        let clock = Arc::new(ManualClock::new(0));
        let evicted: Evictions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let store = BoundedIndexStore::new(4)
            .unwrap()
            .with_ttl(Some(100))
            .with_clock(clock.clone())
            .with_on_evict(move |key: &&'static str, entry: &StorageEntry<u32>| {
                sink.lock().push((*key, entry.data))
            });

        store.set("fps", 60);
        store.set("memory", 64);
        clock.advance(101);

        // Hidden from listings without being removed
        assert!(store.values().is_empty());
        assert!(store.keys().is_empty());
        assert_eq!(store.size(), 2);

        // get deletes and reports
        assert_eq!(store.get(&"fps"), None);
        assert_eq!(store.size(), 1);
        assert_eq!(*evicted.lock(), vec![("fps", 60)]);

        // has deletes and reports
        assert!(!store.has(&"memory"));
        assert_eq!(store.size(), 0);
        assert_eq!(evicted.lock().len(), 2);

        // Already gone: no second report
        assert_eq!(store.get(&"fps"), None);
        assert_eq!(evicted.lock().len(), 2);
    }

    #[test]
    fn test_remove_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let (store, evicted) = recording_store(4);
        let store = store.with_ttl(Some(50)).with_clock(clock.clone());

        store.set("a", 1);
        clock.advance(40);
        store.set("b", 2);
        clock.advance(20);

        assert_eq!(store.remove_expired(), 1);
        assert_eq!(*evicted.lock(), vec![("a", 1)]);
        assert_eq!(store.keys(), vec!["b"]);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_remove_expired_without_ttl() {
        let (store, _) = recording_store(2);
        store.set("a", 1);
        assert_eq!(store.remove_expired(), 0);
    }
}
