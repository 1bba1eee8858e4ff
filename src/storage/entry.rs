// src/storage/entry.rs
//! Stored entry and store statistics

use serde::{Deserialize, Serialize};

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry<T> {
    /// Unique id within the owning store
    pub id: String,

    /// Write time (milliseconds since epoch)
    pub timestamp: i64,

    /// Stored payload
    pub data: T,
}

impl<T> StorageEntry<T> {
    /// Whether the entry is older than `ttl_ms` at `now_ms`
    pub fn is_expired(&self, ttl_ms: Option<u64>, now_ms: i64) -> bool {
        match ttl_ms {
            Some(ttl) => now_ms - self.timestamp > ttl as i64,
            None => false,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Total writes
    pub pushes: u64,

    /// Entries dropped to make room
    pub evictions: u64,

    /// Entries dropped for exceeding the TTL
    pub expirations: u64,

    /// Current number of entries (including expired, unswept ones)
    pub size: usize,

    /// Configured capacity
    pub capacity: usize,
}

impl StoreStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.size as f64 / self.capacity as f64) * 100.0
        }
    }
}
