// src/utils/ids.rs
//! Identifier generation

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates store entry ids
///
/// Ids combine the write timestamp with a per-generator sequence number, so
/// two writes in the same millisecond never collide.
#[derive(Debug, Default)]
pub struct EntryIdGenerator {
    seq: AtomicU64,
}

impl EntryIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for a write at `timestamp_ms`
    pub fn next(&self, timestamp_ms: i64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", timestamp_ms, seq)
    }
}

/// Fresh correlation id for one instrumented operation
pub fn new_correlation_id() -> String {
    ulid::Ulid::new().to_string()
}
