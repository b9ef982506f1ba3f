use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

// ============================================================================
// Bounded Cache - fixed-capacity LRU store for hot orders
// ============================================================================
//
// The cache holds a derived, evictable copy of persisted records; it is
// never the system of record. A single mutex guards the recency list and
// the key map together: `get` moves the entry to the front, so even reads
// mutate the structure and a read/write split would race.
//
// Lock scope covers only the in-memory mutation. Callers must not hold the
// guard across an await point; no method here does I/O.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
}

/// Fixed-capacity key→value store with least-recently-used eviction.
///
/// The binary instantiates this with `Order`; the container itself does not
/// care what it holds beyond `Clone` for returning owned copies on `get`.
pub struct BoundedCache<V> {
    entries: Mutex<LruCache<String, V>>,
    capacity: usize,
}

impl<V: Clone> BoundedCache<V> {
    /// A capacity of zero is rejected here rather than treated as a
    /// cache-disabled mode.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity_nz = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity_nz)),
            capacity,
        })
    }

    /// Inserts or replaces the value for `key` and marks it
    /// most-recently-used. When a new key would exceed capacity, the single
    /// least-recently-used entry is evicted first.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.lock().put(key.into(), value);
    }

    /// Returns an owned copy of the value and marks the key
    /// most-recently-used. A miss has no side effects.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Removes the key if present. Removing an absent key is a silent no-op;
    /// the return value reports whether anything was actually dropped.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
