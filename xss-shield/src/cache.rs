//! Bounded least-recently-used stores.
//!
//! Both `get` and `put` refresh recency. When the store is full, inserting a
//! new key evicts exactly the entry whose last access is oldest.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Hit/miss/eviction counters of one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe LRU store keyed by the exact input string.
#[derive(Debug)]
pub struct LruStore<V> {
    name: &'static str,
    entries: Mutex<LruCache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> LruStore<V> {
    /// Create a store holding at most `capacity` entries. A zero capacity is
    /// raised to one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.entries.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or overwrite `key`, evicting the least recently used entry when
    /// the store is full.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let evicted = {
            let mut entries = self.entries.lock();
            match entries.push(key, value) {
                // `push` hands back the old value when the key was present.
                Some((old_key, _)) => !entries.contains(&old_key),
                None => false,
            }
        };
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(cache = self.name, "evicted least recently used entry");
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// `compute` runs outside the lock, so two callers racing on the same key
    /// may both compute; the later write wins, which is fine as long as
    /// `compute` is deterministic.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        compute: impl FnOnce(&str) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute(key)?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// Check membership without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Drop every entry. Only meant for startup-time policy changes.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
