//! Process-local, byte-ceiling LRU tier.

use std::sync::{Arc, Mutex, PoisonError};

use isr_core::CacheEntry;
use lru::LruCache;
use tracing::debug;

struct Accounted {
    entry: Arc<CacheEntry>,
    size: usize,
}

struct Inner {
    entries: LruCache<String, Accounted>,
    total_bytes: usize,
}

/// In-memory, size-bounded, per-worker cache of recently read/written
/// entries.
///
/// Holds non-authoritative copies subject to eviction at any time; eviction
/// is synchronous and size-triggered, in LRU order. A ceiling of zero
/// disables the tier entirely (no entry is ever retained).
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl MemoryCache {
    /// Create a tier with the given accounted-byte ceiling.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read an entry, promoting it to most-recently-used.
    ///
    /// Returns a shared handle to the cached master; the master stays
    /// intact for subsequent reads.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        if self.max_bytes == 0 {
            return None;
        }
        self.lock().entries.get(key).map(|a| a.entry.clone())
    }

    /// Insert or overwrite an entry, then evict least-recently-used
    /// entries until the ceiling is respected.
    pub fn insert(&self, key: impl Into<String>, entry: Arc<CacheEntry>) {
        if self.max_bytes == 0 {
            return;
        }

        let key = key.into();
        let size = entry.estimated_size();
        if size > self.max_bytes {
            debug!(%key, size, "entry larger than the memory tier ceiling; not retained");
            return;
        }

        let mut inner = self.lock();
        if let Some(replaced) = inner.entries.put(key, Accounted { entry, size }) {
            inner.total_bytes -= replaced.size;
        }
        inner.total_bytes += size;

        while inner.total_bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    inner.total_bytes -= evicted.size;
                    debug!(key = %evicted_key, size = evicted.size, "evicted from memory tier");
                }
                None => break,
            }
        }
    }

    /// Drop an entry, if present.
    pub fn remove(&self, key: &str) {
        let mut inner = self.lock();
        if let Some(removed) = inner.entries.pop(key) {
            inner.total_bytes -= removed.size;
        }
    }

    /// Currently accounted bytes.
    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the tier retains nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isr_core::CachePayload;
    use std::collections::BTreeMap;

    fn entry(key: &str, body_len: usize) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(
            key,
            CachePayload::Route {
                body: vec![0u8; body_len],
                headers: BTreeMap::new(),
                status: 200,
            },
        ))
    }

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryCache::new(10_000);
        cache.insert("/a", entry("/a", 100));
        assert!(cache.get("/a").is_some());
        assert!(cache.get("/b").is_none());
    }

    #[test]
    fn test_evicts_lru_order_until_under_ceiling() {
        // Each entry accounts ~1000 bytes of body plus its key.
        let cache = MemoryCache::new(2_100);
        cache.insert("/a", entry("/a", 1_000));
        cache.insert("/b", entry("/b", 1_000));
        // Touch /a so /b becomes least recently used.
        assert!(cache.get("/a").is_some());
        cache.insert("/c", entry("/c", 1_000));

        assert!(cache.get("/b").is_none());
        assert!(cache.get("/a").is_some());
        assert!(cache.get("/c").is_some());
        assert!(cache.total_bytes() <= 2_100);
    }

    #[test]
    fn test_zero_ceiling_retains_nothing() {
        let cache = MemoryCache::new(0);
        cache.insert("/a", entry("/a", 10));
        assert!(cache.get("/a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_overwrite_reaccounts_size() {
        let cache = MemoryCache::new(10_000);
        cache.insert("/a", entry("/a", 1_000));
        let first = cache.total_bytes();
        cache.insert("/a", entry("/a", 500));
        assert!(cache.total_bytes() < first);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oversized_entry_not_retained() {
        let cache = MemoryCache::new(100);
        cache.insert("/a", entry("/a", 1_000));
        assert!(cache.get("/a").is_none());
        assert_eq!(cache.total_bytes(), 0);
    }
}
