//! Per-request memoization namespace over the shared memory tier.

use std::sync::Arc;

use isr_core::CacheEntry;

use crate::memory::MemoryCache;

/// Request-scoped view of the process-local cache.
///
/// Within one logical request, repeated reads of the same key observe one
/// durable-store round trip and a consistent value, and a write earlier in
/// the request is visible to later reads before durable persistence
/// completes. Only the key namespace is request-scoped; eviction accounting
/// is shared globally across requests.
#[derive(Clone)]
pub struct RequestScope {
    request_id: String,
    memory: Arc<MemoryCache>,
}

impl RequestScope {
    /// Create a scope for one logical request.
    pub fn new(request_id: impl Into<String>, memory: Arc<MemoryCache>) -> Self {
        Self {
            request_id: request_id.into(),
            memory,
        }
    }

    /// The identifier namespacing this scope's keys.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.request_id, key)
    }

    /// Read a value memoized earlier in this request.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.memory.get(&self.scoped_key(key))
    }

    /// Memoize a value for the remainder of this request.
    pub fn insert(&self, key: &str, entry: Arc<CacheEntry>) {
        self.memory.insert(self.scoped_key(key), entry);
    }
}
