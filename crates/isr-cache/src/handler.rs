//! Cache handler: get/set/invalidate over the two storage tiers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use isr_core::{now_ms, CacheConfig, CacheEntry, CacheError, CacheResult, CacheStatus, Freshness};
use isr_store::{encode_key, MemoryCache, ObjectStore, RequestScope, TagFreshnessEvaluator, TagStore};
use tracing::{debug, warn};

use crate::background::{BackgroundWork, PlatformBackgroundWork};
use crate::purge::{CdnPurger, NoopPurger};

/// An in-flight write, shared so concurrent reads can await it instead of
/// racing a half-written entry. `None` means the write failed.
type PendingWrite = Shared<BoxFuture<'static, Option<Arc<CacheEntry>>>>;

/// A successful cache read: the entry plus how fresh it was served.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    /// The served entry. Stale serves carry the revalidate sentinel.
    pub entry: Arc<CacheEntry>,
    /// Hit or stale; misses are `None` from [`CacheHandler::get`].
    pub status: CacheStatus,
}

/// Orchestrates the request-scoped, in-memory, and durable tiers.
///
/// Constructed once per worker process and dependency-injected into
/// request handlers; there is no ambient global instance. Cache substrate
/// failures are invisible to the end user except as a miss.
pub struct CacheHandler {
    config: CacheConfig,
    memory: Arc<MemoryCache>,
    store: Arc<dyn ObjectStore>,
    tag_store: TagStore,
    evaluator: TagFreshnessEvaluator,
    pending: Mutex<HashMap<String, PendingWrite>>,
    purger: Arc<dyn CdnPurger>,
    background: Arc<dyn BackgroundWork>,
}

impl CacheHandler {
    /// Create a handler over a durable store, with defaults for the CDN
    /// purger (no-op) and background tracker (spawning).
    pub fn new(config: CacheConfig, store: Arc<dyn ObjectStore>) -> Self {
        let tag_store = TagStore::new(store.clone());
        Self {
            memory: Arc::new(MemoryCache::new(config.max_in_memory_cache_size_bytes)),
            evaluator: TagFreshnessEvaluator::new(tag_store.clone()),
            tag_store,
            store,
            config,
            pending: Mutex::new(HashMap::new()),
            purger: Arc::new(NoopPurger),
            background: Arc::new(PlatformBackgroundWork::new()),
        }
    }

    /// Replace the CDN purge seam.
    pub fn with_purger(mut self, purger: Arc<dyn CdnPurger>) -> Self {
        self.purger = purger;
        self
    }

    /// Replace the background work tracker.
    pub fn with_background(mut self, background: Arc<dyn BackgroundWork>) -> Self {
        self.background = background;
        self
    }

    /// Handler configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The background tracker in use.
    pub fn background(&self) -> Arc<dyn BackgroundWork> {
        self.background.clone()
    }

    /// Open a memoization namespace for one logical request.
    pub fn request_scope(&self, request_id: impl Into<String>) -> RequestScope {
        RequestScope::new(request_id, self.memory.clone())
    }

    fn pending_for(&self, key: &str) -> Option<PendingWrite> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Read an entry.
    ///
    /// Tier order: request scope, in-flight writes, memory LRU, durable
    /// store. Durable-store errors degrade to a miss; an expired tag or an
    /// entry past its hard TTL forces a miss; a stale outcome serves the
    /// value with its revalidate TTL downgraded to the sentinel.
    pub async fn get(&self, key: &str, scope: Option<&RequestScope>) -> Option<CacheLookup> {
        if let Some(scope) = scope {
            if let Some(entry) = scope.get(key) {
                return Some(CacheLookup {
                    entry,
                    status: CacheStatus::Hit,
                });
            }
        }

        if let Some(write) = self.pending_for(key) {
            if let Some(entry) = write.await {
                if let Some(scope) = scope {
                    scope.insert(key, entry.clone());
                }
                return Some(CacheLookup {
                    entry,
                    status: CacheStatus::Hit,
                });
            }
        }

        let now = now_ms();

        if let Some(entry) = self.memory.get(key) {
            if entry.is_past_revalidate(now) {
                // Past the soft TTL the durable tier (or regeneration) is
                // authoritative; never serve the in-memory copy.
                debug!(%key, "memory tier entry stale, discarded");
                self.memory.remove(key);
            } else {
                return self.adjudicate(key, entry, now, scope).await;
            }
        }

        let stored = match self.store.get_json(&encode_key(key)).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(%key, error = %err, "durable read failed; degrading to miss");
                return None;
            }
        };

        let entry = match CacheEntry::from_json(stored) {
            Ok(entry) => entry,
            Err(err) => {
                let malformed = CacheError::MalformedEntry {
                    key: key.to_string(),
                };
                warn!(error = %malformed, cause = %err, "degrading to miss");
                return None;
            }
        };

        let entry = Arc::new(entry);
        self.memory.insert(key, entry.clone());
        self.adjudicate(key, entry, now, scope).await
    }

    async fn adjudicate(
        &self,
        key: &str,
        entry: Arc<CacheEntry>,
        now: u64,
        scope: Option<&RequestScope>,
    ) -> Option<CacheLookup> {
        if entry.is_past_expire(now) {
            debug!(%key, "entry past its hard TTL; treating as miss");
            self.memory.remove(key);
            return None;
        }

        match self.evaluator.evaluate(&entry.tags, entry.timestamp).await {
            Freshness::Expired => {
                debug!(%key, "entry expired by tag; treating as miss");
                self.memory.remove(key);
                None
            }
            Freshness::Stale { expire_at_ms } => {
                debug!(%key, ?expire_at_ms, "entry staled by tag; serving with revalidation");
                Some(self.serve_stale(key, &entry, scope))
            }
            Freshness::Fresh => {
                if entry.is_past_revalidate(now) {
                    return Some(self.serve_stale(key, &entry, scope));
                }
                if let Some(scope) = scope {
                    scope.insert(key, entry.clone());
                }
                Some(CacheLookup {
                    entry,
                    status: CacheStatus::Hit,
                })
            }
        }
    }

    // Serve a duplicated copy with the sentinel TTL; the cached master is
    // left intact for subsequent reads.
    fn serve_stale(
        &self,
        key: &str,
        entry: &Arc<CacheEntry>,
        scope: Option<&RequestScope>,
    ) -> CacheLookup {
        let mut served = (**entry).clone();
        served.mark_stale_for_revalidation();
        let served = Arc::new(served);
        if let Some(scope) = scope {
            scope.insert(key, served.clone());
        }
        CacheLookup {
            entry: served,
            status: CacheStatus::Stale,
        }
    }

    /// Persist a pending entry under `key`.
    ///
    /// The write is registered in the pending-write map before it is
    /// driven, so concurrent reads of the same key await the settled value.
    /// The map entry is cleared once the write settles, success or failure.
    /// A failed durable write is logged and swallowed; it must not fail the
    /// response that produced it.
    pub async fn set<F>(&self, key: &str, pending: F)
    where
        F: Future<Output = CacheResult<CacheEntry>> + Send + 'static,
    {
        let memory = self.memory.clone();
        let store = self.store.clone();
        let store_key = encode_key(key);
        let owned_key = key.to_string();

        let write: PendingWrite = async move {
            let entry = match pending.await {
                Ok(entry) => Arc::new(entry),
                Err(err) => {
                    warn!(key = %owned_key, error = %err, "pending entry failed; write dropped");
                    return None;
                }
            };

            memory.insert(owned_key.clone(), entry.clone());

            match serde_json::to_value(&*entry) {
                Ok(value) => {
                    if let Err(err) = store.set_json(&store_key, value).await {
                        warn!(key = %owned_key, error = %err, "durable write failed; dropped");
                    }
                }
                Err(err) => {
                    warn!(key = %owned_key, error = %err, "entry not serializable; durable write skipped");
                }
            }

            Some(entry)
        }
        .boxed()
        .shared();

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), write.clone());

        let _ = write.clone().await;

        // A later set on the same key may have replaced this slot; only the
        // write still occupying it clears it.
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(key).is_some_and(|current| current.ptr_eq(&write)) {
            pending.remove(key);
        }
    }

    /// Invalidate `tags`: overwrite their manifests (`stale_at = now`,
    /// `expired_at = now + grace` when a grace window is requested), then
    /// request a CDN purge as tracked background work.
    pub async fn invalidate_tags(&self, tags: &[String], grace_secs: Option<u64>) {
        let written = self.tag_store.invalidate(tags, grace_secs).await;
        debug!(written, total = tags.len(), "tag manifests written");

        let purger = self.purger.clone();
        let tags = tags.to_vec();
        self.background.track(
            async move {
                if let Err(err) = purger.purge_tags(&tags).await {
                    warn!(error = %err, "CDN purge failed");
                }
            }
            .boxed(),
        );
    }

    /// The most recent hard-expiration instant across `tags`, per the
    /// render-engine contract.
    pub async fn most_recent_tag_expiration(&self, tags: &[String]) -> Option<u64> {
        self.tag_store.most_recent_expiration(tags).await
    }
}
