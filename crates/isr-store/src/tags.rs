//! Tag manifest store and freshness adjudication.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use isr_core::{now_ms, CacheError, CacheResult, Freshness, TagManifest};
use tracing::{debug, warn};

use crate::object::{encode_key, ObjectStore};

/// Store-key namespace for tag manifests, separate from cache entries.
const TAG_MANIFEST_PREFIX: &str = "_tag-manifest/";

/// Client for tag manifests in the durable store.
#[derive(Clone)]
pub struct TagStore {
    store: Arc<dyn ObjectStore>,
}

impl TagStore {
    /// Create a tag store over a durable backend.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn manifest_key(tag: &str) -> String {
        format!("{TAG_MANIFEST_PREFIX}{}", encode_key(tag))
    }

    /// Read a tag's manifest. `Ok(None)` means the tag was never
    /// invalidated and contributes fresh.
    pub async fn manifest(&self, tag: &str) -> CacheResult<Option<TagManifest>> {
        let value = self
            .store
            .get_json(&Self::manifest_key(tag))
            .await
            .map_err(|err| CacheError::TagLookup {
                tag: tag.to_string(),
                reason: err.to_string(),
            })?;

        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the manifests for every affected tag: `stale_at = now`,
    /// `expired_at = now + grace` when a grace window is requested.
    ///
    /// Individual write failures are logged and skipped; invalidation of
    /// the remaining tags proceeds. Returns the number of manifests
    /// written.
    pub async fn invalidate(&self, tags: &[String], grace_secs: Option<u64>) -> usize {
        let manifest = TagManifest::invalidated_at(now_ms(), grace_secs);
        let mut written = 0;

        for tag in tags {
            let value = match serde_json::to_value(manifest) {
                Ok(value) => value,
                Err(err) => {
                    warn!(%tag, error = %err, "failed to encode tag manifest");
                    continue;
                }
            };
            match self.store.set_json(&Self::manifest_key(tag), value).await {
                Ok(()) => written += 1,
                Err(err) => warn!(%tag, error = %err, "failed to write tag manifest"),
            }
        }

        written
    }

    /// The most recent hard-expiration instant across `tags`, if any of
    /// them was ever invalidated. Lookups run concurrently; a failed
    /// lookup is skipped after logging.
    pub async fn most_recent_expiration(&self, tags: &[String]) -> Option<u64> {
        let mut lookups: FuturesUnordered<_> =
            tags.iter().map(|tag| self.manifest(tag)).collect();

        let mut most_recent = None;
        while let Some(result) = lookups.next().await {
            match result {
                Ok(Some(manifest)) => {
                    most_recent = Some(most_recent.unwrap_or(0).max(manifest.expired_at));
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "tag expiration lookup failed; skipping tag"),
            }
        }
        most_recent
    }
}

/// Computes whether any tag on an entry condemns it as stale or expired.
#[derive(Clone)]
pub struct TagFreshnessEvaluator {
    tags: TagStore,
}

impl TagFreshnessEvaluator {
    /// Create an evaluator over a tag store.
    pub fn new(tags: TagStore) -> Self {
        Self { tags }
    }

    /// Adjudicate `tags` against `reference_ts_ms`, the timestamp of the
    /// entry under evaluation.
    ///
    /// Manifest lookups are issued concurrently. The first tag found to be
    /// expired resolves the result immediately and the remaining lookups
    /// are dropped, bounding the worst case to one durable round trip.
    /// Among several stale tags the reported cutover is the minimum of
    /// their expiry instants. A failed lookup contributes fresh (fail-open)
    /// so a transient read failure cannot mass-invalidate.
    pub async fn evaluate(&self, tags: &[String], reference_ts_ms: u64) -> Freshness {
        if tags.is_empty() || reference_ts_ms == 0 {
            return Freshness::Fresh;
        }

        let now = now_ms();
        let mut lookups: FuturesUnordered<_> = tags
            .iter()
            .map(|tag| async move { (tag.as_str(), self.tags.manifest(tag).await) })
            .collect();

        let mut any_stale = false;
        let mut min_expire_at: Option<u64> = None;

        while let Some((tag, result)) = lookups.next().await {
            let manifest = match result {
                Ok(Some(manifest)) => manifest,
                Ok(None) => continue,
                Err(err) => {
                    warn!(%tag, error = %err, "tag lookup failed; treating tag as fresh");
                    continue;
                }
            };

            if manifest.expired_at >= reference_ts_ms && manifest.expired_at <= now {
                debug!(%tag, "tag expired; short-circuiting");
                return Freshness::Expired;
            }

            if manifest.stale_at >= reference_ts_ms {
                any_stale = true;
                if manifest.expired_at >= reference_ts_ms {
                    min_expire_at = Some(match min_expire_at {
                        Some(current) => current.min(manifest.expired_at),
                        None => manifest.expired_at,
                    });
                }
            }
        }

        if any_stale {
            Freshness::Stale {
                expire_at_ms: min_expire_at,
            }
        } else {
            Freshness::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{MemoryObjectStore, UnavailableObjectStore};

    async fn store_with_manifests(manifests: &[(&str, TagManifest)]) -> TagStore {
        let store = Arc::new(MemoryObjectStore::new());
        let tags = TagStore::new(store);
        for (tag, manifest) in manifests {
            tags.store
                .set_json(
                    &TagStore::manifest_key(tag),
                    serde_json::to_value(manifest).unwrap(),
                )
                .await
                .unwrap();
        }
        tags
    }

    #[tokio::test]
    async fn test_empty_tags_and_zero_reference_are_fresh() {
        let tags = store_with_manifests(&[]).await;
        let evaluator = TagFreshnessEvaluator::new(tags);
        assert_eq!(evaluator.evaluate(&[], 1_000).await, Freshness::Fresh);
        assert_eq!(
            evaluator.evaluate(&["a".to_string()], 0).await,
            Freshness::Fresh
        );
    }

    #[tokio::test]
    async fn test_absent_manifest_contributes_fresh() {
        let tags = store_with_manifests(&[]).await;
        let evaluator = TagFreshnessEvaluator::new(tags);
        let result = evaluator.evaluate(&["never-touched".to_string()], 1_000).await;
        assert_eq!(result, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_expired_tag_condemns_regardless_of_others() {
        let now = now_ms();
        let tags = store_with_manifests(&[
            (
                "fresh",
                TagManifest {
                    stale_at: 0,
                    expired_at: 0,
                },
            ),
            (
                "expired",
                TagManifest {
                    stale_at: now - 1_000,
                    expired_at: now - 1_000,
                },
            ),
        ])
        .await;
        let evaluator = TagFreshnessEvaluator::new(tags);
        let result = evaluator
            .evaluate(&["fresh".to_string(), "expired".to_string()], now - 5_000)
            .await;
        assert_eq!(result, Freshness::Expired);
    }

    #[tokio::test]
    async fn test_future_expiry_is_stale_not_expired() {
        let now = now_ms();
        let tags = store_with_manifests(&[(
            "graced",
            TagManifest {
                stale_at: now,
                expired_at: now + 60_000,
            },
        )])
        .await;
        let evaluator = TagFreshnessEvaluator::new(tags);
        let result = evaluator.evaluate(&["graced".to_string()], now - 1).await;
        assert_eq!(
            result,
            Freshness::Stale {
                expire_at_ms: Some(now + 60_000)
            }
        );
    }

    #[tokio::test]
    async fn test_min_expiry_among_stale_tags() {
        let now = now_ms();
        let tags = store_with_manifests(&[
            (
                "a",
                TagManifest {
                    stale_at: now,
                    expired_at: now + 100_000,
                },
            ),
            (
                "b",
                TagManifest {
                    stale_at: now,
                    expired_at: now + 200_000,
                },
            ),
        ])
        .await;
        let evaluator = TagFreshnessEvaluator::new(tags);
        let result = evaluator
            .evaluate(&["a".to_string(), "b".to_string()], now - 1)
            .await;
        assert_eq!(
            result,
            Freshness::Stale {
                expire_at_ms: Some(now + 100_000)
            }
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_open() {
        let tags = TagStore::new(Arc::new(UnavailableObjectStore));
        let evaluator = TagFreshnessEvaluator::new(tags);
        let result = evaluator.evaluate(&["a".to_string()], 1_000).await;
        assert_eq!(result, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_invalidate_writes_every_tag() {
        let tags = store_with_manifests(&[]).await;
        let written = tags
            .invalidate(&["a".to_string(), "b".to_string()], None)
            .await;
        assert_eq!(written, 2);
        assert!(tags.manifest("a").await.unwrap().is_some());
        assert!(tags.manifest("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_most_recent_expiration_is_max() {
        let tags = store_with_manifests(&[
            (
                "a",
                TagManifest {
                    stale_at: 10,
                    expired_at: 100,
                },
            ),
            (
                "b",
                TagManifest {
                    stale_at: 10,
                    expired_at: 300,
                },
            ),
        ])
        .await;
        let got = tags
            .most_recent_expiration(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await;
        assert_eq!(got, Some(300));
    }
}
