//! CDN purge seam.

use async_trait::async_trait;
use isr_core::CacheResult;

/// Out-of-band purge-by-tag call exposed by the edge CDN.
#[async_trait]
pub trait CdnPurger: Send + Sync {
    /// Request the CDN drop everything cached under `tags`.
    async fn purge_tags(&self, tags: &[String]) -> CacheResult<()>;
}

/// Purger for environments without a CDN control plane (tests, local dev).
pub struct NoopPurger;

#[async_trait]
impl CdnPurger for NoopPurger {
    async fn purge_tags(&self, _tags: &[String]) -> CacheResult<()> {
        Ok(())
    }
}
