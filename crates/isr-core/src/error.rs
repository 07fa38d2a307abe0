//! Error taxonomy for the cache layer.

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
///
/// Callers on the serving path degrade most of these to a cache miss
/// rather than failing the response; the variants exist so the degraded
/// paths can be logged with a stable shape.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The durable backing store could not be reached.
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(String),

    /// Failed to serialize or deserialize a cache entry or manifest.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entry whose shape matches no known payload kind.
    #[error("malformed cache entry for key {key}")]
    MalformedEntry {
        /// The logical cache key of the offending entry.
        key: String,
    },

    /// A single tag's freshness lookup failed.
    #[error("tag lookup failed for {tag}: {reason}")]
    TagLookup {
        /// The tag whose manifest could not be read.
        tag: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// A render failed while producing a pending cache entry.
    #[error("render failed: {0}")]
    Render(String),

    /// Background work (sibling regeneration, CDN purge) failed.
    #[error("background work failed: {0}")]
    BackgroundWork(String),
}
