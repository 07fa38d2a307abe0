//! Recognized configuration surface.

use serde::{Deserialize, Serialize};

/// One year in seconds, the large default for CDN-facing TTL directives.
pub const ONE_YEAR_SECS: u64 = 31_536_000;

/// Default ceiling for the in-memory tier: 50 MiB.
pub const DEFAULT_MAX_IN_MEMORY_BYTES: usize = 50 * 1024 * 1024;

/// Cache layer configuration.
///
/// Constructed explicitly and passed to the handler; there is no ambient
/// global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Ceiling for the process-local LRU tier, in accounted bytes.
    /// Zero disables the in-memory tier entirely.
    pub max_in_memory_cache_size_bytes: usize,
    /// `s-maxage` emitted when an entry carries no finite revalidate TTL.
    pub default_revalidate_seconds: u64,
    /// `stale-while-revalidate` window emitted toward the CDN.
    pub default_stale_while_revalidate_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_in_memory_cache_size_bytes: DEFAULT_MAX_IN_MEMORY_BYTES,
            default_revalidate_seconds: ONE_YEAR_SECS,
            default_stale_while_revalidate_seconds: ONE_YEAR_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_in_memory_cache_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.default_revalidate_seconds, ONE_YEAR_SECS);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"maxInMemoryCacheSizeBytes": 0}"#).unwrap();
        assert_eq!(config.max_in_memory_cache_size_bytes, 0);
        assert_eq!(config.default_stale_while_revalidate_seconds, ONE_YEAR_SECS);
    }
}
