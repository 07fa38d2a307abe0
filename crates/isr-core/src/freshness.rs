//! Freshness verdicts computed per read.

use serde::{Deserialize, Serialize};

/// Tri-state freshness of a cached entry at a reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Servable as-is.
    Fresh,
    /// Servable, but due for background regeneration.
    Stale {
        /// Next hard cutover (epoch ms), when one is known. Among several
        /// stale tags this is the most imminent expiry.
        expire_at_ms: Option<u64>,
    },
    /// Not servable; equivalent to a miss.
    Expired,
}

impl Freshness {
    /// Whether the entry is stale or worse.
    pub fn is_stale(&self) -> bool {
        !matches!(self, Self::Fresh)
    }

    /// Whether the entry must be treated as a miss.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// The next hard cutover, present only for stale-but-not-expired.
    pub fn expire_at_ms(&self) -> Option<u64> {
        match self {
            Self::Stale { expire_at_ms } => *expire_at_ms,
            _ => None,
        }
    }
}

/// Three-valued outcome of a cache lookup, as seen by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss.
    Miss,
    /// Stale hit (serving while revalidating).
    Stale,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Stale => write!(f, "STALE"),
        }
    }
}
