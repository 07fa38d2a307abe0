//! Tag invalidation manifests.

use serde::{Deserialize, Serialize};

use crate::time::secs_to_ms;

/// Authoritative record of when a content tag was last invalidated.
///
/// Manifests are never deleted, only overwritten with newer timestamps;
/// readers must tolerate absence (never invalidated means always fresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagManifest {
    /// Most recent soft invalidation, epoch milliseconds.
    pub stale_at: u64,
    /// Most recent hard invalidation, epoch milliseconds. Equals `stale_at`
    /// for immediate-expire invalidations, or lies in the future when a
    /// grace window was requested.
    pub expired_at: u64,
}

impl TagManifest {
    /// Build the manifest written by an invalidation at `now_ms`, with an
    /// optional grace window before the hard cutover.
    pub fn invalidated_at(now_ms: u64, grace_secs: Option<u64>) -> Self {
        Self {
            stale_at: now_ms,
            expired_at: now_ms.saturating_add(grace_secs.map(secs_to_ms).unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_invalidation() {
        let m = TagManifest::invalidated_at(5_000, None);
        assert_eq!(m.stale_at, 5_000);
        assert_eq!(m.expired_at, 5_000);
    }

    #[test]
    fn test_grace_window_defers_hard_cutover() {
        let m = TagManifest::invalidated_at(5_000, Some(60));
        assert_eq!(m.stale_at, 5_000);
        assert_eq!(m.expired_at, 65_000);
    }
}
