//! Cache-control derivation for browsers and the edge CDN.

use isr_core::{CacheConfig, CacheStatus};

/// Header names written by the translation layer.
pub mod header_names {
    /// Browser-facing cache policy.
    pub const CACHE_CONTROL: &str = "cache-control";
    /// CDN-facing cache policy, stripped before reaching browsers.
    pub const CDN_CACHE_CONTROL: &str = "cdn-cache-control";
    /// Diagnostic cache outcome, consumed by operators, never by clients.
    pub const CACHE_STATUS: &str = "cache-status";
    /// CDN cache partitioning axes.
    pub const CDN_VARY: &str = "cdn-vary";
    /// Standard vary header.
    pub const VARY: &str = "vary";
}

/// Cache name quoted in the `Cache-Status` diagnostic header.
pub const CACHE_NAME: &str = "isr";

/// Directive marking the response as backed by durable storage, so the CDN
/// can serve it from the durable tier after an edge-node eviction.
pub const DURABLE_DIRECTIVE: &str = "durable";

/// Browser policy applied when nothing cacheable remains after stripping.
pub const DEFAULT_BROWSER_POLICY: &str = "public, max-age=0, must-revalidate";

/// Derive the browser-facing `cache-control` from whatever the render
/// engine emitted: CDN-only directives (`s-maxage`,
/// `stale-while-revalidate`) are stripped, and an empty remainder falls
/// back to a conservative revalidate-always policy.
pub fn browser_cache_control(engine_value: Option<&str>) -> String {
    let remaining: Vec<&str> = engine_value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .filter(|directive| {
            let name = directive
                .split('=')
                .next()
                .unwrap_or(directive)
                .trim()
                .to_ascii_lowercase();
            name != "s-maxage" && name != "stale-while-revalidate"
        })
        .collect();

    if remaining.is_empty() {
        DEFAULT_BROWSER_POLICY.to_string()
    } else {
        remaining.join(", ")
    }
}

/// Derive the CDN-facing cache-control.
///
/// A stale serve forbids the CDN from caching the copy further, so
/// staleness is not compounded downstream; anything else advertises the
/// entry's revalidate TTL (or the configured default) with a
/// stale-while-revalidate window, always with the durable-storage marker.
pub fn cdn_cache_control(
    status: CacheStatus,
    revalidate_secs: Option<u64>,
    config: &CacheConfig,
) -> String {
    if status == CacheStatus::Stale {
        return format!("public, max-age=0, must-revalidate, {DURABLE_DIRECTIVE}");
    }

    format!(
        "s-maxage={}, stale-while-revalidate={}, {DURABLE_DIRECTIVE}",
        revalidate_secs.unwrap_or(config.default_revalidate_seconds),
        config.default_stale_while_revalidate_seconds,
    )
}

/// Map the three-valued outcome onto the standard `Cache-Status`
/// vocabulary.
pub fn cache_status_value(status: CacheStatus) -> String {
    match status {
        CacheStatus::Hit => format!("\"{CACHE_NAME}\"; hit"),
        CacheStatus::Miss => format!("\"{CACHE_NAME}\"; fwd=miss"),
        CacheStatus::Stale => format!("\"{CACHE_NAME}\"; hit; fwd=stale"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_cdn_only_directives() {
        let got = browser_cache_control(Some("public, s-maxage=60, stale-while-revalidate=300, max-age=10"));
        assert_eq!(got, "public, max-age=10");
    }

    #[test]
    fn test_defaults_when_nothing_remains() {
        assert_eq!(
            browser_cache_control(Some("s-maxage=60")),
            DEFAULT_BROWSER_POLICY
        );
        assert_eq!(browser_cache_control(None), DEFAULT_BROWSER_POLICY);
    }

    #[test]
    fn test_stale_serve_forbids_cdn_caching() {
        let got = cdn_cache_control(CacheStatus::Stale, Some(60), &CacheConfig::default());
        assert_eq!(got, "public, max-age=0, must-revalidate, durable");
    }

    #[test]
    fn test_fresh_serve_advertises_revalidate_ttl() {
        let config = CacheConfig::default();
        let got = cdn_cache_control(CacheStatus::Hit, Some(300), &config);
        assert_eq!(
            got,
            format!(
                "s-maxage=300, stale-while-revalidate={}, durable",
                config.default_stale_while_revalidate_seconds
            )
        );
    }

    #[test]
    fn test_missing_ttl_uses_large_default() {
        let config = CacheConfig::default();
        let got = cdn_cache_control(CacheStatus::Miss, None, &config);
        assert!(got.starts_with(&format!("s-maxage={}", config.default_revalidate_seconds)));
    }

    #[test]
    fn test_cache_status_vocabulary() {
        assert_eq!(cache_status_value(CacheStatus::Hit), "\"isr\"; hit");
        assert_eq!(cache_status_value(CacheStatus::Miss), "\"isr\"; fwd=miss");
        assert_eq!(
            cache_status_value(CacheStatus::Stale),
            "\"isr\"; hit; fwd=stale"
        );
    }
}
