//! Long-cache policy for guaranteed-404 probe paths.

/// Browser policy for a well-known probe 404.
pub const NOT_FOUND_BROWSER_POLICY: &str = "public, max-age=86400";

/// CDN policy for a well-known probe 404: cached aggressively so the
/// origin never regenerates a response that is guaranteed to stay 404.
pub const NOT_FOUND_CDN_POLICY: &str = "public, max-age=31536000, durable";

const PROBE_EXACT: &[&str] = &[
    "/favicon.ico",
    "/robots.txt",
    "/sitemap.xml",
    "/apple-touch-icon.png",
    "/apple-touch-icon-precomposed.png",
];

const PROBE_PREFIXES: &[&str] = &["/.well-known/", "/wp-admin", "/wp-content", "/wp-includes"];

const PROBE_SUFFIXES: &[&str] = &[".map", ".php"];

/// Whether `path` matches a well-known probe pattern: a static-looking
/// path that never existed and never will, so its 404 is safe to cache
/// for a long time.
pub fn is_static_probe(path: &str) -> bool {
    PROBE_EXACT.contains(&path)
        || PROBE_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || PROBE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}
