//! Response header decoration.
//!
//! An explicit wrapper over the outgoing header collection: all writes
//! pass through, except the cache-relevant ones (vary declarations and
//! revalidate overrides), which are intercepted and folded into the final
//! translation applied in one step.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use isr_core::{CacheConfig, CacheStatus};
use tracing::warn;

use crate::control::{
    browser_cache_control, cache_status_value, cdn_cache_control, header_names,
};
use crate::notfound::{is_static_probe, NOT_FOUND_BROWSER_POLICY, NOT_FOUND_CDN_POLICY};
use crate::vary::VarySurface;

/// The render outcome the translation is derived from.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// Request path, for the 404 probe policy.
    pub path: String,
    /// Response status code.
    pub status_code: u16,
    /// How the cache served this response.
    pub cache: CacheStatus,
    /// Effective soft TTL of the served entry, if finite.
    pub revalidate_secs: Option<u64>,
}

/// Decorator over the outgoing headers of one response.
pub struct ResponseDecorator {
    headers: HeaderMap,
    vary: VarySurface,
    revalidate_override: Option<u64>,
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(err) => warn!(%name, error = %err, "dropping unrepresentable header value"),
    }
}

impl ResponseDecorator {
    /// Wrap the headers the render engine produced.
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            vary: VarySurface::new(),
            revalidate_override: None,
        }
    }

    /// Forwarding append: vary declarations are intercepted into the merge
    /// surface, everything else lands in the header map untouched.
    pub fn append(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case(header_names::VARY) {
            for axis in value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                self.vary = std::mem::take(&mut self.vary).header(axis);
            }
            return;
        }

        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(%name, "dropping unrepresentable appended header"),
        }
    }

    /// Intercepted revalidate call: overrides the TTL advertised to the
    /// CDN for this response.
    pub fn set_revalidate(&mut self, secs: u64) {
        self.revalidate_override = Some(secs);
    }

    /// Merge variation the cache layer itself requires (e.g.
    /// locale-detection state) with whatever the engine declared.
    pub fn require_vary(&mut self, surface: &VarySurface) {
        self.vary.merge(surface);
    }

    /// Apply the full outbound translation and return the final headers.
    pub fn finish(mut self, outcome: &RenderOutcome, config: &CacheConfig) -> HeaderMap {
        // Fold any engine-declared Vary into the merge surface first.
        let engine_vary: Vec<String> = self
            .headers
            .get_all(header_names::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        for axis in engine_vary {
            self.vary = std::mem::take(&mut self.vary).header(&axis);
        }
        self.headers.remove(header_names::VARY);

        if outcome.status_code == 404 && is_static_probe(&outcome.path) {
            set_header(
                &mut self.headers,
                header_names::CACHE_CONTROL,
                NOT_FOUND_BROWSER_POLICY,
            );
            set_header(
                &mut self.headers,
                header_names::CDN_CACHE_CONTROL,
                NOT_FOUND_CDN_POLICY,
            );
            return self.headers;
        }

        let engine_value = self
            .headers
            .get(header_names::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        set_header(
            &mut self.headers,
            header_names::CACHE_CONTROL,
            &browser_cache_control(engine_value.as_deref()),
        );

        let revalidate = self.revalidate_override.or(outcome.revalidate_secs);
        set_header(
            &mut self.headers,
            header_names::CDN_CACHE_CONTROL,
            &cdn_cache_control(outcome.cache, revalidate, config),
        );

        set_header(
            &mut self.headers,
            header_names::CACHE_STATUS,
            &cache_status_value(outcome.cache),
        );

        if !self.vary.is_empty() {
            set_header(
                &mut self.headers,
                header_names::CDN_VARY,
                &self.vary.to_cdn_value(),
            );
            if let Some(standard) = self.vary.to_standard_value() {
                set_header(&mut self.headers, header_names::VARY, &standard);
            }
        }

        self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status_code: u16, cache: CacheStatus) -> RenderOutcome {
        RenderOutcome {
            path: "/products/1".to_string(),
            status_code,
            cache,
            revalidate_secs: Some(60),
        }
    }

    #[test]
    fn test_browser_policy_strips_cdn_directives() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header_names::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=30, s-maxage=60"),
        );
        let decorator = ResponseDecorator::new(headers);
        let headers = decorator.finish(&outcome(200, CacheStatus::Hit), &CacheConfig::default());

        assert_eq!(
            headers.get(header_names::CACHE_CONTROL).unwrap(),
            "public, max-age=30"
        );
        assert!(headers
            .get(header_names::CDN_CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("s-maxage=60"));
    }

    #[test]
    fn test_stale_serve_and_status_header() {
        let decorator = ResponseDecorator::new(HeaderMap::new());
        let headers = decorator.finish(&outcome(200, CacheStatus::Stale), &CacheConfig::default());

        assert_eq!(
            headers.get(header_names::CDN_CACHE_CONTROL).unwrap(),
            "public, max-age=0, must-revalidate, durable"
        );
        assert_eq!(
            headers.get(header_names::CACHE_STATUS).unwrap(),
            "\"isr\"; hit; fwd=stale"
        );
    }

    #[test]
    fn test_revalidate_interception_overrides_ttl() {
        let mut decorator = ResponseDecorator::new(HeaderMap::new());
        decorator.set_revalidate(5);
        let headers = decorator.finish(&outcome(200, CacheStatus::Miss), &CacheConfig::default());
        assert!(headers
            .get(header_names::CDN_CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("s-maxage=5"));
    }

    #[test]
    fn test_vary_merge_without_duplicates() {
        let mut headers = HeaderMap::new();
        headers.insert(header_names::VARY, HeaderValue::from_static("Accept"));
        let mut decorator = ResponseDecorator::new(headers);
        decorator.append("vary", "accept, X-Device");
        decorator.require_vary(&VarySurface::new().header("X-Device").language("en"));

        let headers = decorator.finish(&outcome(200, CacheStatus::Hit), &CacheConfig::default());
        let cdn_vary = headers
            .get(header_names::CDN_VARY)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(cdn_vary, "header=accept|X-Device,language=en");
        assert_eq!(headers.get(header_names::VARY).unwrap(), "accept, X-Device");
    }

    #[test]
    fn test_probe_404_gets_long_cache() {
        let decorator = ResponseDecorator::new(HeaderMap::new());
        let outcome = RenderOutcome {
            path: "/favicon.ico".to_string(),
            status_code: 404,
            cache: CacheStatus::Miss,
            revalidate_secs: None,
        };
        let headers = decorator.finish(&outcome, &CacheConfig::default());
        assert_eq!(
            headers.get(header_names::CDN_CACHE_CONTROL).unwrap(),
            NOT_FOUND_CDN_POLICY
        );
        assert_eq!(
            headers.get(header_names::CACHE_CONTROL).unwrap(),
            NOT_FOUND_BROWSER_POLICY
        );
    }

    #[test]
    fn test_ordinary_404_not_long_cached() {
        let decorator = ResponseDecorator::new(HeaderMap::new());
        let headers = decorator.finish(&outcome(404, CacheStatus::Miss), &CacheConfig::default());
        assert_ne!(
            headers.get(header_names::CDN_CACHE_CONTROL).unwrap(),
            NOT_FOUND_CDN_POLICY
        );
    }

    #[test]
    fn test_other_appends_forwarded() {
        let mut decorator = ResponseDecorator::new(HeaderMap::new());
        decorator.append("x-custom", "1");
        let headers = decorator.finish(&outcome(200, CacheStatus::Hit), &CacheConfig::default());
        assert_eq!(headers.get("x-custom").unwrap(), "1");
    }
}
