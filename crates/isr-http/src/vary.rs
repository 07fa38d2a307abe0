//! CDN cache partitioning axes.

/// The axes a cached response varies on, merged from what the render
/// engine declared and what the cache layer itself requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarySurface {
    /// Request header names.
    pub headers: Vec<String>,
    /// Cookie names.
    pub cookies: Vec<String>,
    /// Query parameter names.
    pub query: Vec<String>,
    /// Language/locale partitions (e.g. locale-detection state).
    pub languages: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

impl VarySurface {
    /// An empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header axis.
    pub fn header(mut self, name: impl AsRef<str>) -> Self {
        push_unique(&mut self.headers, name.as_ref());
        self
    }

    /// Add a cookie axis.
    pub fn cookie(mut self, name: impl AsRef<str>) -> Self {
        push_unique(&mut self.cookies, name.as_ref());
        self
    }

    /// Add a query parameter axis.
    pub fn query_param(mut self, name: impl AsRef<str>) -> Self {
        push_unique(&mut self.query, name.as_ref());
        self
    }

    /// Add a language partition.
    pub fn language(mut self, value: impl AsRef<str>) -> Self {
        push_unique(&mut self.languages, value.as_ref());
        self
    }

    /// Merge another surface in, dropping duplicate axes.
    pub fn merge(&mut self, other: &VarySurface) {
        for header in &other.headers {
            push_unique(&mut self.headers, header);
        }
        for cookie in &other.cookies {
            push_unique(&mut self.cookies, cookie);
        }
        for query in &other.query {
            push_unique(&mut self.query, query);
        }
        for language in &other.languages {
            push_unique(&mut self.languages, language);
        }
    }

    /// Whether no axis is declared.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.cookies.is_empty()
            && self.query.is_empty()
            && self.languages.is_empty()
    }

    /// The CDN vary header value, e.g.
    /// `header=accept|x-device,cookie=session,query=page,language=en`.
    pub fn to_cdn_value(&self) -> String {
        let mut parts = Vec::new();
        if !self.headers.is_empty() {
            parts.push(format!("header={}", self.headers.join("|")));
        }
        if !self.cookies.is_empty() {
            parts.push(format!("cookie={}", self.cookies.join("|")));
        }
        if !self.query.is_empty() {
            parts.push(format!("query={}", self.query.join("|")));
        }
        if !self.languages.is_empty() {
            parts.push(format!("language={}", self.languages.join("|")));
        }
        parts.join(",")
    }

    /// The standard `Vary` header value: header axes only, since cookies
    /// and query partitioning are CDN concepts.
    pub fn to_standard_value(&self) -> Option<String> {
        if self.headers.is_empty() {
            None
        } else {
            Some(self.headers.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_drops_duplicates() {
        let mut engine = VarySurface::new().header("Accept").query_param("page");
        let cache = VarySurface::new()
            .header("accept")
            .cookie("session")
            .language("en");
        engine.merge(&cache);

        assert_eq!(engine.headers, vec!["Accept".to_string()]);
        assert_eq!(
            engine.to_cdn_value(),
            "header=Accept,cookie=session,query=page,language=en"
        );
    }

    #[test]
    fn test_empty_surface() {
        let surface = VarySurface::new();
        assert!(surface.is_empty());
        assert_eq!(surface.to_cdn_value(), "");
        assert_eq!(surface.to_standard_value(), None);
    }

    #[test]
    fn test_standard_vary_is_headers_only() {
        let surface = VarySurface::new().header("Accept-Language").cookie("ab_test");
        assert_eq!(
            surface.to_standard_value().as_deref(),
            Some("Accept-Language")
        );
    }
}
