//! Cache entry model and per-kind size estimation.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::time::{now_ms, secs_to_ms};

/// Revalidate value assigned to an entry that is served stale: the render
/// engine treats it as "serve, but trigger regeneration immediately".
pub const STALE_REVALIDATE_SENTINEL_SECS: u64 = 1;

/// The kind of render output an entry holds.
///
/// Determines the size-estimation and serialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// A memoized upstream fetch response.
    Fetch,
    /// A pages-router HTML page with its props payload.
    Page,
    /// An app-router HTML page with its RSC payload.
    AppPage,
    /// A raw route handler response body.
    Route,
}

/// Rendered content plus its ancillary fields, tagged by kind.
///
/// Entries read back from the durable store may predate the current set of
/// kinds; those land in the `Unknown` arm instead of failing the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CachePayload {
    /// Upstream fetch response body.
    Fetch {
        /// Response body text.
        body: String,
        /// Snapshot of the upstream response headers.
        headers: BTreeMap<String, String>,
        /// Upstream status code.
        status: u16,
    },
    /// Pages-router page.
    Page {
        /// Rendered HTML.
        html: String,
        /// Serialized page props consumed on hydration.
        page_data: serde_json::Value,
        /// Response headers snapshot.
        headers: BTreeMap<String, String>,
        /// Response status code.
        status: u16,
    },
    /// App-router page.
    AppPage {
        /// Rendered HTML.
        html: String,
        /// Flight payload for client navigation, when produced.
        rsc_data: Option<String>,
        /// Response headers snapshot.
        headers: BTreeMap<String, String>,
        /// Response status code.
        status: u16,
    },
    /// Raw route handler output.
    Route {
        /// Response body bytes.
        body: Vec<u8>,
        /// Response headers snapshot.
        headers: BTreeMap<String, String>,
        /// Response status code.
        status: u16,
    },
    /// A shape no current kind matches; preserved verbatim.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

impl CachePayload {
    /// The kind of this payload, if it matches a known shape.
    pub fn kind(&self) -> Option<CacheKind> {
        match self {
            Self::Fetch { .. } => Some(CacheKind::Fetch),
            Self::Page { .. } => Some(CacheKind::Page),
            Self::AppPage { .. } => Some(CacheKind::AppPage),
            Self::Route { .. } => Some(CacheKind::Route),
            Self::Unknown(_) => None,
        }
    }

    /// Response status code, where the payload carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. }
            | Self::Page { status, .. }
            | Self::AppPage { status, .. }
            | Self::Route { status, .. } => Some(*status),
            Self::Unknown(_) => None,
        }
    }

    /// Headers snapshot, where the payload carries one.
    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Fetch { headers, .. }
            | Self::Page { headers, .. }
            | Self::AppPage { headers, .. }
            | Self::Route { headers, .. } => Some(headers),
            Self::Unknown(_) => None,
        }
    }
}

/// Soft TTL after which an entry is due for regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidate {
    /// Stale after this many seconds.
    After(u64),
    /// Never goes stale on its own (tags may still invalidate it).
    Never,
}

impl Revalidate {
    /// The TTL in seconds, if finite.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::After(secs) => Some(*secs),
            Self::Never => None,
        }
    }
}

// Wire form per the render-engine contract: a number of seconds, or
// `false` for no revalidation.
impl Serialize for Revalidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::After(secs) => serializer.serialize_u64(*secs),
            Self::Never => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for Revalidate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Bool(false) => Ok(Self::Never),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(Self::After)
                .ok_or_else(|| D::Error::custom("revalidate must be a non-negative integer")),
            other => Err(D::Error::custom(format!(
                "revalidate must be a number or false, got {other}"
            ))),
        }
    }
}

/// Hard TTL after which an entry must not be served at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Unservable after this many seconds.
    After(u64),
    /// Never hard-expires on its own.
    Never,
}

impl Expiry {
    /// The hard TTL in seconds, if finite.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::After(secs) => Some(*secs),
            Self::Never => None,
        }
    }
}

// Wire form: a number of seconds, or null/absent for infinite.
impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::After(secs) => serializer.serialize_u64(*secs),
            Self::Never => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<u64>::deserialize(deserializer)? {
            Some(secs) => Ok(Self::After(secs)),
            None => Ok(Self::Never),
        }
    }
}

fn expiry_is_never(expiry: &Expiry) -> bool {
    matches!(expiry, Expiry::Never)
}

/// The unit of cached content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Stable identifier for a render output (route + variation).
    pub key: String,
    /// Rendered body plus ancillary fields.
    pub value: CachePayload,
    /// When this entry was produced, epoch milliseconds.
    pub timestamp: u64,
    /// Soft TTL.
    #[serde(rename = "revalidateSeconds")]
    pub revalidate: Revalidate,
    /// Hard TTL.
    #[serde(rename = "expireSeconds", default = "default_expiry")]
    #[serde(skip_serializing_if = "expiry_is_never")]
    pub expire: Expiry,
    /// Content tags whose invalidation overrides the TTL.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_expiry() -> Expiry {
    Expiry::Never
}

impl CacheEntry {
    /// Create an entry timestamped now, with no TTL and no tags.
    pub fn new(key: impl Into<String>, value: CachePayload) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: now_ms(),
            revalidate: Revalidate::Never,
            expire: Expiry::Never,
            tags: Vec::new(),
        }
    }

    /// Override the production timestamp (epoch milliseconds).
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp = timestamp_ms;
        self
    }

    /// Set the soft TTL.
    pub fn with_revalidate(mut self, revalidate: Revalidate) -> Self {
        self.revalidate = revalidate;
        self.normalize();
        self
    }

    /// Set the hard TTL.
    pub fn with_expire(mut self, expire: Expiry) -> Self {
        self.expire = expire;
        self.normalize();
        self
    }

    /// Attach content tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    // Entries arrive from the render engine and must never fail a response,
    // so `revalidate <= expire` is restored by clamping rather than rejected.
    fn normalize(&mut self) {
        if let (Revalidate::After(r), Expiry::After(e)) = (self.revalidate, self.expire) {
            if e < r {
                self.expire = Expiry::After(r);
            }
        }
    }

    /// Instant (epoch ms) at which this entry goes stale, if it ever does.
    pub fn fresh_until_ms(&self) -> Option<u64> {
        self.revalidate
            .seconds()
            .map(|secs| self.timestamp.saturating_add(secs_to_ms(secs)))
    }

    /// Instant (epoch ms) at which this entry becomes unservable, if ever.
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.expire
            .seconds()
            .map(|secs| self.timestamp.saturating_add(secs_to_ms(secs)))
    }

    /// Whether the soft TTL has elapsed at `now_ms`.
    pub fn is_past_revalidate(&self, now_ms: u64) -> bool {
        self.fresh_until_ms().is_some_and(|until| now_ms > until)
    }

    /// Whether the hard TTL has elapsed at `now_ms`. Past it the entry
    /// must not be served, not even stale.
    pub fn is_past_expire(&self, now_ms: u64) -> bool {
        self.expires_at_ms().is_some_and(|at| now_ms > at)
    }

    /// Downgrade the served TTL to the stale sentinel, leaving the value
    /// otherwise intact.
    pub fn mark_stale_for_revalidation(&mut self) {
        self.revalidate = Revalidate::After(STALE_REVALIDATE_SENTINEL_SECS);
    }

    /// Approximate in-memory size in bytes, for LRU eviction accounting.
    ///
    /// Known kinds are estimated from their dominant payload field; an
    /// `Unknown` payload falls back to the full serialized length, which is
    /// more expensive and logged as a signal of an unhandled entry shape.
    pub fn estimated_size(&self) -> usize {
        let headers_size = self
            .value
            .headers()
            .map(|h| h.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0usize);

        let body_size = match &self.value {
            CachePayload::Fetch { body, .. } => body.len(),
            CachePayload::Page {
                html, page_data, ..
            } => html.len() + page_data.to_string().len(),
            CachePayload::AppPage { html, rsc_data, .. } => {
                html.len() + rsc_data.as_ref().map(String::len).unwrap_or(0)
            }
            CachePayload::Route { body, .. } => body.len(),
            CachePayload::Unknown(value) => {
                warn!(key = %self.key, kind = "unknown", "size estimation fell back to full serialization");
                serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
            }
        };

        self.key.len() + headers_size + body_size
    }

    /// Decode an entry from its durable JSON form.
    ///
    /// A payload whose shape matches no known kind is preserved in the
    /// `Unknown` arm rather than failing the read.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
