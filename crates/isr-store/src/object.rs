//! Durable object store seam and key encoding.

use std::collections::HashMap;

use async_trait::async_trait;
use isr_core::{CacheError, CacheResult};
use tokio::sync::RwLock;

/// The durable, shared, cross-worker key-value store.
///
/// All cross-worker coordination goes through an implementation of this
/// trait; workers share no memory.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a JSON value. `Ok(None)` means the key has never been written.
    async fn get_json(&self, key: &str) -> CacheResult<Option<serde_json::Value>>;

    /// Write a JSON value, overwriting any previous one.
    async fn set_json(&self, key: &str, value: serde_json::Value) -> CacheResult<()>;
}

/// Encode a logical cache key into an opaque, collision-resistant store key.
///
/// The encoding is deterministic and reversible so stored objects can be
/// mapped back to their logical key when debugging.
pub fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Reverse [`encode_key`]. Returns `None` for malformed input.
pub fn decode_key(encoded: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut chars = encoded.bytes();
    while let Some(byte) = chars.next() {
        if byte == b'%' {
            let hi = chars.next()?;
            let lo = chars.next()?;
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

/// In-memory [`ObjectStore`] for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_json(&self, key: &str) -> CacheResult<Option<serde_json::Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_json(&self, key: &str, value: serde_json::Value) -> CacheResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// An [`ObjectStore`] that fails every call, for exercising degraded paths.
pub struct UnavailableObjectStore;

#[async_trait]
impl ObjectStore for UnavailableObjectStore {
    async fn get_json(&self, _key: &str) -> CacheResult<Option<serde_json::Value>> {
        Err(CacheError::StoreUnavailable("store offline".to_string()))
    }

    async fn set_json(&self, _key: &str, _value: serde_json::Value) -> CacheResult<()> {
        Err(CacheError::StoreUnavailable("store offline".to_string()))
    }
}
