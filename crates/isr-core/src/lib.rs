//! Core types for the incremental response cache layer.
//!
//! This crate provides:
//! - `CacheEntry` / `CachePayload` - The unit of cached render output
//! - `Freshness` - Tri-state freshness verdict (fresh, stale, expired)
//! - `TagManifest` - Durable record of a tag's invalidation times
//! - `CacheConfig` - Recognized configuration surface
//! - `CacheError` - Error taxonomy shared by the cache crates

mod config;
mod entry;
mod error;
mod freshness;
mod tag;
mod time;

pub use config::*;
pub use entry::*;
pub use error::*;
pub use freshness::*;
pub use tag::*;
pub use time::*;
