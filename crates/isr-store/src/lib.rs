//! Storage tiers for the incremental response cache layer.
//!
//! This crate provides:
//! - `ObjectStore` - The durable, shared, cross-worker backing store seam
//! - `TagStore` / `TagFreshnessEvaluator` - Tag manifests and adjudication
//! - `MemoryCache` - Process-local, byte-ceiling LRU tier
//! - `RequestScope` - Per-request memoization namespace over the LRU

mod memory;
mod object;
mod request;
mod tags;

pub use memory::*;
pub use object::*;
pub use request::*;
pub use tags::*;
