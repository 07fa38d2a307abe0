//! HTTP cache-control translation.
//!
//! Converts internal freshness/TTL state into outward-facing headers:
//! - Browser `Cache-Control` (CDN-only directives stripped)
//! - CDN cache-control with the durable-storage marker
//! - A `Cache-Status` diagnostic header for operators
//! - A merged vary surface so the CDN partitions entries correctly
//! - An aggressive long-cache policy for guaranteed-404 probe paths

mod control;
mod decorator;
mod notfound;
mod vary;

pub use control::*;
pub use decorator::*;
pub use notfound::*;
pub use vary::*;
