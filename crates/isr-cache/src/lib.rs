//! Cache handler orchestration and ISR group coordination.
//!
//! This crate provides:
//! - `CacheHandler` - get/set/invalidate over the two storage tiers
//! - `BackgroundWork` - Trackers keeping post-response work alive
//! - `GroupCoordinator` - Background regeneration of ISR route groups
//! - `Renderer` / `CdnPurger` - Seams to the render engine and edge CDN

mod background;
mod group;
mod handler;
mod purge;

pub use background::*;
pub use group::*;
pub use handler::*;
pub use purge::*;
