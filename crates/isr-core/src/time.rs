//! Epoch time helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert whole seconds to milliseconds, saturating on overflow.
pub fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}
