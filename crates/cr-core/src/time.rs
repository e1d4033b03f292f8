//! Wall-clock timestamps for envelope content

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as stamped into `log` and swarm
/// message content.
///
/// A clock set before 1970 yields 0 rather than panicking.
///
/// ```
/// use cr_core::time::current_time_millis;
///
/// assert!(current_time_millis() > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
