//! Backoff between supervised session attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Delay schedule used by `courier run --reconnect`.
///
/// The first retry waits `initial`; every further one multiplies the delay
/// by `multiplier` up to `max`, plus up to `jitter` of the delay at random.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Cap on the delay before jitter
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Growth per retry; values below 1.0 are treated as 1.0
    pub multiplier: f64,

    /// Random extra as a fraction of the delay, clamped to 0.0..=1.0
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
