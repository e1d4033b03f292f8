//! Swarm (multi-client fan-out) configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Settings for running several independent clients against one relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Number of connections to attempt
    pub clients: u32,

    /// Delay between fan-out rounds
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Number of rounds; 0 runs until interrupted
    pub ticks: u32,

    /// Extra recipient appended to every fan-out list
    pub extra_recipient: Option<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            clients: 3,
            interval: Duration::from_secs(1),
            ticks: 10,
            extra_recipient: None,
        }
    }
}
