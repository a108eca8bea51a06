//! Latency probing and connection-quality thresholds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub ping_interval_secs: u32,
    pub ping_timeout_ms: u32,
    /// Round trips below this are "Good".
    pub good_below_ms: u32,
    /// Round trips below this (and not Good) are "Average"; anything else is "Bad".
    pub average_below_ms: u32,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 5,
            ping_timeout_ms: 3_000,
            good_below_ms: 100,
            average_below_ms: 250,
        }
    }
}
