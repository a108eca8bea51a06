//! Configuration schema types for Parley.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod latency;
mod logging;
mod signaling;
mod voice;

pub use latency::*;
pub use logging::*;
pub use signaling::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Parley.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub signaling: SignalingConfig,
    pub voice: VoiceConfig,
    pub latency: LatencyConfig,
    /// STUN/TURN relays merged into every transport created.
    pub ice_servers: Vec<IceServerConfig>,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_signaling() {
        let config = ParleyConfig::default();
        assert!(config.signaling.url.is_empty());
        assert_eq!(config.signaling.request_timeout_ms, 10_000);
        assert_eq!(config.signaling.heartbeat_interval_secs, 25);
        assert_eq!(config.signaling.reconnect_delay_secs, 1);
        assert_eq!(config.signaling.max_reconnect_delay_secs, 30);
    }

    #[test]
    fn default_voice() {
        let config = ParleyConfig::default();
        assert_eq!(config.voice.mode, VoiceMode::Vad);
        assert_eq!(config.voice.ptt.key, "Backquote");
        assert!(!config.voice.start_muted);
        assert!((config.voice.input_gain - 1.0).abs() < f64::EPSILON);
        assert!((config.voice.detector.threshold - 0.015).abs() < f64::EPSILON);
        assert_eq!(config.voice.detector.hold_ms, 250);
    }

    #[test]
    fn default_latency() {
        let config = ParleyConfig::default();
        assert_eq!(config.latency.ping_interval_secs, 5);
        assert_eq!(config.latency.ping_timeout_ms, 3_000);
        assert_eq!(config.latency.good_below_ms, 100);
        assert_eq!(config.latency.average_below_ms, 250);
    }

    #[test]
    fn default_has_no_ice_servers() {
        assert!(ParleyConfig::default().ice_servers.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ParleyConfig = toml::from_str(
            r#"
[voice]
mode = "ptt"

[[ice_servers]]
urls = ["turn:relay.example.org:3478"]
username = "u"
credential = "c"
"#,
        )
        .unwrap();
        assert_eq!(config.voice.mode, VoiceMode::Ptt);
        assert_eq!(config.voice.detector.hold_ms, 250);
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].username, "u");
        assert_eq!(config.latency.average_below_ms, 250);
    }
}
