//! Runtime voice settings derived from [`ParleyConfig`].

use std::time::Duration;

use parley_config::{ParleyConfig, VoiceMode};
use serde::Serialize;

use crate::media::IceServer;
use crate::microphone::CaptureConstraints;
use crate::speaking::DetectorSettings;

/// Connection quality derived from the last latency sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Good,
    Average,
    Bad,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityThresholds {
    pub good_below: Duration,
    pub average_below: Duration,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            good_below: Duration::from_millis(100),
            average_below: Duration::from_millis(250),
        }
    }
}

impl ConnectionQuality {
    pub fn from_latency(latency: Option<Duration>, thresholds: &QualityThresholds) -> Self {
        match latency {
            None => ConnectionQuality::Disconnected,
            Some(rtt) if rtt < thresholds.good_below => ConnectionQuality::Good,
            Some(rtt) if rtt < thresholds.average_below => ConnectionQuality::Average,
            Some(_) => ConnectionQuality::Bad,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    /// Our own participant name, used to key local speaking state.
    pub local_user: String,
    pub mode: VoiceMode,
    pub start_muted: bool,
    pub input_gain: f32,
    pub detector: DetectorSettings,
    pub quality: QualityThresholds,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub request_timeout: Duration,
    pub ice_servers: Vec<IceServer>,
    pub capture: CaptureConstraints,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from(&ParleyConfig::default())
    }
}

impl From<&ParleyConfig> for VoiceSettings {
    fn from(config: &ParleyConfig) -> Self {
        Self {
            local_user: "local".into(),
            mode: config.voice.mode,
            start_muted: config.voice.start_muted,
            input_gain: config.voice.input_gain as f32,
            detector: DetectorSettings::from(&config.voice.detector),
            quality: QualityThresholds {
                good_below: Duration::from_millis(u64::from(config.latency.good_below_ms)),
                average_below: Duration::from_millis(u64::from(config.latency.average_below_ms)),
            },
            ping_interval: Duration::from_secs(u64::from(config.latency.ping_interval_secs)),
            ping_timeout: Duration::from_millis(u64::from(config.latency.ping_timeout_ms)),
            request_timeout: Duration::from_millis(u64::from(
                config.signaling.request_timeout_ms,
            )),
            ice_servers: config.ice_servers.iter().map(IceServer::from).collect(),
            capture: CaptureConstraints::from(&config.voice),
        }
    }
}

impl VoiceSettings {
    pub fn with_local_user(mut self, name: &str) -> Self {
        self.local_user = name.to_string();
        self
    }

    pub fn quality_for(&self, latency: Option<Duration>) -> ConnectionQuality {
        ConnectionQuality::from_latency(latency, &self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::schema::IceServerConfig;

    #[test]
    fn quality_bands() {
        let t = QualityThresholds::default();
        let q = |ms| ConnectionQuality::from_latency(Some(Duration::from_millis(ms)), &t);
        assert_eq!(q(0), ConnectionQuality::Good);
        assert_eq!(q(99), ConnectionQuality::Good);
        assert_eq!(q(100), ConnectionQuality::Average);
        assert_eq!(q(249), ConnectionQuality::Average);
        assert_eq!(q(250), ConnectionQuality::Bad);
        assert_eq!(
            ConnectionQuality::from_latency(None, &t),
            ConnectionQuality::Disconnected
        );
    }

    #[test]
    fn settings_follow_config() {
        let mut config = ParleyConfig::default();
        config.voice.mode = VoiceMode::Ptt;
        config.voice.input_gain = 2.0;
        config.latency.good_below_ms = 50;
        config.ice_servers.push(IceServerConfig {
            urls: vec!["turn:relay.example.org".into()],
            username: "u".into(),
            credential: "c".into(),
        });

        let settings = VoiceSettings::from(&config).with_local_user("alice");
        assert_eq!(settings.local_user, "alice");
        assert_eq!(settings.mode, VoiceMode::Ptt);
        assert!((settings.input_gain - 2.0).abs() < f32::EPSILON);
        assert_eq!(settings.quality.good_below, Duration::from_millis(50));
        assert_eq!(settings.ping_interval, Duration::from_secs(5));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.ice_servers.len(), 1);
        assert_eq!(settings.ice_servers[0].username.as_deref(), Some("u"));
        assert_eq!(
            settings.quality_for(Some(Duration::from_millis(75))),
            ConnectionQuality::Average
        );
    }
}
