//! Voice input and speaking-detection configuration types.

use serde::{Deserialize, Serialize};

/// How local transmission is gated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    /// Transmit while the push-to-talk key is held.
    Ptt,
    /// Transmit while the local speaking detector reports speech.
    #[default]
    Vad,
}

/// Push-to-talk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PttConfig {
    pub key: String,
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            key: "Backquote".into(),
        }
    }
}

/// Speaking detector tuning: RMS threshold, EMA coefficients, and hold time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub threshold: f64,
    pub attack: f64,
    pub release: f64,
    pub hold_ms: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.015,
            attack: 0.4,
            release: 0.05,
            hold_ms: 250,
        }
    }
}

/// Voice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub mode: VoiceMode,
    pub ptt: PttConfig,
    /// Join channels with the microphone muted.
    pub start_muted: bool,
    /// Gain applied to the analysis copy of the microphone signal.
    pub input_gain: f64,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub input_device: String,
    pub detector: DetectorConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            mode: VoiceMode::Vad,
            ptt: PttConfig::default(),
            start_muted: false,
            input_gain: 1.0,
            echo_cancellation: true,
            noise_suppression: true,
            input_device: "default".into(),
            detector: DetectorConfig::default(),
        }
    }
}
