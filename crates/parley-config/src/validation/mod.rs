//! Full configuration validation.
//!
//! Checks numeric ranges and cross-field ordering, collecting every
//! problem into a single `ConfigError`.

mod helpers;


use crate::schema::ParleyConfig;
use helpers::{check_coefficient, check_range};
use parley_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ParleyConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_signaling(&mut errors, config);
    validate_voice(&mut errors, config);
    validate_latency(&mut errors, config);
    validate_ice_servers(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_signaling(errors: &mut Vec<String>, config: &ParleyConfig) {
    let s = &config.signaling;
    check_range(errors, "signaling.request_timeout_ms", s.request_timeout_ms, 500..=60_000);
    check_range(errors, "signaling.heartbeat_interval_secs", s.heartbeat_interval_secs, 5..=120);
    check_range(errors, "signaling.reconnect_delay_secs", s.reconnect_delay_secs, 1..=60);
    check_range(
        errors,
        "signaling.max_reconnect_delay_secs",
        s.max_reconnect_delay_secs,
        1..=600,
    );
    if s.max_reconnect_delay_secs < s.reconnect_delay_secs {
        errors.push(
            "signaling.max_reconnect_delay_secs must not be below signaling.reconnect_delay_secs"
                .into(),
        );
    }
    if !s.url.is_empty() && !(s.url.starts_with("ws://") || s.url.starts_with("wss://")) {
        errors.push(format!("signaling.url = {} must use ws:// or wss://", s.url));
    }
}

fn validate_voice(errors: &mut Vec<String>, config: &ParleyConfig) {
    let v = &config.voice;
    check_range(errors, "voice.input_gain", v.input_gain, 0.0..=4.0);
    check_range(errors, "voice.detector.threshold", v.detector.threshold, 0.0..=1.0);
    check_coefficient(errors, "voice.detector.attack", v.detector.attack);
    check_coefficient(errors, "voice.detector.release", v.detector.release);
    check_range(errors, "voice.detector.hold_ms", v.detector.hold_ms, 0..=5_000);
    if v.ptt.key.trim().is_empty() {
        errors.push("voice.ptt.key must not be empty".into());
    }
}

fn validate_latency(errors: &mut Vec<String>, config: &ParleyConfig) {
    let l = &config.latency;
    check_range(errors, "latency.ping_interval_secs", l.ping_interval_secs, 1..=300);
    check_range(errors, "latency.ping_timeout_ms", l.ping_timeout_ms, 100..=60_000);
    if l.good_below_ms == 0 {
        errors.push("latency.good_below_ms must be greater than 0".into());
    }
    if l.good_below_ms >= l.average_below_ms {
        errors.push(format!(
            "latency.good_below_ms = {} must be below latency.average_below_ms = {}",
            l.good_below_ms, l.average_below_ms
        ));
    }
}

fn validate_ice_servers(errors: &mut Vec<String>, config: &ParleyConfig) {
    for (i, server) in config.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("ice_servers[{i}].urls must not be empty"));
        }
        for url in &server.urls {
            let known = ["stun:", "stuns:", "turn:", "turns:"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !known {
                errors.push(format!("ice_servers[{i}] url {url} is not a stun/turn URI"));
            }
        }
    }
}
