//! Signaling endpoint configuration types.

use serde::{Deserialize, Serialize};

/// Signaling channel connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling server (e.g. `wss://chat.example.org/voice`).
    pub url: String,
    /// How long a request waits for its correlated reply.
    pub request_timeout_ms: u32,
    pub heartbeat_interval_secs: u32,
    pub reconnect_delay_secs: u32,
    pub max_reconnect_delay_secs: u32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_ms: 10_000,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

/// A STUN/TURN server handed to every transport the client creates.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl std::fmt::Debug for IceServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServerConfig")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}
