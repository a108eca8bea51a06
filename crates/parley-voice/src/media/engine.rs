//! RTP engine seam: transports, producers, and consumers.

use async_trait::async_trait;
use parley_config::schema::IceServerConfig;
use serde_json::Value;

use super::track::AudioTrack;
use crate::error::VoiceError;
use crate::protocol::{ConsumerParams, ProducerOptions, RtpCapabilities, TransportOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDirection {
    Send,
    Receive,
}

impl TransportDirection {
    /// Value of the `isProducer` flag in transport requests.
    pub fn is_producer(self) -> bool {
        matches!(self, TransportDirection::Send)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Receive => "receive",
        }
    }
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A STUN/TURN relay passed to every transport.
#[derive(Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl From<&IceServerConfig> for IceServer {
    fn from(config: &IceServerConfig) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            urls: config.urls.clone(),
            username: non_empty(&config.username),
            credential: non_empty(&config.credential),
        }
    }
}

/// The local RTP stack.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Codecs this engine can send and receive.
    fn native_capabilities(&self) -> RtpCapabilities;

    /// Build a local transport from server-issued parameters.
    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: &TransportOptions,
        ice_servers: &[IceServer],
    ) -> Result<Box<dyn RtcTransport>, VoiceError>;
}

/// One ICE/DTLS transport.
#[async_trait]
pub trait RtcTransport: Send + Sync {
    fn id(&self) -> &str;

    fn direction(&self) -> TransportDirection;

    /// Local DTLS parameters sent in `connectTransport`.
    fn dtls_parameters(&self) -> Value;

    /// Called once the server acknowledges the DTLS handshake.
    fn mark_connected(&self);

    /// Encoding parameters for sending `track`.
    async fn prepare_producer(&self, track: &AudioTrack) -> Result<ProducerOptions, VoiceError>;

    /// Bind `track` to the server-assigned producer id.
    async fn attach_producer(
        &self,
        producer_id: &str,
        track: AudioTrack,
        paused: bool,
    ) -> Result<Box<dyn RtcProducer>, VoiceError>;

    async fn consume(&self, params: &ConsumerParams) -> Result<Box<dyn RtcConsumer>, VoiceError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Local outbound audio.
pub trait RtcProducer: Send + Sync {
    fn id(&self) -> &str;
    fn track(&self) -> &AudioTrack;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// Inbound audio from one remote producer.
pub trait RtcConsumer: Send + Sync {
    fn id(&self) -> &str;
    fn producer_id(&self) -> &str;
    fn track(&self) -> &AudioTrack;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn close(&self);
    fn is_closed(&self) -> bool;
}
