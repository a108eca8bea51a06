//! Wire types for the voice signaling protocol.
//!
//! Every message is a JSON envelope `{event, payload, ref}`. Requests
//! carry a `ref` and the server echoes it on the reply; pushes from the
//! server carry none. Payload field names are camelCase on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VoiceError;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names used on the signaling channel.
pub mod events {
    pub const JOIN_VOICE_CHANNEL: &str = "joinVoiceChannel";
    pub const GET_RTP_CAPABILITIES: &str = "getRtpCapabilities";
    pub const CREATE_TRANSPORT: &str = "createTransport";
    pub const CREATE_PRODUCE_TRANSPORT: &str = "createProduceTransport";
    pub const CREATE_CONSUME_TRANSPORT: &str = "createConsumeTransport";
    pub const CONNECT_TRANSPORT: &str = "connectTransport";
    pub const TRANSPORT_CONNECTED: &str = "transportConnected";
    pub const PRODUCE: &str = "produce";
    pub const CONSUME: &str = "consume";
    pub const CHANGE_PRODUCER_STATE: &str = "changeProducerState";
    pub const CHANGE_CONSUMER_STATE: &str = "changeConsumerState";
    pub const NEW_PRODUCER: &str = "newProducer";
    pub const USER_JOINED_VOICE_CHANNEL: &str = "userJoinedVoiceChannel";
    pub const USER_LEFT_VOICE_CHANNEL: &str = "userLeftVoiceChannel";
    pub const LEAVE_VOICE_CHANNEL: &str = "leaveVoiceChannel";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const REJOIN: &str = "rejoin";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single signaling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
}

impl SignalEnvelope {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
            msg_ref: None,
        }
    }

    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }

    /// Decode the payload into a typed message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, VoiceError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| VoiceError::Protocol(format!("malformed {} payload: {e}", self.event)))
    }

    /// Reject a reply whose event name is not the one the request expects.
    pub fn expect_event(&self, expected: &str) -> Result<(), VoiceError> {
        if self.event == expected {
            Ok(())
        } else {
            Err(VoiceError::Protocol(format!(
                "expected {expected} reply, got {}",
                self.event
            )))
        }
    }
}

/// Serialize a typed payload into a JSON value.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Value, VoiceError> {
    serde_json::to_value(payload).map_err(|e| VoiceError::Protocol(format!("encode: {e}")))
}

// ---------------------------------------------------------------------------
// RTP capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Codec and header-extension support advertised by a router or a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    #[serde(default)]
    pub parameters: Value,
}

impl RtpCapabilities {
    /// Stereo Opus at 48 kHz, the only codec a voice-only client needs.
    pub fn opus() -> Self {
        Self {
            codecs: vec![RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/opus".into(),
                clock_rate: 48_000,
                channels: Some(2),
                preferred_payload_type: Some(100),
                parameters: serde_json::json!({ "useinbandfec": 1 }),
            }],
            header_extensions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel membership
// ---------------------------------------------------------------------------

/// A participant as the server describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_deafened: bool,
}

impl Member {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            display_name: None,
            is_muted: false,
            is_deafened: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinVoiceChannel {
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Reply to `joinVoiceChannel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilitiesResponse {
    pub rtp_capabilities: RtpCapabilities,
    #[serde(default)]
    pub channel: Option<ChannelInfo>,
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    pub is_producer: bool,
    pub rtp_capabilities: RtpCapabilities,
    pub channel_id: String,
}

/// Server-side transport parameters used to build the local transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: String,
    #[serde(default)]
    pub ice_parameters: Value,
    #[serde(default)]
    pub ice_candidates: Value,
    #[serde(default)]
    pub dtls_parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransportResponse {
    pub params: TransportOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub dtls_parameters: Value,
    pub channel_id: String,
    pub is_producer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConnected {
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Producers and consumers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerOptions {
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub channel_id: String,
    pub producer_options: ProducerOptions,
    pub is_muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub channel_id: String,
    pub rtp_capabilities: RtpCapabilities,
}

/// One consumable remote producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParams {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
    pub user: Member,
    #[serde(default)]
    pub resume_consumer: bool,
}

/// `changeProducerState` in both directions. Inbound pushes name the
/// participant; some servers send `isMuted` instead of `paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerStateChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(alias = "isMuted")]
    pub paused: bool,
    #[serde(default)]
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStateChange {
    pub consumer_id: String,
    pub paused: bool,
    #[serde(default)]
    pub channel_id: String,
}

// ---------------------------------------------------------------------------
// Pushes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProducer {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoined {
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user: Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub username: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejoin {
    pub channel_id: String,
    pub socket_id: String,
}

/// First message the server sends on a fresh connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greeting {
    pub socket_id: String,
}

// ---------------------------------------------------------------------------
// Reply decoding
// ---------------------------------------------------------------------------

/// The `produce` reply is either a bare id string or an object holding it.
pub fn decode_producer_id(payload: &Value) -> Result<String, VoiceError> {
    match payload {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("producerId"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| VoiceError::Protocol("produce reply has no producer id".into())),
        other => Err(VoiceError::Protocol(format!(
            "unexpected produce reply: {other}"
        ))),
    }
}

/// Decode a `consume` reply. `null`, an object without an `id`, and an
/// empty array all mean the channel has nothing to consume.
pub fn decode_consumers(payload: &Value) -> Result<Vec<ConsumerParams>, VoiceError> {
    let parse = |value: &Value| {
        serde_json::from_value::<ConsumerParams>(value.clone())
            .map_err(|e| VoiceError::Protocol(format!("malformed consume payload: {e}")))
    };
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .filter(|item| item.get("id").is_some())
            .map(parse)
            .collect(),
        Value::Object(map) if !map.contains_key("id") => Ok(Vec::new()),
        other => Ok(vec![parse(other)?]),
    }
}
