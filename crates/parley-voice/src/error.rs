//! Error types for the voice core.

use parley_common::ParleyError;

/// Microphone acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MicError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The acquisition was superseded by `Microphone::stop`.
    #[error("microphone acquisition cancelled")]
    Cancelled,
}

/// Failures of the signaling channel itself (not of a request on it).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("signaling channel closed")]
    Closed,
}

/// Playback failures reported by an [`AudioOutput`](crate::media::AudioOutput).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("autoplay blocked until the user interacts")]
    AutoplayBlocked,

    #[error("audio output error: {0}")]
    Device(String),
}

/// Errors surfaced by voice session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("audio playback requires a user interaction")]
    InteractionRequired,

    #[error("stale response for {event}")]
    StaleResponse { event: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out waiting for {event}")]
    Timeout { event: String },

    #[error("incompatible capabilities: {0}")]
    IncompatibleCapabilities(String),

    #[error("not ready: {0}")]
    NotReady(&'static str),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("media error: {0}")]
    Media(String),
}

impl From<MicError> for VoiceError {
    fn from(err: MicError) -> Self {
        match err {
            MicError::PermissionDenied => VoiceError::PermissionDenied,
            MicError::DeviceUnavailable(msg) => VoiceError::Media(msg),
            MicError::Cancelled => VoiceError::Cancelled,
        }
    }
}

impl From<PlaybackError> for VoiceError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::AutoplayBlocked => VoiceError::InteractionRequired,
            PlaybackError::Device(msg) => VoiceError::Media(msg),
        }
    }
}

impl From<VoiceError> for ParleyError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Signaling(e) => ParleyError::Signaling(e.to_string()),
            other => ParleyError::Voice(other.to_string()),
        }
    }
}
