//! Client-side voice channel core for an SFU-based voice chat.
//!
//! The crate negotiates and tears down a multi-party audio session:
//! capability loading ([`device`]), one send and one receive transport
//! ([`transport`]), the local producer ([`producer`]), one consumer per
//! remote participant ([`consumer`]), microphone capture
//! ([`microphone`]), speaking detection ([`speaking`]) and push-to-talk
//! ([`ptt`]). [`session`] sequences all of it over a signaling channel
//! ([`signaling`]).
//!
//! Platform media (RTP stack, capture device, playback) sits behind the
//! traits in [`media`] and [`microphone::CaptureBackend`].

pub mod consumer;
pub mod device;
pub mod error;
pub mod media;
pub mod microphone;
pub mod producer;
pub mod protocol;
pub mod ptt;
pub mod session;
pub mod settings;
pub mod signaling;
pub mod speaking;
pub mod transport;

#[cfg(test)]
mod testing;

pub use device::Device;
pub use error::{MicError, PlaybackError, SignalingError, VoiceError};
pub use microphone::{CaptureBackend, CaptureConstraints, Microphone};
pub use session::{
    ConnectionStatus, MediaDeps, SessionMachine, VoiceClient, VoiceCommand, VoiceEvent,
    VoiceSnapshot,
};
pub use settings::{ConnectionQuality, VoiceSettings};
pub use signaling::{SignalRouter, WsSignaling, WsSignalingConfig};
