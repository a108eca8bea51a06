//! Channel trait, inbound events, and typed server notifications.

use async_trait::async_trait;

use crate::error::{SignalingError, VoiceError};
use crate::protocol::{
    events, ConsumerStateChange, Greeting, NewProducer, ProducerStateChange, Rejoin,
    SignalEnvelope, UserJoined, UserLeft,
};

/// A bidirectional, event-based connection to the signaling server.
///
/// Inbound traffic is delivered separately as a stream of
/// [`SignalingEvent`]s handed to [`SignalRouter::spawn`](super::SignalRouter::spawn).
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn emit(&self, envelope: SignalEnvelope) -> Result<(), SignalingError>;

    /// Server-assigned identity of the current connection, once known.
    async fn connection_id(&self) -> Option<String>;
}

/// Raw inbound traffic from a [`SignalingChannel`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Connected { connection_id: Option<String> },
    Disconnected,
    Message(SignalEnvelope),
}

/// Server pushes and connection changes, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected { connection_id: Option<String> },
    Disconnected,
    NewProducer(NewProducer),
    UserJoined(UserJoined),
    UserLeft(UserLeft),
    ProducerStateChanged(ProducerStateChange),
    ConsumerStateChanged(ConsumerStateChange),
    Rejoin(Rejoin),
    /// Any push without a typed counterpart.
    Other(SignalEnvelope),
}

impl Notification {
    pub fn from_envelope(envelope: SignalEnvelope) -> Result<Self, VoiceError> {
        let notification = match envelope.event.as_str() {
            events::CONNECTED => {
                let greeting: Greeting = envelope.decode()?;
                Notification::Connected {
                    connection_id: Some(greeting.socket_id),
                }
            }
            events::DISCONNECTED => Notification::Disconnected,
            events::NEW_PRODUCER => {
                // Older servers send `newProducer` with no payload at all.
                if envelope.payload.is_null() {
                    Notification::NewProducer(NewProducer::default())
                } else {
                    Notification::NewProducer(envelope.decode()?)
                }
            }
            events::USER_JOINED_VOICE_CHANNEL => Notification::UserJoined(envelope.decode()?),
            events::USER_LEFT_VOICE_CHANNEL => Notification::UserLeft(envelope.decode()?),
            events::CHANGE_PRODUCER_STATE => {
                Notification::ProducerStateChanged(envelope.decode()?)
            }
            events::CHANGE_CONSUMER_STATE => {
                Notification::ConsumerStateChanged(envelope.decode()?)
            }
            events::REJOIN => Notification::Rejoin(envelope.decode()?),
            _ => Notification::Other(envelope),
        };
        Ok(notification)
    }
}
