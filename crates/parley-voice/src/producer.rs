//! Local outbound producer.

use tracing::{debug, info};

use crate::error::VoiceError;
use crate::media::{AudioTrack, MediaStream, RtcProducer};
use crate::protocol::{encode_payload, events, ProducerStateChange};
use crate::signaling::SignalScope;
use crate::transport::TransportManager;

/// Owns the session's single producer. Mute is pause/resume plus a
/// `changeProducerState` notification; the producer and its track stay
/// open until [`close`](Self::close).
#[derive(Default)]
pub struct ProducerController {
    producer: Option<Box<dyn RtcProducer>>,
}

impl ProducerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the stream's first audio track to a new producer.
    ///
    /// A no-op if a producer already exists.
    pub async fn produce(
        &mut self,
        transports: &mut TransportManager,
        scope: &SignalScope,
        channel_id: &str,
        stream: &MediaStream,
        paused: bool,
    ) -> Result<(), VoiceError> {
        if self.producer.is_some() {
            debug!("producer already exists");
            return Ok(());
        }
        let track = stream
            .first_audio_track()
            .ok_or_else(|| VoiceError::Media("capture stream has no audio track".into()))?;

        let producer = transports.produce(scope, channel_id, track, paused).await?;
        info!(producer_id = %producer.id(), paused, channel_id, "producer created");
        self.producer = Some(producer);
        Ok(())
    }

    /// Pause or resume sending and tell the server.
    pub async fn set_paused(
        &mut self,
        scope: &SignalScope,
        channel_id: &str,
        paused: bool,
    ) -> Result<(), VoiceError> {
        let producer = self
            .producer
            .as_ref()
            .ok_or(VoiceError::NotReady("no producer"))?;
        if producer.is_paused() == paused {
            return Ok(());
        }

        if paused {
            producer.pause();
        } else {
            producer.resume();
        }
        debug!(producer_id = %producer.id(), paused, "producer state changed");

        let change = ProducerStateChange {
            username: None,
            paused,
            channel_id: channel_id.to_string(),
        };
        scope
            .notify(events::CHANGE_PRODUCER_STATE, encode_payload(&change)?)
            .await
    }

    pub fn is_active(&self) -> bool {
        self.producer.is_some()
    }

    pub fn is_paused(&self) -> Option<bool> {
        self.producer.as_ref().map(|p| p.is_paused())
    }

    pub fn track(&self) -> Option<&AudioTrack> {
        self.producer.as_ref().map(|p| p.track())
    }

    /// Live tracks bound to an open producer (0 or 1).
    pub fn transmitted_track_count(&self) -> usize {
        self.producer
            .as_ref()
            .filter(|p| !p.is_closed() && p.track().is_live())
            .map_or(0, |_| 1)
    }

    pub fn close(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.close();
            debug!(producer_id = %producer.id(), "producer closed");
        }
    }
}
