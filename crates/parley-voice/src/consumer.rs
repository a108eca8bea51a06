//! Inbound consumers, one per remote participant.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{PlaybackError, VoiceError};
use crate::media::{AudioOutput, AudioTrack, ElementId, RtcConsumer};
use crate::protocol::{
    decode_consumers, encode_payload, events, ConsumeRequest, ConsumerStateChange,
};
use crate::signaling::SignalScope;
use crate::transport::TransportManager;

/// A live consumer and the playback element rendering it.
pub struct ConsumerHandle {
    consumer: Box<dyn RtcConsumer>,
    participant: String,
    /// Remote mute, from moderation or the participant's own producer state.
    muted: bool,
    element: ElementId,
    playing: bool,
}

impl ConsumerHandle {
    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn consumer_id(&self) -> &str {
        self.consumer.id()
    }
}

/// Result of one `subscribe` call. An empty `created` list with no error
/// means there was nothing to consume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub created: Vec<String>,
    pub interaction_required: bool,
}

pub struct ConsumerRegistry {
    output: Arc<dyn AudioOutput>,
    consumers: HashMap<String, ConsumerHandle>,
    deafened: bool,
}

impl ConsumerRegistry {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            consumers: HashMap::new(),
            deafened: false,
        }
    }

    /// Ask the server for consumable producers in `channel_id` and build a
    /// consumer plus playback element for each one not already consumed.
    pub async fn subscribe(
        &mut self,
        transports: &mut TransportManager,
        scope: &SignalScope,
        device: &Device,
        channel_id: &str,
    ) -> Result<SubscribeOutcome, VoiceError> {
        let request = ConsumeRequest {
            channel_id: channel_id.to_string(),
            rtp_capabilities: device.rtp_capabilities()?.clone(),
        };
        let reply = scope
            .request(events::CONSUME, encode_payload(&request)?)
            .await?;
        reply.expect_event(events::CONSUME)?;
        let offers = decode_consumers(&reply.payload)?;

        let mut outcome = SubscribeOutcome::default();
        if offers.is_empty() {
            debug!(channel_id, "no producers to consume");
            return Ok(outcome);
        }

        for params in offers {
            let participant = params.user.username.clone();
            if let Some(existing) = self.consumers.get(&participant) {
                if existing.consumer.producer_id() == params.producer_id {
                    continue;
                }
                debug!(%participant, "producer replaced, re-consuming");
                self.unsubscribe(&participant);
            }

            let consumer = transports.consume(scope, channel_id, &params).await?;
            if params.resume_consumer {
                consumer.resume();
            }

            let element = self.output.attach(&participant, consumer.track());
            self.output.set_muted(element, self.deafened);
            let playing = match self.output.play(element) {
                Ok(()) => true,
                Err(PlaybackError::AutoplayBlocked) => {
                    outcome.interaction_required = true;
                    false
                }
                Err(e) => {
                    warn!(%participant, error = %e, "playback failed");
                    false
                }
            };

            info!(%participant, consumer_id = %consumer.id(), playing, "consumer created");
            self.consumers.insert(
                participant.clone(),
                ConsumerHandle {
                    consumer,
                    participant: participant.clone(),
                    muted: params.user.is_muted,
                    element,
                    playing,
                },
            );
            outcome.created.push(participant);
        }
        Ok(outcome)
    }

    /// Close the participant's consumer and remove its element.
    /// Returns whether one existed.
    pub fn unsubscribe(&mut self, participant: &str) -> bool {
        match self.consumers.remove(participant) {
            Some(handle) => {
                self.release(handle);
                true
            }
            None => false,
        }
    }

    fn release(&self, handle: ConsumerHandle) {
        handle.consumer.close();
        self.output.remove(handle.element);
        debug!(participant = %handle.participant, "consumer closed");
    }

    /// Moderation mute: pause locally and ask the server to pause forwarding.
    pub async fn set_remote_muted(
        &mut self,
        scope: &SignalScope,
        channel_id: &str,
        participant: &str,
        muted: bool,
    ) -> Result<(), VoiceError> {
        let handle = self
            .consumers
            .get_mut(participant)
            .ok_or(VoiceError::NotReady("no consumer for participant"))?;
        if muted {
            handle.consumer.pause();
        } else {
            handle.consumer.resume();
        }
        handle.muted = muted;

        let change = ConsumerStateChange {
            consumer_id: handle.consumer.id().to_string(),
            paused: muted,
            channel_id: channel_id.to_string(),
        };
        scope
            .notify(events::CHANGE_CONSUMER_STATE, encode_payload(&change)?)
            .await
    }

    /// Record a remote participant's own mute state.
    pub fn mark_muted(&mut self, participant: &str, muted: bool) {
        if let Some(handle) = self.consumers.get_mut(participant) {
            handle.muted = muted;
        }
    }

    /// Apply a server-side pause or resume of one of our consumers.
    pub fn apply_consumer_state(&mut self, consumer_id: &str, paused: bool) -> bool {
        let Some(handle) = self
            .consumers
            .values_mut()
            .find(|h| h.consumer.id() == consumer_id)
        else {
            return false;
        };
        if paused {
            handle.consumer.pause();
        } else {
            handle.consumer.resume();
        }
        true
    }

    /// Mute or unmute every playback element.
    pub fn set_deafened(&mut self, deafened: bool) {
        self.deafened = deafened;
        for handle in self.consumers.values() {
            self.output.set_muted(handle.element, deafened);
        }
    }

    /// Retry playback of elements blocked by autoplay policy.
    /// Returns whether any are still blocked.
    pub fn replay_pending(&mut self) -> bool {
        let mut still_blocked = false;
        for handle in self.consumers.values_mut().filter(|h| !h.playing) {
            match self.output.play(handle.element) {
                Ok(()) => handle.playing = true,
                Err(PlaybackError::AutoplayBlocked) => still_blocked = true,
                Err(e) => warn!(participant = %handle.participant, error = %e, "replay failed"),
            }
        }
        still_blocked
    }

    pub fn close_all(&mut self) {
        let handles: Vec<ConsumerHandle> = self.consumers.drain().map(|(_, h)| h).collect();
        for handle in handles {
            self.release(handle);
        }
    }

    pub fn get(&self, participant: &str) -> Option<&ConsumerHandle> {
        self.consumers.get(participant)
    }

    pub fn track(&self, participant: &str) -> Option<AudioTrack> {
        self.consumers
            .get(participant)
            .map(|h| h.consumer.track().clone())
    }

    pub fn participants(&self) -> Vec<String> {
        let mut names: Vec<String> = self.consumers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
