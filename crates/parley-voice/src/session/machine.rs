//! The session state machine.
//!
//! [`SessionMachine`] owns at most one [`VoiceSession`] and sequences its
//! negotiation and teardown. Every method runs to completion before the
//! next one starts; cancellation of in-flight round trips goes through the
//! [`SignalRouter`] epoch, never through shared flags.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_config::VoiceMode;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::client::VoiceCommand;
use super::types::{ConnectionStatus, Participant, SpeakingState, VoiceEvent, VoiceSnapshot};
use crate::consumer::ConsumerRegistry;
use crate::device::Device;
use crate::error::{MicError, VoiceError};
use crate::media::{AudioOutput, MediaEngine, TransportDirection};
use crate::microphone::{CaptureBackend, Microphone};
use crate::producer::ProducerController;
use crate::protocol::{
    encode_payload, events, JoinVoiceChannel, MediaKind, RtpCapabilitiesResponse,
};
use crate::ptt::{PushToTalk, TalkAction, TalkGate};
use crate::settings::VoiceSettings;
use crate::signaling::{Notification, SignalRouter, SignalScope};
use crate::speaking::{SpeakingMonitors, SpeakingTransition};
use crate::transport::TransportManager;

/// Platform collaborators handed to the machine.
#[derive(Clone)]
pub struct MediaDeps {
    pub engine: Arc<dyn MediaEngine>,
    pub capture: Arc<dyn CaptureBackend>,
    pub output: Arc<dyn AudioOutput>,
    /// Shared across sessions; loaded once per process.
    pub device: Arc<Device>,
}

impl MediaDeps {
    /// Build with a fresh device advertising the engine's native codecs.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        capture: Arc<dyn CaptureBackend>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let device = Arc::new(Device::new(engine.native_capabilities()));
        Self {
            engine,
            capture,
            output,
            device,
        }
    }
}

/// Receivers returned alongside a new machine.
pub struct SessionChannels {
    pub snapshots: watch::Receiver<VoiceSnapshot>,
    pub events: mpsc::Receiver<VoiceEvent>,
    /// Transitions from the session's speaking detectors; feed them back
    /// through [`SessionMachine::handle_speaking`].
    pub speaking: mpsc::Receiver<SpeakingTransition>,
}

/// Everything owned by one voice-channel membership.
struct VoiceSession {
    channel_id: String,
    scope: SignalScope,
    transports: TransportManager,
    producer: ProducerController,
    consumers: ConsumerRegistry,
    monitors: SpeakingMonitors,
}

/// The channel we last joined and the connection we joined it on.
#[derive(Debug, Clone)]
struct LastJoin {
    channel_id: String,
    connection_id: Option<String>,
}

pub struct SessionMachine {
    settings: VoiceSettings,
    router: SignalRouter,
    deps: MediaDeps,
    mic: Microphone,
    session: Option<VoiceSession>,
    status: ConnectionStatus,
    channel_id: Option<String>,
    muted: bool,
    deafened: bool,
    muted_before_deafen: bool,
    ptt: PushToTalk,
    /// Raw local detector state, independent of mute.
    voice_active: bool,
    latency: Option<Duration>,
    interaction_required: bool,
    mic_not_granted: bool,
    members: HashMap<String, Vec<Participant>>,
    speaking: HashMap<String, SpeakingState>,
    last_join: Option<LastJoin>,
    speaking_tx: mpsc::Sender<SpeakingTransition>,
    snapshot_tx: watch::Sender<VoiceSnapshot>,
    event_tx: mpsc::Sender<VoiceEvent>,
}

impl SessionMachine {
    pub fn new(
        settings: VoiceSettings,
        router: SignalRouter,
        deps: MediaDeps,
    ) -> (Self, SessionChannels) {
        let (event_tx, events) = mpsc::channel(256);
        let (speaking_tx, speaking) = mpsc::channel(256);
        let mic = Microphone::new(Arc::clone(&deps.capture), settings.capture.clone());
        let muted = settings.start_muted;
        let initial = VoiceSnapshot {
            muted,
            ..VoiceSnapshot::default()
        };
        let (snapshot_tx, snapshots) = watch::channel(initial);

        let machine = Self {
            ptt: PushToTalk::new(settings.mode),
            settings,
            router,
            deps,
            mic,
            session: None,
            status: ConnectionStatus::Idle,
            channel_id: None,
            muted,
            deafened: false,
            muted_before_deafen: muted,
            voice_active: false,
            latency: None,
            interaction_required: false,
            mic_not_granted: false,
            members: HashMap::new(),
            speaking: HashMap::new(),
            last_join: None,
            speaking_tx,
            snapshot_tx,
            event_tx,
        };
        let channels = SessionChannels {
            snapshots,
            events,
            speaking,
        };
        (machine, channels)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    // -----------------------------------------------------------------------
    // Channel selection
    // -----------------------------------------------------------------------

    /// Join `channel_id`, leaving the current channel first if it differs.
    pub async fn select_channel(&mut self, channel_id: &str) -> Result<(), VoiceError> {
        if self.session.is_some() && self.channel_id.as_deref() == Some(channel_id) {
            debug!(channel_id, "already in channel");
            return Ok(());
        }
        if self.session.is_some() {
            info!(from = ?self.channel_id, to = channel_id, "switching voice channel");
            self.teardown(true).await;
        }
        self.connect(channel_id).await
    }

    /// Leave the current channel and return to `Idle`.
    pub async fn leave(&mut self) {
        self.teardown(true).await;
        self.last_join = None;
        self.set_status(ConnectionStatus::Idle).await;
    }

    async fn connect(&mut self, channel_id: &str) -> Result<(), VoiceError> {
        let connection_id = self.router.connection_id().await;
        self.last_join = Some(LastJoin {
            channel_id: channel_id.to_string(),
            connection_id,
        });
        self.channel_id = Some(channel_id.to_string());
        self.set_status(ConnectionStatus::Connecting).await;

        let mut consumers = ConsumerRegistry::new(Arc::clone(&self.deps.output));
        consumers.set_deafened(self.deafened);
        let mut session = VoiceSession {
            channel_id: channel_id.to_string(),
            scope: self.router.scope(),
            transports: TransportManager::new(
                Arc::clone(&self.deps.engine),
                self.settings.ice_servers.clone(),
            ),
            producer: ProducerController::new(),
            consumers,
            monitors: SpeakingMonitors::new(self.settings.detector, self.speaking_tx.clone()),
        };
        info!(channel_id, epoch = session.scope.epoch(), "joining voice channel");

        let result = self.negotiate(&mut session).await;
        self.session = Some(session);
        match result {
            Ok(()) => {
                self.set_status(ConnectionStatus::Connected).await;
                Ok(())
            }
            Err(e) => {
                if e == VoiceError::Cancelled {
                    debug!(channel_id, "negotiation cancelled");
                } else {
                    warn!(channel_id, error = %e, "voice negotiation failed");
                }
                self.teardown(true).await;
                self.set_status(ConnectionStatus::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Device load, transports, producer, consumers, first ping; in that order.
    async fn negotiate(&mut self, session: &mut VoiceSession) -> Result<(), VoiceError> {
        let scope = session.scope.clone();
        let channel_id = session.channel_id.clone();

        let join = JoinVoiceChannel {
            channel_id: channel_id.clone(),
        };
        let reply = scope
            .request(events::JOIN_VOICE_CHANNEL, encode_payload(&join)?)
            .await?;
        reply.expect_event(events::GET_RTP_CAPABILITIES)?;
        let caps: RtpCapabilitiesResponse = reply.decode()?;

        let roster = caps
            .channel
            .map(|c| c.members.iter().map(Participant::from).collect())
            .unwrap_or_default();
        self.members.insert(channel_id.clone(), roster);

        self.deps.device.load(&caps.rtp_capabilities)?;

        for direction in [TransportDirection::Send, TransportDirection::Receive] {
            session
                .transports
                .create_transport(&scope, direction, &channel_id, &self.deps.device)
                .await?;
        }
        for direction in [TransportDirection::Send, TransportDirection::Receive] {
            session
                .transports
                .ensure_connected(&scope, direction, &channel_id)
                .await?;
        }

        self.start_producer(session).await?;
        self.subscribe(session).await?;

        match tokio::time::timeout(self.settings.ping_timeout, scope.ping()).await {
            Ok(Ok(rtt)) => self.record_latency(rtt).await,
            Ok(Err(VoiceError::Cancelled)) => return Err(VoiceError::Cancelled),
            Ok(Err(e)) => warn!(error = %e, "initial ping failed"),
            Err(_) => warn!("initial ping timed out"),
        }
        Ok(())
    }

    /// Acquire the mic and create the (paused) producer. Capture failures
    /// leave the session listen-only.
    async fn start_producer(&mut self, session: &mut VoiceSession) -> Result<(), VoiceError> {
        if session.producer.is_active() {
            return Ok(());
        }
        if self.muted {
            debug!("muted, not producing");
            return Ok(());
        }
        if !self.deps.device.can_produce(MediaKind::Audio) {
            warn!("device cannot send audio, joining listen-only");
            return Ok(());
        }

        let stream = match self.mic.get().await {
            Ok(stream) => stream,
            Err(MicError::Cancelled) => return Err(VoiceError::Cancelled),
            Err(e) => {
                self.mic_unavailable(&e).await;
                return Ok(());
            }
        };

        match self.settings.mode {
            VoiceMode::Ptt => self.mic.mute().await,
            VoiceMode::Vad => {
                if let Err(e) = self.mic.unmute().await {
                    self.mic_unavailable(&e).await;
                    return Ok(());
                }
                if let Some(track) = self.mic.analysis_track().await {
                    session.monitors.start(
                        &self.settings.local_user,
                        &track,
                        self.settings.input_gain,
                    );
                }
            }
        }

        session
            .producer
            .produce(
                &mut session.transports,
                &session.scope,
                &session.channel_id,
                &stream,
                true,
            )
            .await?;
        self.mic_not_granted = false;
        Ok(())
    }

    async fn subscribe(&mut self, session: &mut VoiceSession) -> Result<(), VoiceError> {
        let outcome = session
            .consumers
            .subscribe(
                &mut session.transports,
                &session.scope,
                &self.deps.device,
                &session.channel_id,
            )
            .await?;

        for participant in &outcome.created {
            if let Some(track) = session.consumers.track(participant) {
                session.monitors.start(participant, &track, 1.0);
            }
        }
        if outcome.interaction_required && !self.interaction_required {
            self.interaction_required = true;
            self.emit(VoiceEvent::InteractionRequired).await;
        }
        Ok(())
    }

    /// Release everything in reverse creation order.
    ///
    /// `send_leave` is false when the signaling channel is already gone.
    async fn teardown(&mut self, send_leave: bool) {
        let epoch = self.router.cancel_all().await;

        if let Some(mut session) = self.session.take() {
            session.monitors.stop_all();
            session.consumers.close_all();
            session.producer.close();
            session.transports.close_all();
            if send_leave {
                if let Err(e) = self
                    .router
                    .notify(events::LEAVE_VOICE_CHANNEL, Value::Null)
                    .await
                {
                    debug!(error = %e, "leave notification not sent");
                }
            }
            info!(channel_id = %session.channel_id, epoch, "voice session torn down");
        }

        self.mic.stop().await;
        self.members.clear();
        self.speaking.clear();
        self.latency = None;
        self.ptt.reset();
        self.voice_active = false;
        self.interaction_required = false;
        self.mic_not_granted = false;
        self.channel_id = None;
        self.publish();
    }

    async fn fail_session(&mut self, error: VoiceError) {
        warn!(error = %error, "voice session failed");
        self.teardown(true).await;
        self.set_status(ConnectionStatus::Disconnected).await;
        self.emit(VoiceEvent::Error(error.to_string())).await;
    }

    // -----------------------------------------------------------------------
    // Server notifications
    // -----------------------------------------------------------------------

    pub async fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Connected { connection_id } => {
                debug!(?connection_id, "signaling connected");
            }
            Notification::Disconnected => {
                if self.session.is_none() && self.status == ConnectionStatus::Idle {
                    debug!("signaling disconnected while idle");
                } else {
                    warn!(channel_id = ?self.channel_id, "signaling disconnected, tearing down");
                    self.teardown(false).await;
                    self.set_status(ConnectionStatus::Disconnected).await;
                }
            }
            Notification::NewProducer(new) => {
                let Some(mut session) = self.session.take() else {
                    return;
                };
                if new
                    .channel_id
                    .as_deref()
                    .is_some_and(|id| id != session.channel_id)
                {
                    self.session = Some(session);
                    return;
                }
                debug!(username = ?new.username, "new producer, subscribing");
                let result = self.subscribe(&mut session).await;
                self.session = Some(session);
                match result {
                    Ok(()) | Err(VoiceError::Cancelled) => {}
                    Err(e @ VoiceError::NegotiationFailed(_)) => self.fail_session(e).await,
                    Err(e) => {
                        warn!(error = %e, "subscribe after newProducer failed");
                        self.emit(VoiceEvent::Error(e.to_string())).await;
                    }
                }
            }
            Notification::UserJoined(joined) => {
                let Some(channel_id) = joined.channel_id.or_else(|| self.channel_id.clone())
                else {
                    return;
                };
                let participant = Participant::from(&joined.user);
                let roster = self.members.entry(channel_id.clone()).or_default();
                roster.retain(|p| p.username != participant.username);
                let username = participant.username.clone();
                roster.push(participant);
                info!(%channel_id, %username, "participant joined");
                self.emit(VoiceEvent::ParticipantJoined {
                    channel_id,
                    username,
                })
                .await;
            }
            Notification::UserLeft(left) => {
                let channel_id = left
                    .channel_id
                    .or_else(|| self.channel_id.clone())
                    .unwrap_or_default();
                if let Some(roster) = self.members.get_mut(&channel_id) {
                    roster.retain(|p| p.username != left.username);
                }
                if let Some(session) = self.session.as_mut() {
                    session.monitors.stop(&left.username);
                    session.consumers.unsubscribe(&left.username);
                }
                self.speaking.remove(&left.username);
                info!(%channel_id, username = %left.username, "participant left");
                self.emit(VoiceEvent::ParticipantLeft {
                    channel_id,
                    username: left.username,
                })
                .await;
            }
            Notification::ProducerStateChanged(change) => {
                let Some(username) = change.username else {
                    return;
                };
                for roster in self.members.values_mut() {
                    for p in roster.iter_mut().filter(|p| p.username == username) {
                        p.is_muted = change.paused;
                    }
                }
                if let Some(session) = self.session.as_mut() {
                    session.consumers.mark_muted(&username, change.paused);
                }
            }
            Notification::ConsumerStateChanged(change) => {
                if let Some(session) = self.session.as_mut() {
                    if !session
                        .consumers
                        .apply_consumer_state(&change.consumer_id, change.paused)
                    {
                        debug!(consumer_id = %change.consumer_id, "state change for unknown consumer");
                    }
                }
            }
            Notification::Rejoin(rejoin) => {
                if self.session.is_some() {
                    debug!("rejoin ignored, session active");
                    return;
                }
                let matches = self.last_join.as_ref().is_some_and(|last| {
                    last.channel_id == rejoin.channel_id
                        && last.connection_id.as_deref() == Some(rejoin.socket_id.as_str())
                });
                if !matches {
                    info!(channel_id = %rejoin.channel_id, "rejoin does not match previous connection");
                    return;
                }
                info!(channel_id = %rejoin.channel_id, "rejoining voice channel");
                let result = self.connect(&rejoin.channel_id).await;
                self.report(result).await;
            }
            Notification::Other(envelope) => {
                debug!(event = %envelope.event, "unhandled push");
            }
        }
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Mute, deafen, push-to-talk
    // -----------------------------------------------------------------------

    pub async fn toggle_microphone(&mut self) -> Result<(), VoiceError> {
        self.set_muted(!self.muted).await
    }

    /// Explicit user mute. Unmuting retries capture and creates the
    /// producer if the session has none yet.
    pub async fn set_muted(&mut self, muted: bool) -> Result<(), VoiceError> {
        if muted == self.muted {
            return Ok(());
        }

        if muted {
            self.muted = true;
            self.apply_talk(TalkAction::Pause { mute_mic: true }).await?;
            info!("microphone muted");
            return Ok(());
        }

        if self.session.is_none() {
            self.muted = false;
            info!("microphone unmuted");
            return Ok(());
        }
        if let Err(e) = self.mic.unmute().await {
            if e != MicError::Cancelled {
                self.mic_unavailable(&e).await;
            }
            return Err(e.into());
        }
        self.muted = false;
        self.mic_not_granted = false;
        info!("microphone unmuted");

        if let Some(mut session) = self.session.take() {
            let result = self.start_producer(&mut session).await;
            self.session = Some(session);
            result?;
        }

        match self.settings.mode {
            // Transmit only while the key is held.
            VoiceMode::Ptt => self.mic.mute().await,
            VoiceMode::Vad => {
                if self.voice_active {
                    self.apply_talk(TalkAction::Resume).await?;
                }
            }
        }
        Ok(())
    }

    /// Deafen mutes playback and the mic; undeafen restores the mic state
    /// from before deafening.
    pub async fn toggle_output_device(&mut self) -> Result<(), VoiceError> {
        if self.deafened {
            self.deafened = false;
            if let Some(session) = self.session.as_mut() {
                session.consumers.set_deafened(false);
            }
            info!("output undeafened");
            if !self.muted_before_deafen {
                self.set_muted(false).await?;
            }
        } else {
            self.muted_before_deafen = self.muted;
            self.deafened = true;
            if let Some(session) = self.session.as_mut() {
                session.consumers.set_deafened(true);
            }
            info!("output deafened");
            self.set_muted(true).await?;
        }
        Ok(())
    }

    pub async fn push_to_talk(&mut self, pressed: bool) -> Result<(), VoiceError> {
        let action = if pressed {
            let gate = self.talk_gate();
            self.ptt.key_down(gate)
        } else {
            self.ptt.key_up()
        };
        match action {
            Some(action) => self.apply_talk(action).await,
            None => Ok(()),
        }
    }

    fn talk_gate(&self) -> TalkGate {
        TalkGate {
            mic_muted: self.muted,
            mic_denied: self.mic_not_granted,
            channel_selected: self.session.is_some(),
        }
    }

    async fn apply_talk(&mut self, action: TalkAction) -> Result<(), VoiceError> {
        let local = self.settings.local_user.clone();
        match action {
            TalkAction::Resume => {
                let producing = self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.producer.is_active());
                if !producing {
                    debug!("no producer to resume");
                    return Ok(());
                }
                if let Err(e) = self.mic.unmute().await {
                    self.mic_unavailable(&e).await;
                    return Err(e.into());
                }
                let Some(session) = self.session.as_mut() else {
                    return Ok(());
                };
                session
                    .producer
                    .set_paused(&session.scope, &session.channel_id, false)
                    .await?;
                self.set_speaking(&local, true).await;
            }
            TalkAction::Pause { mute_mic } => {
                if let Some(session) = self.session.as_mut() {
                    if session.producer.is_active() {
                        session
                            .producer
                            .set_paused(&session.scope, &session.channel_id, true)
                            .await?;
                    }
                }
                if mute_mic {
                    self.mic.mute().await;
                }
                self.set_speaking(&local, false).await;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Speaking
    // -----------------------------------------------------------------------

    pub async fn handle_speaking(&mut self, transition: SpeakingTransition) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.monitors.is_current(&transition) {
            debug!(participant = %transition.participant, "dropping transition from replaced detector");
            return;
        }

        if transition.participant == self.settings.local_user {
            self.voice_active = transition.speaking;
            let gate = self.talk_gate();
            if let Some(action) = self.ptt.voice_activity(transition.speaking, gate) {
                let result = self.apply_talk(action).await;
                self.report(result).await;
            }
        } else {
            self.set_speaking(&transition.participant, transition.speaking)
                .await;
        }
        self.publish();
    }

    fn is_speaking(&self, participant: &str) -> bool {
        self.speaking.get(participant).is_some_and(|s| s.speaking)
    }

    async fn set_speaking(&mut self, participant: &str, speaking: bool) {
        if self.is_speaking(participant) == speaking {
            return;
        }
        self.speaking.insert(
            participant.to_string(),
            SpeakingState {
                speaking,
                changed_at: Utc::now(),
            },
        );
        self.emit(VoiceEvent::SpeakingChanged {
            username: participant.to_string(),
            speaking,
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // Remote audio
    // -----------------------------------------------------------------------

    /// Retry every playback element blocked by autoplay policy.
    pub fn user_interacted(&mut self) {
        if !self.interaction_required {
            return;
        }
        let still_blocked = self
            .session
            .as_mut()
            .is_some_and(|session| session.consumers.replay_pending());
        self.interaction_required = still_blocked;
        debug!(still_blocked, "replayed pending audio");
        self.publish();
    }

    pub async fn set_remote_muted(
        &mut self,
        participant: &str,
        muted: bool,
    ) -> Result<(), VoiceError> {
        let session = self
            .session
            .as_mut()
            .ok_or(VoiceError::NotReady("not in a voice channel"))?;
        session
            .consumers
            .set_remote_muted(&session.scope, &session.channel_id, participant, muted)
            .await?;
        info!(participant, muted, "remote participant mute changed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Latency
    // -----------------------------------------------------------------------

    /// Scope to ping on, while connected.
    pub fn latency_probe(&self) -> Option<SignalScope> {
        match (&self.session, self.status) {
            (Some(session), ConnectionStatus::Connected) => Some(session.scope.clone()),
            _ => None,
        }
    }

    /// Apply a ping result taken on the scope with `epoch`.
    pub async fn record_latency_result(
        &mut self,
        epoch: u64,
        result: Result<Duration, VoiceError>,
    ) {
        if self.session.as_ref().map(|s| s.scope.epoch()) != Some(epoch) {
            return;
        }
        match result {
            Ok(rtt) => self.record_latency(rtt).await,
            Err(VoiceError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "latency probe failed");
                self.latency = None;
            }
        }
        self.publish();
    }

    async fn record_latency(&mut self, rtt: Duration) {
        self.latency = Some(rtt);
        let quality = self.settings.quality_for(self.latency);
        let latency_ms = u64::try_from(rtt.as_millis()).unwrap_or(u64::MAX);
        debug!(latency_ms, ?quality, "latency measured");
        self.emit(VoiceEvent::LatencyMeasured {
            latency_ms,
            quality,
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // Commands and publishing
    // -----------------------------------------------------------------------

    pub async fn execute(&mut self, command: VoiceCommand) {
        let result = match command {
            VoiceCommand::SelectChannel(channel_id) => self.select_channel(&channel_id).await,
            VoiceCommand::Leave | VoiceCommand::Shutdown => {
                self.leave().await;
                Ok(())
            }
            VoiceCommand::ToggleMicrophone => self.toggle_microphone().await,
            VoiceCommand::ToggleOutputDevice => self.toggle_output_device().await,
            VoiceCommand::PushToTalk(pressed) => self.push_to_talk(pressed).await,
            VoiceCommand::UserInteracted => {
                self.user_interacted();
                Ok(())
            }
            VoiceCommand::SetRemoteMuted { participant, muted } => {
                self.set_remote_muted(&participant, muted).await
            }
        };
        self.report(result).await;
        self.publish();
    }

    async fn report(&self, result: Result<(), VoiceError>) {
        match result {
            Ok(()) | Err(VoiceError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "voice operation failed");
                self.emit(VoiceEvent::Error(e.to_string())).await;
            }
        }
    }

    async fn mic_unavailable(&mut self, error: &MicError) {
        warn!(error = %error, "microphone unavailable, continuing listen-only");
        self.mic_not_granted = true;
        self.emit(VoiceEvent::MicUnavailable(error.to_string())).await;
    }

    async fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        info!(from = ?self.status, to = ?status, channel_id = ?self.channel_id, "voice status changed");
        self.status = status;
        self.emit(VoiceEvent::StatusChanged {
            status,
            channel_id: self.channel_id.clone(),
        })
        .await;
        self.publish();
    }

    async fn emit(&self, event: VoiceEvent) {
        let _ = self.event_tx.send(event).await;
    }

    pub fn snapshot(&self) -> VoiceSnapshot {
        VoiceSnapshot {
            status: self.status,
            channel_id: self.channel_id.clone(),
            muted: self.muted,
            deafened: self.deafened,
            latency_ms: self
                .latency
                .map(|rtt| u64::try_from(rtt.as_millis()).unwrap_or(u64::MAX)),
            quality: self.settings.quality_for(self.latency),
            interaction_required: self.interaction_required,
            mic_not_granted: self.mic_not_granted,
            transmitting: self
                .session
                .as_ref()
                .and_then(|s| s.producer.is_paused())
                .is_some_and(|paused| !paused),
            members: self.members.clone(),
            speaking: self.speaking.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
