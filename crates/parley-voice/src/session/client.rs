//! Actor driver for the session machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::machine::{MediaDeps, SessionMachine};
use super::types::{VoiceEvent, VoiceSnapshot};
use crate::error::VoiceError;
use crate::protocol::events;
use crate::settings::VoiceSettings;
use crate::signaling::{Notification, SignalRouter, SignalingChannel, SignalingEvent};
use crate::speaking::SpeakingTransition;

/// UI intents accepted by the voice actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    SelectChannel(String),
    Leave,
    ToggleMicrophone,
    ToggleOutputDevice,
    PushToTalk(bool),
    UserInteracted,
    SetRemoteMuted { participant: String, muted: bool },
    Shutdown,
}

type LatencySample = (u64, Result<Duration, VoiceError>);

/// Handle to a running voice session actor.
///
/// Commands are queued without waiting for them to finish; state is
/// observed through [`snapshot`](Self::snapshot) or the event stream.
#[derive(Clone)]
pub struct VoiceClient {
    commands: mpsc::Sender<VoiceCommand>,
    router: SignalRouter,
    snapshots: watch::Receiver<VoiceSnapshot>,
}

impl VoiceClient {
    /// Start the actor on the current runtime.
    pub fn spawn(
        settings: VoiceSettings,
        channel: Arc<dyn SignalingChannel>,
        signaling_events: mpsc::Receiver<SignalingEvent>,
        deps: MediaDeps,
    ) -> (Self, mpsc::Receiver<VoiceEvent>) {
        let (router, notifications) =
            SignalRouter::spawn(channel, signaling_events, settings.request_timeout);
        let ping_interval = settings.ping_interval;
        let ping_timeout = settings.ping_timeout;
        let (machine, channels) = SessionMachine::new(settings, router.clone(), deps);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(run(
            machine,
            cmd_rx,
            notifications,
            channels.speaking,
            ping_interval,
            ping_timeout,
        ));
        info!("voice client started");

        let client = Self {
            commands: cmd_tx,
            router,
            snapshots: channels.snapshots,
        };
        (client, channels.events)
    }

    fn send(&self, command: VoiceCommand) {
        if let Err(e) = self.commands.try_send(command) {
            warn!("voice command dropped: {e}");
        }
    }

    /// Join `channel_id`. In-flight negotiation for a different channel is
    /// abandoned immediately.
    pub async fn select_channel(&self, channel_id: &str) {
        let current = self.snapshots.borrow().channel_id.clone();
        if current.is_some_and(|c| c != channel_id) {
            self.router.cancel_all().await;
        }
        self.send(VoiceCommand::SelectChannel(channel_id.to_string()));
    }

    pub async fn leave(&self) {
        self.router.cancel_all().await;
        self.send(VoiceCommand::Leave);
    }

    pub fn toggle_microphone(&self) {
        self.send(VoiceCommand::ToggleMicrophone);
    }

    pub fn toggle_output_device(&self) {
        self.send(VoiceCommand::ToggleOutputDevice);
    }

    pub fn push_to_talk(&self, pressed: bool) {
        self.send(VoiceCommand::PushToTalk(pressed));
    }

    pub fn user_interacted(&self) {
        self.send(VoiceCommand::UserInteracted);
    }

    pub fn set_remote_muted(&self, participant: &str, muted: bool) {
        self.send(VoiceCommand::SetRemoteMuted {
            participant: participant.to_string(),
            muted,
        });
    }

    pub async fn shutdown(&self) {
        self.router.cancel_all().await;
        self.send(VoiceCommand::Shutdown);
    }

    pub fn snapshot(&self) -> VoiceSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceSnapshot> {
        self.snapshots.clone()
    }
}

async fn run(
    mut machine: SessionMachine,
    mut commands: mpsc::Receiver<VoiceCommand>,
    mut notifications: mpsc::Receiver<Notification>,
    mut speaking: mpsc::Receiver<SpeakingTransition>,
    ping_interval: Duration,
    ping_timeout: Duration,
) {
    let (latency_tx, mut latency_rx) = mpsc::channel::<LatencySample>(8);
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; connect measures its own.
    ticker.tick().await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(VoiceCommand::Shutdown) | None => {
                    machine.execute(VoiceCommand::Shutdown).await;
                    break;
                }
                Some(command) => machine.execute(command).await,
            },
            Some(notification) = notifications.recv() => {
                machine.handle_notification(notification).await;
            }
            Some(transition) = speaking.recv() => {
                machine.handle_speaking(transition).await;
            }
            _ = ticker.tick() => {
                if let Some(scope) = machine.latency_probe() {
                    let tx = latency_tx.clone();
                    tokio::spawn(async move {
                        let result = match tokio::time::timeout(ping_timeout, scope.ping()).await {
                            Ok(result) => result,
                            Err(_) => Err(VoiceError::Timeout {
                                event: events::PING.to_string(),
                            }),
                        };
                        let _ = tx.send((scope.epoch(), result)).await;
                    });
                }
            }
            Some((epoch, result)) = latency_rx.recv() => {
                machine.record_latency_result(epoch, result).await;
            }
        }
    }
    debug!("voice client stopped");
}
