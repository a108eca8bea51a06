//! In-memory stand-ins for every platform seam.
//!
//! `FakeSfu` answers signaling requests the way a mediasoup-style server
//! does; `FakeEngine`, `FakeCapture` and `FakeOutput` record what the voice
//! core did to media so tests can assert on it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use crate::error::{MicError, PlaybackError, SignalingError, VoiceError};
use crate::media::{
    AudioOutput, AudioSource, AudioTrack, ElementId, IceServer, MediaEngine, MediaStream,
    RtcConsumer, RtcProducer, RtcTransport, TransportDirection,
};
use crate::microphone::{CaptureBackend, CaptureConstraints};
use crate::protocol::{
    events, ConsumerParams, MediaKind, Member, ProducerOptions, RtpCapabilities, SignalEnvelope,
    TransportOptions,
};
use crate::signaling::{SignalingChannel, SignalingEvent};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Signaling server
// ---------------------------------------------------------------------------

struct SfuState {
    connected: bool,
    connection_id: Option<String>,
    emitted: Vec<SignalEnvelope>,
    held_events: HashSet<String>,
    held: Vec<SignalEnvelope>,
    fail_connect: bool,
    members: Vec<Member>,
    router_caps: RtpCapabilities,
    remote: Vec<ConsumerParams>,
    resume_consumer: bool,
    next: u64,
}

pub struct FakeSfu {
    state: Mutex<SfuState>,
    events: mpsc::Sender<SignalingEvent>,
}

impl FakeSfu {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<SignalingEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let sfu = Arc::new(Self {
            state: Mutex::new(SfuState {
                connected: true,
                connection_id: Some("sock-1".into()),
                emitted: Vec::new(),
                held_events: HashSet::new(),
                held: Vec::new(),
                fail_connect: false,
                members: Vec::new(),
                router_caps: RtpCapabilities::opus(),
                remote: Vec::new(),
                resume_consumer: false,
                next: 0,
            }),
            events: tx,
        });
        (sfu, rx)
    }

    pub fn emitted(&self, event: &str) -> Vec<SignalEnvelope> {
        lock(&self.state)
            .emitted
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }

    pub fn emitted_events(&self) -> Vec<String> {
        lock(&self.state)
            .emitted
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        lock(&self.state)
            .emitted
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    /// Stop answering `event` until [`release_held`](Self::release_held).
    pub fn hold(&self, event: &str) {
        lock(&self.state).held_events.insert(event.to_string());
    }

    pub fn held_count(&self) -> usize {
        lock(&self.state).held.len()
    }

    /// Answer every held request and stop holding.
    pub async fn release_held(&self) {
        let replies: Vec<SignalEnvelope> = {
            let mut state = lock(&self.state);
            state.held_events.clear();
            let held = std::mem::take(&mut state.held);
            held.iter().filter_map(|req| state.reply_to(req)).collect()
        };
        for reply in replies {
            let _ = self.events.send(SignalingEvent::Message(reply)).await;
        }
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn fail_connect(&self, fail: bool) {
        lock(&self.state).fail_connect = fail;
    }

    pub fn set_members(&self, members: Vec<Member>) {
        lock(&self.state).members = members;
    }

    pub fn set_router_caps(&self, caps: RtpCapabilities) {
        lock(&self.state).router_caps = caps;
    }

    pub fn set_resume_consumer(&self, resume: bool) {
        lock(&self.state).resume_consumer = resume;
    }

    /// Register a remote producer that `consume` will offer from now on.
    pub fn add_remote_producer(&self, user: &str) -> ConsumerParams {
        let mut state = lock(&self.state);
        state.next += 1;
        let n = state.next;
        let params = ConsumerParams {
            id: format!("consumer-{user}-{n}"),
            producer_id: format!("producer-{user}-{n}"),
            kind: MediaKind::Audio,
            rtp_parameters: json!({ "codecs": [{ "mimeType": "audio/opus" }] }),
            user: Member::new(user),
            resume_consumer: state.resume_consumer,
        };
        state.remote.push(params.clone());
        params
    }

    pub fn remove_remote_producer(&self, user: &str) {
        lock(&self.state).remote.retain(|p| p.user.username != user);
    }

    /// Deliver a server push.
    pub async fn push(&self, event: &str, payload: Value) {
        let _ = self
            .events
            .send(SignalingEvent::Message(SignalEnvelope::new(event, payload)))
            .await;
    }

    pub async fn disconnect(&self) {
        {
            let mut state = lock(&self.state);
            state.connected = false;
            state.connection_id = None;
        }
        let _ = self.events.send(SignalingEvent::Disconnected).await;
    }

    pub async fn reconnect(&self, connection_id: &str) {
        {
            let mut state = lock(&self.state);
            state.connected = true;
            state.connection_id = Some(connection_id.to_string());
        }
        let _ = self
            .events
            .send(SignalingEvent::Connected {
                connection_id: Some(connection_id.to_string()),
            })
            .await;
    }
}

impl SfuState {
    fn reply_to(&mut self, request: &SignalEnvelope) -> Option<SignalEnvelope> {
        let msg_ref = request.msg_ref.clone()?;
        let (event, payload) = match request.event.as_str() {
            events::JOIN_VOICE_CHANNEL => (
                events::GET_RTP_CAPABILITIES,
                json!({
                    "rtpCapabilities": self.router_caps,
                    "channel": {
                        "id": request.payload["channelId"],
                        "members": self.members,
                    },
                }),
            ),
            events::CREATE_TRANSPORT => {
                self.next += 1;
                let event = if request.payload["isProducer"] == true {
                    events::CREATE_PRODUCE_TRANSPORT
                } else {
                    events::CREATE_CONSUME_TRANSPORT
                };
                (
                    event,
                    json!({
                        "params": {
                            "id": format!("t{}", self.next),
                            "iceParameters": {},
                            "iceCandidates": [],
                            "dtlsParameters": {},
                        }
                    }),
                )
            }
            events::CONNECT_TRANSPORT => (
                events::TRANSPORT_CONNECTED,
                json!({ "success": !self.fail_connect }),
            ),
            events::PRODUCE => {
                self.next += 1;
                (events::PRODUCE, json!(format!("producer-{}", self.next)))
            }
            events::CONSUME => {
                let payload = if self.remote.is_empty() {
                    Value::Null
                } else {
                    let resume = self.resume_consumer;
                    let offers: Vec<ConsumerParams> = self
                        .remote
                        .iter()
                        .cloned()
                        .map(|mut p| {
                            p.resume_consumer = resume;
                            p
                        })
                        .collect();
                    json!(offers)
                };
                (events::CONSUME, payload)
            }
            events::PING => (events::PONG, Value::Null),
            other => (other, Value::Null),
        };
        Some(SignalEnvelope::new(event, payload).with_ref(msg_ref))
    }
}

#[async_trait]
impl SignalingChannel for FakeSfu {
    async fn emit(&self, envelope: SignalEnvelope) -> Result<(), SignalingError> {
        let reply = {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(SignalingError::NotConnected);
            }
            state.emitted.push(envelope.clone());
            if envelope.msg_ref.is_some() && state.held_events.contains(&envelope.event) {
                state.held.push(envelope);
                None
            } else {
                state.reply_to(&envelope)
            }
        };
        if let Some(reply) = reply {
            let _ = self.events.send(SignalingEvent::Message(reply)).await;
        }
        Ok(())
    }

    async fn connection_id(&self) -> Option<String> {
        lock(&self.state).connection_id.clone()
    }
}

// ---------------------------------------------------------------------------
// Media engine
// ---------------------------------------------------------------------------

pub struct ProducerProbe {
    id: String,
    track: AudioTrack,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl ProducerProbe {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ConsumerProbe {
    id: String,
    producer_id: String,
    /// Push frames here to simulate remote audio.
    pub source: AudioSource,
    track: AudioTrack,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl ConsumerProbe {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct EngineState {
    open_send: usize,
    open_recv: usize,
    max_send: usize,
    max_recv: usize,
    producers: Vec<Arc<ProducerProbe>>,
    consumers: Vec<Arc<ConsumerProbe>>,
}

pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(EngineState::default())),
        })
    }

    /// Currently open `(send, receive)` transports.
    pub fn open_transports(&self) -> (usize, usize) {
        let state = lock(&self.state);
        (state.open_send, state.open_recv)
    }

    /// Highest simultaneous `(send, receive)` counts seen.
    pub fn max_open(&self) -> (usize, usize) {
        let state = lock(&self.state);
        (state.max_send, state.max_recv)
    }

    pub fn producers(&self) -> Vec<Arc<ProducerProbe>> {
        lock(&self.state).producers.clone()
    }

    pub fn consumers(&self) -> Vec<Arc<ConsumerProbe>> {
        lock(&self.state).consumers.clone()
    }

    pub fn consumer(&self, id: &str) -> Option<Arc<ConsumerProbe>> {
        lock(&self.state)
            .consumers
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn native_capabilities(&self) -> RtpCapabilities {
        RtpCapabilities::opus()
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: &TransportOptions,
        _ice_servers: &[IceServer],
    ) -> Result<Box<dyn RtcTransport>, VoiceError> {
        {
            let mut state = lock(&self.state);
            match direction {
                TransportDirection::Send => {
                    state.open_send += 1;
                    state.max_send = state.max_send.max(state.open_send);
                }
                TransportDirection::Receive => {
                    state.open_recv += 1;
                    state.max_recv = state.max_recv.max(state.open_recv);
                }
            }
        }
        Ok(Box::new(FakeTransport {
            id: options.id.clone(),
            direction,
            engine: Arc::clone(&self.state),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeTransport {
    id: String,
    direction: TransportDirection,
    engine: Arc<Mutex<EngineState>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl RtcTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn direction(&self) -> TransportDirection {
        self.direction
    }

    fn dtls_parameters(&self) -> Value {
        json!({ "role": "client", "fingerprints": [] })
    }

    fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn prepare_producer(&self, _track: &AudioTrack) -> Result<ProducerOptions, VoiceError> {
        Ok(ProducerOptions {
            kind: MediaKind::Audio,
            rtp_parameters: json!({ "codecs": [{ "mimeType": "audio/opus" }] }),
        })
    }

    async fn attach_producer(
        &self,
        producer_id: &str,
        track: AudioTrack,
        paused: bool,
    ) -> Result<Box<dyn RtcProducer>, VoiceError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoiceError::NotReady("transport not connected"));
        }
        let probe = Arc::new(ProducerProbe {
            id: producer_id.to_string(),
            track,
            paused: AtomicBool::new(paused),
            closed: AtomicBool::new(false),
        });
        lock(&self.engine).producers.push(Arc::clone(&probe));
        Ok(Box::new(FakeProducer(probe)))
    }

    async fn consume(&self, params: &ConsumerParams) -> Result<Box<dyn RtcConsumer>, VoiceError> {
        let source = AudioSource::default();
        let probe = Arc::new(ConsumerProbe {
            id: params.id.clone(),
            producer_id: params.producer_id.clone(),
            track: source.track(&params.user.username),
            source,
            // Server-side consumers start paused.
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });
        lock(&self.engine).consumers.push(Arc::clone(&probe));
        Ok(Box::new(FakeConsumer(probe)))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = lock(&self.engine);
        match self.direction {
            TransportDirection::Send => state.open_send -= 1,
            TransportDirection::Receive => state.open_recv -= 1,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeProducer(Arc<ProducerProbe>);

impl RtcProducer for FakeProducer {
    fn id(&self) -> &str {
        &self.0.id
    }
    fn track(&self) -> &AudioTrack {
        &self.0.track
    }
    fn pause(&self) {
        self.0.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.0.paused.store(false, Ordering::SeqCst);
    }
    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }
    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

struct FakeConsumer(Arc<ConsumerProbe>);

impl RtcConsumer for FakeConsumer {
    fn id(&self) -> &str {
        &self.0.id
    }
    fn producer_id(&self) -> &str {
        &self.0.producer_id
    }
    fn track(&self) -> &AudioTrack {
        &self.0.track
    }
    fn pause(&self) {
        self.0.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.0.paused.store(false, Ordering::SeqCst);
    }
    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }
    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.track.stop();
    }
    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

pub struct FakeCapture {
    gated: bool,
    gate: Notify,
    denied: AtomicBool,
    acquisitions: AtomicUsize,
    source: AudioSource,
    tracks: Mutex<Vec<AudioTrack>>,
}

impl FakeCapture {
    fn build(gated: bool) -> Arc<Self> {
        Arc::new(Self {
            gated,
            gate: Notify::new(),
            denied: AtomicBool::new(false),
            acquisitions: AtomicUsize::new(0),
            source: AudioSource::default(),
            tracks: Mutex::new(Vec::new()),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// Acquisitions block until [`release`](Self::release).
    pub fn gated() -> Arc<Self> {
        Self::build(true)
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Tracks handed out that have not been stopped.
    pub fn live_tracks(&self) -> usize {
        lock(&self.tracks).iter().filter(|t| t.is_live()).count()
    }

    /// Frames pushed here reach every captured track.
    pub fn source(&self) -> &AudioSource {
        &self.source
    }
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn acquire(&self, _constraints: &CaptureConstraints) -> Result<MediaStream, MicError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.gate.notified().await;
        }
        if self.denied.load(Ordering::SeqCst) {
            return Err(MicError::PermissionDenied);
        }
        let track = self.source.track("mic");
        lock(&self.tracks).push(track.clone());
        Ok(MediaStream::new(vec![track]))
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

struct Element {
    participant: String,
    muted: bool,
    playing: bool,
}

#[derive(Default)]
struct OutputState {
    next: u64,
    elements: HashMap<u64, Element>,
    autoplay_blocked: bool,
}

pub struct FakeOutput {
    state: Mutex<OutputState>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OutputState::default()),
        })
    }

    pub fn block_autoplay(&self, blocked: bool) {
        lock(&self.state).autoplay_blocked = blocked;
    }

    pub fn element_count(&self) -> usize {
        lock(&self.state).elements.len()
    }

    pub fn playing_count(&self) -> usize {
        lock(&self.state)
            .elements
            .values()
            .filter(|e| e.playing)
            .count()
    }

    pub fn participants(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state)
            .elements
            .values()
            .map(|e| e.participant.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_muted(&self, participant: &str) -> bool {
        lock(&self.state)
            .elements
            .values()
            .any(|e| e.participant == participant && e.muted)
    }
}

impl AudioOutput for FakeOutput {
    fn attach(&self, participant: &str, _track: &AudioTrack) -> ElementId {
        let mut state = lock(&self.state);
        state.next += 1;
        let id = state.next;
        state.elements.insert(
            id,
            Element {
                participant: participant.to_string(),
                muted: false,
                playing: false,
            },
        );
        ElementId(id)
    }

    fn play(&self, element: ElementId) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.autoplay_blocked {
            return Err(PlaybackError::AutoplayBlocked);
        }
        match state.elements.get_mut(&element.0) {
            Some(e) => {
                e.playing = true;
                Ok(())
            }
            None => Err(PlaybackError::Device("no such element".into())),
        }
    }

    fn set_muted(&self, element: ElementId, muted: bool) {
        if let Some(e) = lock(&self.state).elements.get_mut(&element.0) {
            e.muted = muted;
        }
    }

    fn remove(&self, element: ElementId) {
        lock(&self.state).elements.remove(&element.0);
    }
}
