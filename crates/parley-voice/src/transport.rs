//! Send/receive transport lifecycle.
//!
//! Each session owns one [`TransportManager`], which holds at most one
//! transport per direction. Creation and the DTLS connect handshake are
//! both signaling round trips made through the session's [`SignalScope`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::VoiceError;
use crate::media::{AudioTrack, IceServer, MediaEngine, RtcConsumer, RtcProducer, RtcTransport, TransportDirection};
use crate::protocol::{
    decode_producer_id, encode_payload, events, ConnectTransportRequest, ConsumerParams,
    CreateTransportRequest, CreateTransportResponse, ProduceRequest, TransportConnected,
};
use crate::signaling::SignalScope;

struct ManagedTransport {
    inner: Box<dyn RtcTransport>,
    connected: bool,
}

pub struct TransportManager {
    engine: Arc<dyn MediaEngine>,
    ice_servers: Vec<IceServer>,
    send: Option<ManagedTransport>,
    recv: Option<ManagedTransport>,
}

impl TransportManager {
    pub fn new(engine: Arc<dyn MediaEngine>, ice_servers: Vec<IceServer>) -> Self {
        Self {
            engine,
            ice_servers,
            send: None,
            recv: None,
        }
    }

    fn slot(&self, direction: TransportDirection) -> &Option<ManagedTransport> {
        match direction {
            TransportDirection::Send => &self.send,
            TransportDirection::Receive => &self.recv,
        }
    }

    fn slot_mut(&mut self, direction: TransportDirection) -> &mut Option<ManagedTransport> {
        match direction {
            TransportDirection::Send => &mut self.send,
            TransportDirection::Receive => &mut self.recv,
        }
    }

    /// Request server parameters for a transport and build it locally.
    ///
    /// Replaces (and closes) any existing transport in the same direction.
    pub async fn create_transport(
        &mut self,
        scope: &SignalScope,
        direction: TransportDirection,
        channel_id: &str,
        device: &Device,
    ) -> Result<(), VoiceError> {
        if let Some(old) = self.slot_mut(direction).take() {
            warn!(%direction, id = %old.inner.id(), "replacing existing transport");
            old.inner.close();
        }

        let request = CreateTransportRequest {
            is_producer: direction.is_producer(),
            rtp_capabilities: device.rtp_capabilities()?.clone(),
            channel_id: channel_id.to_string(),
        };
        let reply = scope
            .request(events::CREATE_TRANSPORT, encode_payload(&request)?)
            .await?;
        reply.expect_event(match direction {
            TransportDirection::Send => events::CREATE_PRODUCE_TRANSPORT,
            TransportDirection::Receive => events::CREATE_CONSUME_TRANSPORT,
        })?;
        let response: CreateTransportResponse = reply.decode()?;

        let transport = self
            .engine
            .create_transport(direction, &response.params, &self.ice_servers)
            .await?;
        if !scope.is_current() {
            transport.close();
            return Err(VoiceError::Cancelled);
        }

        info!(%direction, id = %transport.id(), channel_id, "transport created");
        *self.slot_mut(direction) = Some(ManagedTransport {
            inner: transport,
            connected: false,
        });
        Ok(())
    }

    /// Run the DTLS connect handshake once per transport.
    ///
    /// A rejected handshake closes the transport and fails with
    /// `NegotiationFailed`.
    pub async fn ensure_connected(
        &mut self,
        scope: &SignalScope,
        direction: TransportDirection,
        channel_id: &str,
    ) -> Result<(), VoiceError> {
        let dtls_parameters = match self.slot(direction) {
            Some(managed) if managed.connected => return Ok(()),
            Some(managed) => managed.inner.dtls_parameters(),
            None => return Err(VoiceError::NotReady("transport not created")),
        };

        let request = ConnectTransportRequest {
            dtls_parameters,
            channel_id: channel_id.to_string(),
            is_producer: direction.is_producer(),
        };
        let reply = scope
            .request(events::CONNECT_TRANSPORT, encode_payload(&request)?)
            .await?;
        reply.expect_event(events::TRANSPORT_CONNECTED)?;
        let ack: TransportConnected = reply.decode()?;

        if !ack.success {
            if let Some(managed) = self.slot_mut(direction).take() {
                managed.inner.close();
            }
            warn!(%direction, channel_id, "transport connect rejected");
            return Err(VoiceError::NegotiationFailed(format!(
                "{direction} transport connect rejected"
            )));
        }

        if let Some(managed) = self.slot_mut(direction).as_mut() {
            managed.inner.mark_connected();
            managed.connected = true;
            debug!(%direction, id = %managed.inner.id(), "transport connected");
        }
        Ok(())
    }

    /// Negotiate a producer for `track` on the send transport.
    pub async fn produce(
        &mut self,
        scope: &SignalScope,
        channel_id: &str,
        track: &AudioTrack,
        paused: bool,
    ) -> Result<Box<dyn RtcProducer>, VoiceError> {
        self.ensure_connected(scope, TransportDirection::Send, channel_id)
            .await?;
        let transport = match &self.send {
            Some(managed) => &managed.inner,
            None => return Err(VoiceError::NotReady("send transport not created")),
        };

        let producer_options = transport.prepare_producer(track).await?;
        let request = ProduceRequest {
            channel_id: channel_id.to_string(),
            producer_options,
            is_muted: paused,
        };
        let reply = scope
            .request(events::PRODUCE, encode_payload(&request)?)
            .await?;
        reply.expect_event(events::PRODUCE)?;
        let producer_id = decode_producer_id(&reply.payload)?;

        transport
            .attach_producer(&producer_id, track.clone(), paused)
            .await
    }

    /// Build a consumer on the receive transport.
    pub async fn consume(
        &mut self,
        scope: &SignalScope,
        channel_id: &str,
        params: &ConsumerParams,
    ) -> Result<Box<dyn RtcConsumer>, VoiceError> {
        self.ensure_connected(scope, TransportDirection::Receive, channel_id)
            .await?;
        match &self.recv {
            Some(managed) => managed.inner.consume(params).await,
            None => Err(VoiceError::NotReady("receive transport not created")),
        }
    }

    pub fn is_connected(&self, direction: TransportDirection) -> bool {
        self.slot(direction).as_ref().is_some_and(|m| m.connected)
    }

    /// Number of transports currently held (0 to 2).
    pub fn open_count(&self) -> usize {
        usize::from(self.send.is_some()) + usize::from(self.recv.is_some())
    }

    pub fn close_all(&mut self) {
        for direction in [TransportDirection::Send, TransportDirection::Receive] {
            if let Some(managed) = self.slot_mut(direction).take() {
                managed.inner.close();
                debug!(%direction, id = %managed.inner.id(), "transport closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RtpCapabilities;
    use crate::signaling::SignalRouter;
    use crate::testing::{FakeEngine, FakeSfu};
    use std::time::Duration;

    struct Setup {
        sfu: Arc<FakeSfu>,
        engine: Arc<FakeEngine>,
        scope: SignalScope,
        device: Device,
        manager: TransportManager,
        _notes: tokio::sync::mpsc::Receiver<crate::signaling::Notification>,
    }

    fn setup() -> Setup {
        let (sfu, rx) = FakeSfu::new();
        let (router, notes) = SignalRouter::spawn(sfu.clone(), rx, Duration::from_secs(1));
        let engine = FakeEngine::new();
        let device = Device::new(RtpCapabilities::opus());
        device.load(&RtpCapabilities::opus()).unwrap();
        Setup {
            manager: TransportManager::new(engine.clone(), Vec::new()),
            sfu,
            engine,
            scope: router.scope(),
            device,
            _notes: notes,
        }
    }

    #[tokio::test]
    async fn creates_one_transport_per_direction() {
        let mut s = setup();
        s.manager
            .create_transport(&s.scope, TransportDirection::Send, "42", &s.device)
            .await
            .unwrap();
        s.manager
            .create_transport(&s.scope, TransportDirection::Receive, "42", &s.device)
            .await
            .unwrap();
        assert_eq!(s.manager.open_count(), 2);
        assert_eq!(s.engine.open_transports(), (1, 1));

        let requests = s.sfu.emitted(events::CREATE_TRANSPORT);
        assert_eq!(requests[0].payload["isProducer"], true);
        assert_eq!(requests[1].payload["isProducer"], false);
        assert_eq!(requests[0].payload["channelId"], "42");
    }

    #[tokio::test]
    async fn recreating_closes_the_previous_transport() {
        let mut s = setup();
        for _ in 0..2 {
            s.manager
                .create_transport(&s.scope, TransportDirection::Send, "42", &s.device)
                .await
                .unwrap();
        }
        assert_eq!(s.engine.open_transports(), (1, 0));
        assert_eq!(s.engine.max_open(), (1, 0));
    }

    #[tokio::test]
    async fn connect_handshake_runs_once() {
        let mut s = setup();
        s.manager
            .create_transport(&s.scope, TransportDirection::Send, "42", &s.device)
            .await
            .unwrap();
        for _ in 0..3 {
            s.manager
                .ensure_connected(&s.scope, TransportDirection::Send, "42")
                .await
                .unwrap();
        }
        assert!(s.manager.is_connected(TransportDirection::Send));
        assert_eq!(s.sfu.count(events::CONNECT_TRANSPORT), 1);
    }

    #[tokio::test]
    async fn rejected_connect_closes_transport() {
        let mut s = setup();
        s.sfu.fail_connect(true);
        s.manager
            .create_transport(&s.scope, TransportDirection::Receive, "42", &s.device)
            .await
            .unwrap();
        let err = s
            .manager
            .ensure_connected(&s.scope, TransportDirection::Receive, "42")
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::NegotiationFailed(_)));
        assert_eq!(s.manager.open_count(), 0);
        assert_eq!(s.engine.open_transports(), (0, 0));
    }

    #[tokio::test]
    async fn produce_connects_first_and_uses_assigned_id() {
        let mut s = setup();
        s.manager
            .create_transport(&s.scope, TransportDirection::Send, "42", &s.device)
            .await
            .unwrap();
        let source = crate::media::AudioSource::default();
        let track = source.track("mic");

        let producer = s.manager.produce(&s.scope, "42", &track, true).await.unwrap();
        assert!(producer.is_paused());
        assert!(producer.id().starts_with("producer-"));

        let sent = s.sfu.emitted_events();
        let connect = sent.iter().position(|e| e == events::CONNECT_TRANSPORT).unwrap();
        let produce = sent.iter().position(|e| e == events::PRODUCE).unwrap();
        assert!(connect < produce);
        assert_eq!(s.sfu.emitted(events::PRODUCE)[0].payload["isMuted"], true);
    }

    #[tokio::test]
    async fn consume_requires_receive_transport() {
        let mut s = setup();
        let params = s.sfu.add_remote_producer("bob");
        let err = s.manager.consume(&s.scope, "42", &params).await.err().unwrap();
        assert!(matches!(err, VoiceError::NotReady(_)));
    }

    #[tokio::test]
    async fn cancelled_creation_builds_nothing() {
        let mut s = setup();
        s.sfu.hold(events::CREATE_TRANSPORT);
        let scope = s.scope.clone();
        let router = scope.router().clone();
        let sfu = s.sfu.clone();

        let cancel = async {
            while sfu.held_count() == 0 {
                tokio::task::yield_now().await;
            }
            router.cancel_all().await;
            sfu.release_held().await;
        };
        let (result, _) = tokio::join!(
            s.manager
                .create_transport(&scope, TransportDirection::Send, "42", &s.device),
            cancel
        );
        assert_eq!(result.unwrap_err(), VoiceError::Cancelled);
        assert_eq!(s.manager.open_count(), 0);
        assert_eq!(s.engine.open_transports(), (0, 0));
    }

    #[tokio::test]
    async fn close_all_closes_both() {
        let mut s = setup();
        for direction in [TransportDirection::Send, TransportDirection::Receive] {
            s.manager
                .create_transport(&s.scope, direction, "42", &s.device)
                .await
                .unwrap();
        }
        s.manager.close_all();
        assert_eq!(s.manager.open_count(), 0);
        assert_eq!(s.engine.open_transports(), (0, 0));
    }
}
