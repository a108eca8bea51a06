//! Correlation-id request/response routing with epoch cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::types::{Notification, SignalingChannel, SignalingEvent};
use crate::error::VoiceError;
use crate::protocol::{events, SignalEnvelope};

type Reply = Result<SignalEnvelope, VoiceError>;

struct Pending {
    event: String,
    epoch: u64,
    reply: oneshot::Sender<Reply>,
}

struct RouterInner {
    channel: Arc<dyn SignalingChannel>,
    pending: Mutex<HashMap<String, Pending>>,
    subscriptions: Mutex<HashMap<String, mpsc::Sender<SignalEnvelope>>>,
    epoch: AtomicU64,
    timeout: Duration,
}

impl RouterInner {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// The epoch only moves while the pending table is locked, so a request
    /// either lands in the table before the drain or sees the new epoch.
    async fn cancel_all(&self) -> u64 {
        let mut pending = self.pending.lock().await;
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let drained: Vec<Pending> = pending.drain().map(|(_, p)| p).collect();
        drop(pending);
        if !drained.is_empty() {
            debug!(count = drained.len(), epoch, "cancelling in-flight requests");
        }
        for pending in drained {
            let _ = pending.reply.send(Err(VoiceError::Cancelled));
        }
        epoch
    }

    async fn resolve(&self, msg_ref: &str, envelope: SignalEnvelope) {
        let Some(pending) = self.pending.lock().await.remove(msg_ref) else {
            let stale = VoiceError::StaleResponse {
                event: envelope.event.clone(),
            };
            debug!(msg_ref, "{stale}, discarding");
            return;
        };
        let reply = if pending.epoch == self.current_epoch() {
            Ok(envelope)
        } else {
            Err(VoiceError::StaleResponse {
                event: pending.event,
            })
        };
        let _ = pending.reply.send(reply);
    }
}

/// Pairs replies with requests and fans out server pushes.
///
/// Cheap to clone; all clones share one pending-request table.
#[derive(Clone)]
pub struct SignalRouter {
    inner: Arc<RouterInner>,
}

impl SignalRouter {
    /// Start routing `events` from `channel`. Returns the router and the
    /// stream of decoded notifications.
    pub fn spawn(
        channel: Arc<dyn SignalingChannel>,
        events: mpsc::Receiver<SignalingEvent>,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::channel(256);
        let inner = Arc::new(RouterInner {
            channel,
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            timeout,
        });
        tokio::spawn(dispatch_loop(Arc::clone(&inner), events, notify_tx));
        (Self { inner }, notify_rx)
    }

    pub fn epoch(&self) -> u64 {
        self.inner.current_epoch()
    }

    /// A handle whose requests fail with `Cancelled` once [`cancel_all`](Self::cancel_all) runs.
    pub fn scope(&self) -> SignalScope {
        SignalScope {
            router: self.clone(),
            epoch: self.epoch(),
        }
    }

    /// Fail every in-flight request and invalidate every existing scope.
    pub async fn cancel_all(&self) -> u64 {
        self.inner.cancel_all().await
    }

    pub async fn connection_id(&self) -> Option<String> {
        self.inner.channel.connection_id().await
    }

    /// Send a message that expects no reply, regardless of epoch.
    pub async fn notify(&self, event: &str, payload: Value) -> Result<(), VoiceError> {
        debug!(event, "signaling notify");
        self.inner
            .channel
            .emit(SignalEnvelope::new(event, payload))
            .await
            .map_err(VoiceError::from)
    }

    /// Receive raw pushes for `event` in addition to the notification stream.
    /// Replaces any earlier subscription for the same event.
    pub async fn on(&self, event: &str) -> mpsc::Receiver<SignalEnvelope> {
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .subscriptions
            .lock()
            .await
            .insert(event.to_string(), tx);
        rx
    }

    pub async fn off(&self, event: &str) {
        self.inner.subscriptions.lock().await.remove(event);
    }

    async fn request(&self, epoch: u64, event: &str, payload: Value) -> Reply {
        let msg_ref = parley_common::new_correlation_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            if epoch != self.epoch() {
                return Err(VoiceError::Cancelled);
            }
            pending.insert(
                msg_ref.clone(),
                Pending {
                    event: event.to_string(),
                    epoch,
                    reply: tx,
                },
            );
        }

        debug!(event, msg_ref = %msg_ref, epoch, "signaling request");
        let envelope = SignalEnvelope::new(event, payload).with_ref(msg_ref.clone());
        if let Err(e) = self.inner.channel.emit(envelope).await {
            self.inner.pending.lock().await.remove(&msg_ref);
            return Err(e.into());
        }

        match tokio::time::timeout(self.inner.timeout, rx).await {
            // Whatever the reply, a session that moved on only sees Cancelled.
            Ok(Ok(_)) if epoch != self.epoch() => Err(VoiceError::Cancelled),
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(VoiceError::Cancelled),
            Err(_) => {
                self.inner.pending.lock().await.remove(&msg_ref);
                warn!(event, msg_ref = %msg_ref, "signaling request timed out");
                Err(VoiceError::Timeout {
                    event: event.to_string(),
                })
            }
        }
    }
}

/// Requests bound to one router epoch, typically one voice session.
#[derive(Clone)]
pub struct SignalScope {
    router: SignalRouter,
    epoch: u64,
}

impl SignalScope {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self) -> bool {
        self.epoch == self.router.epoch()
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    /// Send `event` and wait for the reply carrying the same `ref`.
    pub async fn request(&self, event: &str, payload: Value) -> Result<SignalEnvelope, VoiceError> {
        self.router.request(self.epoch, event, payload).await
    }

    pub async fn notify(&self, event: &str, payload: Value) -> Result<(), VoiceError> {
        if !self.is_current() {
            return Err(VoiceError::Cancelled);
        }
        self.router.notify(event, payload).await
    }

    /// Round-trip a `ping` and return the elapsed time.
    pub async fn ping(&self) -> Result<Duration, VoiceError> {
        let started = Instant::now();
        let reply = self.request(events::PING, Value::Null).await?;
        reply.expect_event(events::PONG)?;
        Ok(started.elapsed())
    }
}

async fn dispatch_loop(
    inner: Arc<RouterInner>,
    mut events: mpsc::Receiver<SignalingEvent>,
    notify_tx: mpsc::Sender<Notification>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SignalingEvent::Connected { connection_id } => {
                let _ = notify_tx
                    .send(Notification::Connected { connection_id })
                    .await;
            }
            SignalingEvent::Disconnected => {
                inner.cancel_all().await;
                let _ = notify_tx.send(Notification::Disconnected).await;
            }
            SignalingEvent::Message(envelope) => {
                if let Some(msg_ref) = envelope.msg_ref.clone() {
                    inner.resolve(&msg_ref, envelope).await;
                    continue;
                }

                if let Some(tx) = inner.subscriptions.lock().await.get(&envelope.event) {
                    let _ = tx.try_send(envelope.clone());
                }

                if envelope.event == events::DISCONNECTED {
                    inner.cancel_all().await;
                }
                match Notification::from_envelope(envelope) {
                    Ok(notification) => {
                        let _ = notify_tx.send(notification).await;
                    }
                    Err(e) => warn!(error = %e, "dropping undecodable push"),
                }
            }
        }
    }
    debug!("signaling dispatch loop ended");
}
