//! WebSocket signaling channel with heartbeat and auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parley_config::schema::SignalingConfig;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{SignalingChannel, SignalingEvent};
use crate::error::SignalingError;
use crate::protocol::{events, Greeting, SignalEnvelope};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsSignalingConfig {
    pub url: String,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub connect_timeout: Duration,
}

impl Default for WsSignalingConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&SignalingConfig> for WsSignalingConfig {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            url: config.url.clone(),
            heartbeat_interval_secs: u64::from(config.heartbeat_interval_secs),
            reconnect_delay_secs: u64::from(config.reconnect_delay_secs),
            max_reconnect_delay_secs: u64::from(config.max_reconnect_delay_secs),
            ..Self::default()
        }
    }
}

/// URL with any query string removed, for logging.
fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ConnectionState {
    connected: bool,
    connection_id: Option<String>,
}

/// Signaling over a WebSocket carrying JSON [`SignalEnvelope`]s.
///
/// All sends go through a background connection task that reconnects
/// with exponential backoff until [`disconnect`](Self::disconnect).
pub struct WsSignaling {
    outbound: mpsc::Sender<SignalEnvelope>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: watch::Sender<bool>,
}

impl WsSignaling {
    /// Start the background connection. Returns `(channel, event_receiver)`.
    pub fn connect(config: WsSignalingConfig) -> (Self, mpsc::Receiver<SignalingEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outbound, outbound_rx) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(ConnectionState::default()));

        tokio::spawn(connection_loop(
            config,
            Arc::clone(&state),
            event_tx,
            outbound_rx,
            shutdown_rx,
        ));

        let client = Self {
            outbound,
            state,
            shutdown,
        };
        (client, event_rx)
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    /// Close the socket and stop reconnecting.
    pub fn disconnect(&self) {
        self.shutdown.send_replace(true);
    }
}

#[async_trait]
impl SignalingChannel for WsSignaling {
    async fn emit(&self, envelope: SignalEnvelope) -> Result<(), SignalingError> {
        if !self.state.read().await.connected {
            return Err(SignalingError::NotConnected);
        }
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| SignalingError::Closed)
    }

    async fn connection_id(&self) -> Option<String> {
        self.state.read().await.connection_id.clone()
    }
}

impl Drop for WsSignaling {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

async fn connection_loop(
    config: WsSignalingConfig,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::Sender<SignalingEvent>,
    outbound_rx: mpsc::Receiver<SignalEnvelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    let outbound_rx = Arc::new(Mutex::new(outbound_rx));
    let mut reconnect_delay = config.reconnect_delay_secs.max(1);
    let mut stopping = false;

    loop {
        if stopping || *shutdown.borrow() {
            break;
        }
        info!(url = %redact_url(&config.url), "connecting to signaling server");

        match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs.max(1);
                state.write().await.connected = true;
                let _ = event_tx
                    .send(SignalingEvent::Connected {
                        connection_id: None,
                    })
                    .await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let forward_handle =
                    tokio::spawn(outbound_forwarder(Arc::clone(&outbound_rx), Arc::clone(&ws_write)));

                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            stopping = true;
                            let mut writer = ws_write.lock().await;
                            let _ = writer.send(WsMessage::Close(None)).await;
                            break;
                        }
                        msg = ws_read.next() => match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                handle_text(&text, &state, &event_tx).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("signaling server closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }

                heartbeat_handle.abort();
                forward_handle.abort();
                {
                    let mut state = state.write().await;
                    state.connected = false;
                    state.connection_id = None;
                }
                let _ = event_tx.send(SignalingEvent::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to connect to signaling server");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout.as_secs(),
                    "signaling connection timed out"
                );
            }
        }

        if stopping || *shutdown.borrow() {
            break;
        }

        info!(delay = reconnect_delay, "reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
            _ = shutdown.changed() => stopping = true,
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs.max(1));
    }

    info!("signaling connection loop stopped");
}

async fn handle_text(
    text: &str,
    state: &RwLock<ConnectionState>,
    event_tx: &mpsc::Sender<SignalingEvent>,
) {
    let envelope = match serde_json::from_str::<SignalEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            debug!(text = %text, "unrecognized signaling message");
            return;
        }
    };

    if envelope.event == events::CONNECTED && envelope.msg_ref.is_none() {
        match envelope.decode::<Greeting>() {
            Ok(greeting) => {
                info!(socket_id = %greeting.socket_id, "signaling session established");
                state.write().await.connection_id = Some(greeting.socket_id.clone());
                let _ = event_tx
                    .send(SignalingEvent::Connected {
                        connection_id: Some(greeting.socket_id),
                    })
                    .await;
            }
            Err(e) => warn!(error = %e, "malformed greeting"),
        }
        return;
    }

    let _ = event_tx.send(SignalingEvent::Message(envelope)).await;
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Default::default())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound Forwarder
// ---------------------------------------------------------------------------

async fn outbound_forwarder<S>(
    outbound_rx: Arc<Mutex<mpsc::Receiver<SignalEnvelope>>>,
    ws_write: Arc<Mutex<S>>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = outbound_rx.lock().await;
    while let Some(envelope) = rx.recv().await {
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(event = %envelope.event, error = %e, "failed to encode signaling message");
                continue;
            }
        };
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Text(json.into())).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_schema() {
        let schema = SignalingConfig {
            url: "wss://chat.example.org/voice?token=secret".into(),
            ..SignalingConfig::default()
        };
        let config = WsSignalingConfig::from(&schema);
        assert_eq!(config.heartbeat_interval_secs, 25);
        assert_eq!(config.max_reconnect_delay_secs, 30);
        assert_eq!(redact_url(&config.url), "wss://chat.example.org/voice");
    }
}
