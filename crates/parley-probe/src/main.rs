//! parley-probe: signaling health check for a parley voice server.
//!
//! Connects to the signaling socket, joins a voice channel, loads the
//! router's RTP capabilities into a [`Device`], samples latency and
//! leaves. Prints a JSON summary on stdout.

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use parley_common::ParleyError;
use parley_config::schema::ParleyConfig;
use parley_config::{toml_loader, validation};
use parley_voice::protocol::{
    encode_payload, events, JoinVoiceChannel, MediaKind, RtpCapabilities, RtpCapabilitiesResponse,
};
use parley_voice::signaling::Notification;
use parley_voice::{
    ConnectionQuality, Device, SignalRouter, VoiceError, VoiceSettings, WsSignaling,
    WsSignalingConfig,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn load_config(path: Option<&str>) -> ParleyConfig {
    let loaded = match path {
        Some(path) => {
            tracing::info!("Using config override: {path}");
            toml_loader::load_from_path(Path::new(path))
                .and_then(|config| validation::validate(&config).map(|()| config))
        }
        None => parley_config::load_config(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        ParleyConfig::default()
    })
}

/// Wait for the server greeting carrying our socket id.
///
/// The socket reports `Connected` once on open and again after the
/// greeting; only the second carries an id. A server that never greets is
/// accepted at the deadline as long as the socket opened.
async fn wait_connected(
    notifications: &mut mpsc::Receiver<Notification>,
    limit: Duration,
) -> Result<Option<String>, ParleyError> {
    let deadline = tokio::time::Instant::now() + limit;
    let mut opened = false;
    loop {
        match tokio::time::timeout_at(deadline, notifications.recv()).await {
            Ok(Some(Notification::Connected {
                connection_id: Some(id),
            })) => return Ok(Some(id)),
            Ok(Some(Notification::Connected { connection_id: None })) => opened = true,
            Ok(Some(Notification::Disconnected)) => opened = false,
            Ok(Some(_)) => {}
            Ok(None) => return Err(ParleyError::Signaling("router stopped".into())),
            Err(_) if opened => {
                tracing::warn!("no greeting from server, continuing without a socket id");
                return Ok(None);
            }
            Err(_) => {
                return Err(ParleyError::Signaling(format!(
                    "not connected after {}s",
                    limit.as_secs()
                )))
            }
        }
    }
}

async fn run(args: cli::Args, config: ParleyConfig) -> Result<(), ParleyError> {
    let settings = VoiceSettings::from(&config);
    let mut ws_config = WsSignalingConfig::from(&config.signaling);
    if let Some(url) = args.url {
        ws_config.url = url;
    }
    if ws_config.url.is_empty() {
        return Err(ParleyError::Other(
            "no signaling URL (pass --url or set signaling.url)".into(),
        ));
    }
    let connect_timeout = ws_config.connect_timeout;

    let (ws, signaling_events) = WsSignaling::connect(ws_config);
    let ws = Arc::new(ws);
    let (router, mut notifications) =
        SignalRouter::spawn(ws.clone(), signaling_events, settings.request_timeout);

    let connection_id = wait_connected(&mut notifications, connect_timeout).await?;
    tracing::info!(?connection_id, "signaling connected");

    let scope = router.scope();
    let join = JoinVoiceChannel {
        channel_id: args.channel.clone(),
    };
    let reply = scope
        .request(events::JOIN_VOICE_CHANNEL, encode_payload(&join)?)
        .await?;
    reply.expect_event(events::GET_RTP_CAPABILITIES)?;
    let joined: RtpCapabilitiesResponse = reply.decode()?;

    let device = Device::new(RtpCapabilities::opus());
    let compatible = match device.load(&joined.rtp_capabilities) {
        Ok(()) => true,
        Err(VoiceError::IncompatibleCapabilities(reason)) => {
            tracing::warn!(%reason, "router has no usable audio codec");
            false
        }
        Err(e) => return Err(e.into()),
    };
    let members: Vec<String> = joined
        .channel
        .map(|c| c.members.into_iter().map(|m| m.username).collect())
        .unwrap_or_default();

    let mut samples = Vec::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for n in 0..args.pings {
        ticker.tick().await;
        let latency = match tokio::time::timeout(settings.ping_timeout, scope.ping()).await {
            Ok(Ok(rtt)) => Some(rtt),
            Ok(Err(e)) => {
                tracing::warn!(sample = n, error = %e, "ping failed");
                None
            }
            Err(_) => {
                tracing::warn!(sample = n, "ping timed out");
                None
            }
        };
        let quality = settings.quality_for(latency);
        tracing::debug!(sample = n, ?latency, ?quality, "latency sample");
        samples.push((latency, quality));
    }

    if let Err(e) = router
        .notify(events::LEAVE_VOICE_CHANNEL, serde_json::Value::Null)
        .await
    {
        tracing::debug!(error = %e, "leave not sent");
    }
    ws.disconnect();

    let answered: Vec<u128> = samples
        .iter()
        .filter_map(|(latency, _)| latency.map(|d| d.as_millis()))
        .collect();
    let worst = samples
        .iter()
        .map(|(_, q)| *q)
        .max_by_key(|q| quality_rank(*q))
        .unwrap_or(ConnectionQuality::Disconnected);

    let summary = json!({
        "channelId": args.channel,
        "connectionId": connection_id,
        "compatible": compatible,
        "canProduceAudio": device.can_produce(MediaKind::Audio),
        "members": members,
        "latencyMs": answered,
        "lost": samples.len() - answered.len(),
        "quality": worst,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).map_err(|e| ParleyError::Other(e.to_string()))?
    );
    Ok(())
}

fn quality_rank(quality: ConnectionQuality) -> u8 {
    match quality {
        ConnectionQuality::Good => 0,
        ConnectionQuality::Average => 1,
        ConnectionQuality::Bad => 2,
        ConnectionQuality::Disconnected => 3,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let log_directive = args.log_level.as_deref().unwrap_or("parley=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("parley-probe v{} starting", env!("CARGO_PKG_VERSION"));
    let config = load_config(args.config.as_deref());

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("probe failed: {e}");
            ExitCode::FAILURE
        }
    }
}
