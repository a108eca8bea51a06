//! Local microphone capture.
//!
//! The microphone owns the captured stream and a duplicate reserved for
//! local analysis. Mute state is independent of capture: muting disables
//! the primary tracks without releasing the device.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parley_config::schema::VoiceConfig;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::MicError;
use crate::media::{AudioTrack, MediaStream};

/// Capture request parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub device: String,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device: "default".into(),
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

impl From<&VoiceConfig> for CaptureConstraints {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            device: config.input_device.clone(),
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
        }
    }
}

/// Platform capture. `acquire` may prompt the user for permission.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<MediaStream, MicError>;
}

type Acquisition = Shared<BoxFuture<'static, Result<MediaStream, MicError>>>;

struct Capture {
    stream: MediaStream,
    analysis: MediaStream,
}

struct MicState {
    capture: Option<Capture>,
    /// Pending acquisition shared by every concurrent `get`, tagged with
    /// the generation it was started in.
    in_flight: Option<(u64, Acquisition)>,
    /// Bumped by `stop` so results of older acquisitions are discarded.
    generation: u64,
    muted: bool,
}

pub struct Microphone {
    backend: Arc<dyn CaptureBackend>,
    constraints: CaptureConstraints,
    state: Mutex<MicState>,
}

impl Microphone {
    pub fn new(backend: Arc<dyn CaptureBackend>, constraints: CaptureConstraints) -> Self {
        Self {
            backend,
            constraints,
            state: Mutex::new(MicState {
                capture: None,
                in_flight: None,
                generation: 0,
                muted: false,
            }),
        }
    }

    /// Return the captured stream, acquiring it on first use.
    ///
    /// Concurrent callers share one pending acquisition, so the backend
    /// sees at most one request at a time.
    pub async fn get(&self) -> Result<MediaStream, MicError> {
        let (generation, acquisition) = {
            let mut state = self.state.lock().await;
            if let Some(capture) = &state.capture {
                return Ok(capture.stream.clone());
            }
            match &state.in_flight {
                Some((generation, pending)) => (*generation, pending.clone()),
                None => {
                    let backend = Arc::clone(&self.backend);
                    let constraints = self.constraints.clone();
                    let pending = async move { backend.acquire(&constraints).await }
                        .boxed()
                        .shared();
                    debug!(device = %self.constraints.device, "requesting microphone");
                    state.in_flight = Some((state.generation, pending.clone()));
                    (state.generation, pending)
                }
            }
        };

        let result = acquisition.await;

        let mut state = self.state.lock().await;
        if matches!(&state.in_flight, Some((g, _)) if *g == generation) {
            state.in_flight = None;
        }
        if state.generation != generation {
            if let Ok(stream) = &result {
                stream.stop();
            }
            debug!("discarding microphone acquired after stop");
            return Err(MicError::Cancelled);
        }

        let stream = result?;
        if let Some(capture) = &state.capture {
            // Another waiter on the same acquisition stored it first.
            return Ok(capture.stream.clone());
        }
        if state.muted {
            stream.set_enabled(false);
        }
        let analysis = stream.duplicate();
        analysis.set_enabled(true);
        info!(tracks = stream.tracks().len(), "microphone acquired");
        state.capture = Some(Capture {
            stream: stream.clone(),
            analysis,
        });
        Ok(stream)
    }

    /// Release the device. Safe to call when nothing is captured.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.in_flight = None;
        if let Some(capture) = state.capture.take() {
            capture.stream.stop();
            capture.analysis.stop();
            info!("microphone released");
        }
    }

    /// Stop sending captured audio without releasing the device.
    pub async fn mute(&self) {
        let mut state = self.state.lock().await;
        state.muted = true;
        if let Some(capture) = &state.capture {
            capture.stream.set_enabled(false);
        }
    }

    /// Re-enable capture, acquiring the device if needed.
    ///
    /// On failure the microphone is left muted.
    pub async fn unmute(&self) -> Result<(), MicError> {
        self.state.lock().await.muted = false;
        match self.get().await {
            Ok(stream) => {
                stream.set_enabled(true);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "unmute failed, staying muted");
                self.state.lock().await.muted = true;
                Err(e)
            }
        }
    }

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.muted
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.capture.is_some()
    }

    /// The duplicate track used for local speaking detection.
    pub async fn analysis_track(&self) -> Option<AudioTrack> {
        let state = self.state.lock().await;
        state
            .capture
            .as_ref()
            .and_then(|c| c.analysis.first_audio_track().cloned())
    }

    /// Live tracks across the primary stream and its analysis copy.
    pub async fn live_track_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .capture
            .as_ref()
            .map_or(0, |c| c.stream.live_track_count() + c.analysis.live_track_count())
    }
}
