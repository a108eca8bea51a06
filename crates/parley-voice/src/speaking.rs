//! Speaking detection.
//!
//! Level tracking is RMS energy smoothed by an asymmetric EMA with a hold
//! timer. The clock advances by frame duration, so detection is
//! deterministic for a given frame sequence. Each detector runs as its own
//! task and reports transitions over an mpsc channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parley_config::schema::DetectorConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::media::AudioTrack;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub threshold: f32,
    pub attack: f32,
    pub release: f32,
    pub hold_ms: f64,
    /// Applied to samples before measuring.
    pub gain: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            threshold: 0.015,
            attack: 0.4,
            release: 0.05,
            hold_ms: 250.0,
            gain: 1.0,
        }
    }
}

impl From<&DetectorConfig> for DetectorSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.threshold as f32,
            attack: config.attack as f32,
            release: config.release as f32,
            hold_ms: f64::from(config.hold_ms),
            gain: 1.0,
        }
    }
}

impl DetectorSettings {
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

// ---------------------------------------------------------------------------
// Level tracker
// ---------------------------------------------------------------------------

/// Frame-by-frame speaking state.
#[derive(Debug, Clone)]
pub struct LevelTracker {
    settings: DetectorSettings,
    smoothed_rms: f32,
    speaking: bool,
    hold_until: f64,
    clock_ms: f64,
}

impl LevelTracker {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            smoothed_rms: 0.0,
            speaking: false,
            hold_until: 0.0,
            clock_ms: 0.0,
        }
    }

    /// Process one frame. Returns `Some(speaking)` only when the state flips.
    pub fn process(&mut self, samples: &[f32], frame_duration_ms: f64) -> Option<bool> {
        if samples.is_empty() {
            return None;
        }
        self.clock_ms += frame_duration_ms;

        let gain = self.settings.gain;
        let sum_sq: f32 = samples.iter().map(|s| (s * gain) * (s * gain)).sum();
        let rms = (sum_sq / samples.len() as f32).sqrt();

        let alpha = if rms > self.smoothed_rms {
            self.settings.attack
        } else {
            self.settings.release
        };
        self.smoothed_rms = alpha * rms + (1.0 - alpha) * self.smoothed_rms;

        let speaking = if self.smoothed_rms > self.settings.threshold {
            self.hold_until = self.clock_ms + self.settings.hold_ms;
            true
        } else {
            self.clock_ms < self.hold_until
        };

        if speaking != self.speaking {
            self.speaking = speaking;
            Some(speaking)
        } else {
            None
        }
    }

    pub fn volume(&self) -> f32 {
        self.smoothed_rms
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.settings);
    }
}

// ---------------------------------------------------------------------------
// Detector task
// ---------------------------------------------------------------------------

/// Message from a detector task to its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakingTransition {
    pub detector_id: u64,
    pub participant: String,
    pub speaking: bool,
    pub volume: f32,
}

/// Per-frame hook receiving `(volume, is_speaking)`.
pub type LevelCallback = Box<dyn FnMut(f32, bool) + Send>;

static NEXT_DETECTOR_ID: AtomicU64 = AtomicU64::new(1);

/// A running detector bound to one participant's track.
pub struct SpeakingDetector {
    id: u64,
    participant: String,
    handle: Option<JoinHandle<()>>,
}

impl SpeakingDetector {
    /// Start analysing `track`, sending transitions to `transitions`.
    ///
    /// A final "not speaking" transition is sent if the track ends while
    /// the participant was speaking.
    pub fn spawn(
        participant: &str,
        track: &AudioTrack,
        settings: DetectorSettings,
        transitions: mpsc::Sender<SpeakingTransition>,
        mut on_level: Option<LevelCallback>,
    ) -> Self {
        let id = NEXT_DETECTOR_ID.fetch_add(1, Ordering::Relaxed);
        let mut reader = track.subscribe();
        let name = participant.to_string();

        let handle = tokio::spawn(async move {
            let mut tracker = LevelTracker::new(settings);
            while let Some(frame) = reader.recv().await {
                let change = tracker.process(&frame.samples, frame.duration_ms());
                if let Some(cb) = on_level.as_mut() {
                    cb(tracker.volume(), tracker.is_speaking());
                }
                if let Some(speaking) = change {
                    let msg = SpeakingTransition {
                        detector_id: id,
                        participant: name.clone(),
                        speaking,
                        volume: tracker.volume(),
                    };
                    if transitions.send(msg).await.is_err() {
                        return;
                    }
                }
            }
            if tracker.is_speaking() {
                let _ = transitions
                    .send(SpeakingTransition {
                        detector_id: id,
                        participant: name.clone(),
                        speaking: false,
                        volume: 0.0,
                    })
                    .await;
            }
            debug!(participant = %name, detector = id, "speaking detector finished");
        });

        Self {
            id,
            participant: participant.to_string(),
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Stop analysing. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(participant = %self.participant, detector = self.id, "speaking detector stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SpeakingDetector {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor set
// ---------------------------------------------------------------------------

/// At most one detector per participant.
pub struct SpeakingMonitors {
    settings: DetectorSettings,
    transitions: mpsc::Sender<SpeakingTransition>,
    detectors: HashMap<String, SpeakingDetector>,
}

impl SpeakingMonitors {
    pub fn new(settings: DetectorSettings, transitions: mpsc::Sender<SpeakingTransition>) -> Self {
        Self {
            settings,
            transitions,
            detectors: HashMap::new(),
        }
    }

    /// Start a detector for `participant`, stopping any existing one first.
    pub fn start(&mut self, participant: &str, track: &AudioTrack, gain: f32) -> u64 {
        self.stop(participant);
        let detector = SpeakingDetector::spawn(
            participant,
            track,
            self.settings.with_gain(gain),
            self.transitions.clone(),
            None,
        );
        let id = detector.id();
        self.detectors.insert(participant.to_string(), detector);
        id
    }

    pub fn stop(&mut self, participant: &str) {
        if let Some(mut detector) = self.detectors.remove(participant) {
            detector.stop();
        }
    }

    pub fn stop_all(&mut self) {
        for (_, mut detector) in self.detectors.drain() {
            detector.stop();
        }
    }

    /// Whether a transition came from the detector currently bound to its participant.
    pub fn is_current(&self, transition: &SpeakingTransition) -> bool {
        self.detectors
            .get(&transition.participant)
            .is_some_and(|d| d.id() == transition.detector_id)
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}
