//! Audio frames, tracks, and streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::debug;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A block of mono PCM samples in `-1.0..=1.0`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// A frame of `len` zero samples.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / f64::from(self.sample_rate)
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Producer side of a capture or decode pipeline. Every track created from
/// (or duplicated off) the same source sees the same frames.
#[derive(Debug, Clone)]
pub struct AudioSource {
    frames: broadcast::Sender<AudioFrame>,
}

impl AudioSource {
    pub fn new(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity.max(1));
        Self { frames }
    }

    pub fn track(&self, label: &str) -> AudioTrack {
        AudioTrack::from_sender(label, self.frames.clone())
    }

    /// Deliver a frame to every reader. Returns the number of readers reached.
    pub fn push(&self, frame: AudioFrame) -> usize {
        self.frames.send(frame).unwrap_or(0)
    }
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new(64)
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

struct TrackInner {
    id: String,
    label: String,
    enabled: AtomicBool,
    live: watch::Sender<bool>,
    frames: broadcast::Sender<AudioFrame>,
}

/// A cheaply clonable handle to one audio track.
///
/// Disabling a track keeps it live but makes readers see silence;
/// stopping it ends every reader.
#[derive(Clone)]
pub struct AudioTrack {
    inner: Arc<TrackInner>,
}

impl std::fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

impl AudioTrack {
    fn from_sender(label: &str, frames: broadcast::Sender<AudioFrame>) -> Self {
        let (live, _) = watch::channel(true);
        Self {
            inner: Arc::new(TrackInner {
                id: parley_common::new_id(),
                label: label.to_string(),
                enabled: AtomicBool::new(true),
                live,
                frames,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        *self.inner.live.borrow()
    }

    /// End the track. Idempotent.
    pub fn stop(&self) {
        self.inner.live.send_replace(false);
    }

    /// A new, independently controlled track fed by the same source.
    pub fn duplicate(&self) -> AudioTrack {
        let copy = Self::from_sender(&self.inner.label, self.inner.frames.clone());
        copy.set_enabled(self.is_enabled());
        if !self.is_live() {
            copy.stop();
        }
        copy
    }

    pub fn subscribe(&self) -> TrackReader {
        TrackReader {
            track: self.clone(),
            frames: self.inner.frames.subscribe(),
            live: self.inner.live.subscribe(),
        }
    }

    pub fn same_track(&self, other: &AudioTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Receiving end of a track.
pub struct TrackReader {
    track: AudioTrack,
    frames: broadcast::Receiver<AudioFrame>,
    live: watch::Receiver<bool>,
}

impl TrackReader {
    /// Next frame, or `None` once the track is stopped or its source is gone.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        loop {
            if !*self.live.borrow_and_update() {
                return None;
            }
            tokio::select! {
                changed = self.live.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                frame = self.frames.recv() => match frame {
                    Ok(frame) if self.track.is_enabled() => return Some(frame),
                    Ok(frame) => {
                        return Some(AudioFrame::silence(frame.samples.len(), frame.sample_rate));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(track = %self.track.id(), skipped, "audio reader lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// A group of tracks returned by one capture request.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<AudioTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<AudioTrack>) -> Self {
        Self {
            id: parley_common::new_id(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    pub fn first_audio_track(&self) -> Option<&AudioTrack> {
        self.tracks.first()
    }

    pub fn set_enabled(&self, enabled: bool) {
        for track in &self.tracks {
            track.set_enabled(enabled);
        }
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Clone every track into a new stream with its own enable/stop state.
    pub fn duplicate(&self) -> MediaStream {
        MediaStream::new(self.tracks.iter().map(AudioTrack::duplicate).collect())
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_and_rms() {
        let frame = AudioFrame::new(vec![0.5; 480], 48_000);
        assert!((frame.duration_ms() - 10.0).abs() < 1e-9);
        assert!((frame.rms() - 0.5).abs() < 1e-6);
        assert_eq!(AudioFrame::new(Vec::new(), 0).duration_ms(), 0.0);
        assert_eq!(AudioFrame::new(Vec::new(), 48_000).rms(), 0.0);
    }

    #[tokio::test]
    async fn reader_sees_pushed_frames() {
        let source = AudioSource::default();
        let track = source.track("mic");
        let mut reader = track.subscribe();

        assert_eq!(source.push(AudioFrame::new(vec![0.25; 4], 48_000)), 1);
        let frame = reader.recv().await.unwrap();
        assert_eq!(frame.samples.len(), 4);
        assert!((frame.samples[0] - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn disabled_track_reads_silence() {
        let source = AudioSource::default();
        let track = source.track("mic");
        let mut reader = track.subscribe();
        track.set_enabled(false);

        source.push(AudioFrame::new(vec![0.9; 8], 48_000));
        let frame = reader.recv().await.unwrap();
        assert_eq!(frame.samples.len(), 8);
        assert!(frame.samples.iter().all(|s| *s == 0.0));
    }

    #[tokio::test]
    async fn stopping_ends_pending_reader() {
        let source = AudioSource::default();
        let track = source.track("mic");
        let mut reader = track.subscribe();

        let waiter = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;
        track.stop();
        assert!(waiter.await.unwrap().is_none());
        assert!(!track.is_live());
    }

    #[tokio::test]
    async fn duplicate_is_independent_but_shares_source() {
        let source = AudioSource::default();
        let primary = source.track("mic");
        let copy = primary.duplicate();
        assert!(!copy.same_track(&primary));

        let mut copy_reader = copy.subscribe();
        primary.set_enabled(false);
        source.push(AudioFrame::new(vec![0.5; 2], 48_000));
        let frame = copy_reader.recv().await.unwrap();
        assert!((frame.samples[0] - 0.5).abs() < f32::EPSILON);

        primary.stop();
        assert!(copy.is_live());
    }

    #[test]
    fn stream_stop_and_count() {
        let source = AudioSource::default();
        let stream = MediaStream::new(vec![source.track("a"), source.track("b")]);
        let copy = stream.duplicate();
        assert_eq!(stream.live_track_count(), 2);
        stream.stop();
        assert_eq!(stream.live_track_count(), 0);
        assert_eq!(copy.live_track_count(), 2);
    }
}
