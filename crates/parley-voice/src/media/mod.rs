//! Media primitives and the platform seams that carry them.
//!
//! Tracks and streams are in-process handles; the actual RTP stack and
//! playback device sit behind [`MediaEngine`] and [`AudioOutput`].

mod engine;
mod output;
mod track;

pub use engine::{IceServer, MediaEngine, RtcConsumer, RtcProducer, RtcTransport, TransportDirection};
pub use output::{AudioOutput, ElementId};
pub use track::{AudioFrame, AudioSource, AudioTrack, MediaStream, TrackReader};
