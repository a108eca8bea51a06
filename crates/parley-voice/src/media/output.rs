//! Playback seam for remote audio.

use super::track::AudioTrack;
use crate::error::PlaybackError;

/// Handle to one playback element created by an [`AudioOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Where consumed audio is rendered.
pub trait AudioOutput: Send + Sync {
    /// Create a playback element for `participant` bound to `track`.
    fn attach(&self, participant: &str, track: &AudioTrack) -> ElementId;

    /// Start playback. May be refused until the user interacts.
    fn play(&self, element: ElementId) -> Result<(), PlaybackError>;

    fn set_muted(&self, element: ElementId, muted: bool);

    /// Stop playback and detach the element.
    fn remove(&self, element: ElementId);
}
