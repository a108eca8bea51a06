//! Session state, snapshots, and events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Member;
use crate::settings::ConnectionQuality;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of the voice session. `Disconnected` stays put until a new
/// join (or a matching rejoin) restarts the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// A channel member as shown in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub username: String,
    pub display_name: Option<String>,
    pub is_muted: bool,
    pub is_deafened: bool,
}

impl From<&Member> for Participant {
    fn from(member: &Member) -> Self {
        Self {
            username: member.username.clone(),
            display_name: member.display_name.clone(),
            is_muted: member.is_muted,
            is_deafened: member.is_deafened,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakingState {
    pub speaking: bool,
    pub changed_at: DateTime<Utc>,
}

/// Read-only view of the session published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoiceSnapshot {
    pub status: ConnectionStatus,
    pub channel_id: Option<String>,
    pub muted: bool,
    pub deafened: bool,
    pub latency_ms: Option<u64>,
    pub quality: ConnectionQuality,
    /// Remote audio is waiting for a user gesture before it can play.
    pub interaction_required: bool,
    pub mic_not_granted: bool,
    /// The local producer exists and is not paused.
    pub transmitting: bool,
    /// Channel id to roster.
    pub members: HashMap<String, Vec<Participant>>,
    pub speaking: HashMap<String, SpeakingState>,
}

impl VoiceSnapshot {
    pub fn members_of(&self, channel_id: &str) -> &[Participant] {
        self.members.get(channel_id).map_or(&[], Vec::as_slice)
    }

    pub fn is_speaking(&self, participant: &str) -> bool {
        self.speaking.get(participant).is_some_and(|s| s.speaking)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Discrete changes for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    StatusChanged {
        status: ConnectionStatus,
        channel_id: Option<String>,
    },
    ParticipantJoined {
        channel_id: String,
        username: String,
    },
    ParticipantLeft {
        channel_id: String,
        username: String,
    },
    SpeakingChanged {
        username: String,
        speaking: bool,
    },
    LatencyMeasured {
        latency_ms: u64,
        quality: ConnectionQuality,
    },
    /// Capture failed; the session continues listen-only.
    MicUnavailable(String),
    InteractionRequired,
    Error(String),
}
