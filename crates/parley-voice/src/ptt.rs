//! Push-to-talk and voice-activation gating.
//!
//! Both modes resolve to the same two actions, resume or pause the
//! producer; this module only decides which, leaving the effects to the
//! session.

use parley_config::VoiceMode;

/// Conditions under which transmitting is allowed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TalkGate {
    /// The user explicitly muted themselves.
    pub mic_muted: bool,
    /// Capture was refused; only an explicit unmute asks again.
    pub mic_denied: bool,
    pub channel_selected: bool,
}

impl TalkGate {
    fn open(self) -> bool {
        !self.mic_muted && !self.mic_denied && self.channel_selected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkAction {
    Resume,
    Pause { mute_mic: bool },
}

#[derive(Debug, Clone)]
pub struct PushToTalk {
    mode: VoiceMode,
    key_held: bool,
}

impl PushToTalk {
    pub fn new(mode: VoiceMode) -> Self {
        Self {
            mode,
            key_held: false,
        }
    }

    pub fn mode(&self) -> VoiceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VoiceMode) {
        self.mode = mode;
        self.key_held = false;
    }

    pub fn is_held(&self) -> bool {
        self.key_held
    }

    /// Key pressed. Auto-repeat while held yields nothing.
    pub fn key_down(&mut self, gate: TalkGate) -> Option<TalkAction> {
        if self.mode != VoiceMode::Ptt || self.key_held {
            return None;
        }
        self.key_held = true;
        gate.open().then_some(TalkAction::Resume)
    }

    /// Key released. Always pauses and mutes the mic.
    pub fn key_up(&mut self) -> Option<TalkAction> {
        if self.mode != VoiceMode::Ptt {
            return None;
        }
        self.key_held = false;
        Some(TalkAction::Pause { mute_mic: true })
    }

    /// Local speaking detector transition in voice-activation mode.
    pub fn voice_activity(&self, speaking: bool, gate: TalkGate) -> Option<TalkAction> {
        if self.mode != VoiceMode::Vad {
            return None;
        }
        if !speaking {
            return Some(TalkAction::Pause { mute_mic: false });
        }
        gate.open().then_some(TalkAction::Resume)
    }

    pub fn reset(&mut self) {
        self.key_held = false;
    }
}
