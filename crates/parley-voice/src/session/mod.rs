//! Session orchestration.
//!
//! [`SessionMachine`] is the protocol state machine; [`VoiceClient`] runs
//! it as a task and exposes a command handle plus snapshot and event
//! streams for a UI layer.

mod client;
mod machine;
mod types;


pub use client::{VoiceClient, VoiceCommand};
pub use machine::{MediaDeps, SessionChannels, SessionMachine};
pub use types::{ConnectionStatus, Participant, SpeakingState, VoiceEvent, VoiceSnapshot};
