//! Signaling channel abstraction, request/response routing, and the
//! WebSocket implementation.
//!
//! The channel itself only moves envelopes. [`SignalRouter`] sits on top,
//! pairing replies with requests by `ref`, dropping replies that arrive
//! after their session was torn down, and decoding server pushes into
//! typed [`Notification`]s.

mod router;
mod types;
mod ws;


pub use router::{SignalRouter, SignalScope};
pub use types::{Notification, SignalingChannel, SignalingEvent};
pub use ws::{WsSignaling, WsSignalingConfig};
