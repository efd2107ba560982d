//! # Relay
//!
//! Fan-out of audio to live WebSocket connections.
//!
//! ## Key Components:
//! - **Registry**: which connections are live and how to reach them
//! - **Guard**: cooldown that throttles repeated broadcast fires
//! - **Broadcaster**: concurrent, per-recipient-isolated delivery
//! - **Hub**: the actor that owns the trigger strategy and ties the rest together

pub mod broadcaster;
pub mod guard;
pub mod hub;
pub mod registry;

pub use broadcaster::OutboundFrame;
pub use hub::{Connect, Disconnect, GetStatus, IngestAudio, RelayHub, ResetTrigger};
pub use registry::ConnectionId;
