//! # Wire Protocol
//!
//! JSON text frames exchanged over the `/ws` WebSocket.
//!
//! ## Client → Server:
//! - `{"type":"audio","data":"<base64>"}`: one audio chunk
//! - `{"type":"ping"}`: application-level keepalive, answered with `pong`
//!
//! ## Server → Client:
//! - `{"type":"pong"}`
//! - `{"type":"playback","chunks":["<base64>", ...]}`: cyclic replay
//! - `{"type":"audio","data":"<base64>"}`: live relay or energy-gated echo
//!
//! Frames with an unknown `type` are accepted and ignored; frames that are not
//! JSON, lack a `type`, or miss required fields are protocol errors.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Audio chunk, transfer-encoded
    Audio { data: String },

    /// Keepalive request
    Ping,

    /// Any other `type` value
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Pong,

    /// Every chunk recorded during one cyclic record phase
    Playback { chunks: Vec<String> },

    /// A single chunk
    Audio { data: String },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: every field is a string.
        serde_json::to_string(self).unwrap_or_default()
    }
}
