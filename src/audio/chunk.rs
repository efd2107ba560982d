//! # Audio Chunks
//!
//! An [`AudioChunk`] is one inbound audio payload as received from a client.
//! Payloads arrive base64-encoded inside JSON frames and are usually
//! container-framed (WebM/Opus from a browser `MediaRecorder`), so they are
//! never interpreted as PCM samples. The only thing computed from the bytes is
//! a crude volume proxy used by the energy-gated trigger.

use crate::error::RelayError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Instant;

/// Divisor that maps raw byte variance into the [0, 1] volume range.
///
/// Uniformly random bytes have a variance of roughly 5461, so anything at or
/// above 1000 is treated as "loud".
const VARIANCE_SCALE: f32 = 1000.0;

/// One decoded audio payload plus the instant it was received.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    bytes: Vec<u8>,
    received_at: Instant,
}

impl AudioChunk {
    /// Decode a transfer-encoded payload.
    ///
    /// ## Errors:
    /// - **RelayError::Decode**: the text is not valid base64, or decodes to
    ///   zero bytes
    pub fn decode(encoded: &str, received_at: Instant) -> Result<Self, RelayError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RelayError::Decode(format!("invalid base64 payload: {}", e)))?;

        if bytes.is_empty() {
            return Err(RelayError::Decode("audio payload is empty".to_string()));
        }

        Ok(Self { bytes, received_at })
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: Vec<u8>, received_at: Instant) -> Self {
        Self { bytes, received_at }
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Re-encode the payload for an outbound frame.
    pub fn to_transfer(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Relative loudness proxy in [0, 1].
    ///
    /// Bytes are centred around 128 and the population variance is scaled by
    /// [`VARIANCE_SCALE`], then clamped. This is not a perceptual measure; it
    /// only tracks relative change between chunks of the same stream.
    pub fn volume(&self) -> f32 {
        byte_volume(&self.bytes)
    }
}

/// Volume proxy for an arbitrary byte slice. Empty input is silent.
pub fn byte_volume(bytes: &[u8]) -> f32 {
    if bytes.is_empty() {
        return 0.0;
    }

    let count = bytes.len() as f64;
    let mean = bytes.iter().map(|&b| b as f64 - 128.0).sum::<f64>() / count;
    let variance = bytes
        .iter()
        .map(|&b| {
            let centred = b as f64 - 128.0 - mean;
            centred * centred
        })
        .sum::<f64>()
        / count;

    ((variance as f32) / VARIANCE_SCALE).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload() {
        let now = Instant::now();
        let chunk = AudioChunk::decode("AQIDBA==", now).unwrap();
        assert_eq!(chunk.bytes(), &[1, 2, 3, 4]);
        assert_eq!(chunk.received_at(), now);
        assert_eq!(chunk.to_transfer(), "AQIDBA==");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = AudioChunk::decode("not base64!!", Instant::now()).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_empty() {
        let err = AudioChunk::decode("", Instant::now()).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn test_constant_bytes_are_silent() {
        assert_eq!(byte_volume(&[128; 64]), 0.0);
        assert_eq!(byte_volume(&[7; 64]), 0.0);
        assert_eq!(byte_volume(&[]), 0.0);
    }

    #[test]
    fn test_volume_is_clamped() {
        // Alternating 0/255 has variance ~16256, well past the scale.
        let loud: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
        assert_eq!(byte_volume(&loud), 1.0);
    }

    #[test]
    fn test_volume_tracks_spread() {
        // Alternating 118/138 -> variance 100 -> volume 0.1
        let quiet: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 118 } else { 138 }).collect();
        assert!((byte_volume(&quiet) - 0.1).abs() < 1e-6);
    }
}
