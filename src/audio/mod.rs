//! # Audio Handling
//!
//! Byte-level handling of the audio clips clients stream to the relay.
//!
//! ## Key Components:
//! - **Chunk**: base64 decoding and the byte-variance volume proxy
//! - **Buffer**: ordered, optionally bounded accumulator of chunks
//! - **Window**: fixed-capacity history of volume samples
//!
//! Payloads are opaque: nothing here decodes, mixes or resamples audio.

pub mod buffer; // Chunk accumulator drained at fire time
pub mod chunk; // Transfer decoding and volume estimation
pub mod window; // Sliding window of volume samples

pub use buffer::Accumulator;
pub use chunk::AudioChunk;
pub use window::SlidingWindow;
