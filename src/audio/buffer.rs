//! # Audio Accumulation
//!
//! Holds the chunks collected since the last fire or clear. The accumulator is
//! owned by a trigger strategy, which in turn is owned by the relay hub actor,
//! so it needs no internal locking: every append, drain and clear happens
//! inside the hub's single message-processing context.
//!
//! ## Key Features:
//! - **Ordered**: chunks come back out in arrival order
//! - **Optionally bounded**: past capacity the oldest chunk is discarded
//! - **Atomic drain**: reading for a broadcast empties the buffer in one step

use crate::audio::chunk::AudioChunk;
use std::collections::VecDeque;

/// Ordered store of audio chunks awaiting broadcast.
#[derive(Debug, Default)]
pub struct Accumulator {
    chunks: VecDeque<AudioChunk>,

    /// Maximum number of chunks to keep (`None` = unbounded)
    capacity: Option<usize>,
}

impl Accumulator {
    /// Accumulator that keeps every chunk until drained.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Accumulator that keeps at most `capacity` chunks, evicting the oldest.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// Append a chunk, evicting from the front if the buffer is full.
    pub fn push(&mut self, chunk: AudioChunk) {
        self.chunks.push_back(chunk);

        if let Some(capacity) = self.capacity {
            while self.chunks.len() > capacity {
                self.chunks.pop_front();
            }
        }
    }

    /// Take every stored chunk, leaving the accumulator empty.
    pub fn drain_all(&mut self) -> Vec<AudioChunk> {
        self.chunks.drain(..).collect()
    }

    /// Take the most recent chunk and discard the rest.
    pub fn take_latest(&mut self) -> Option<AudioChunk> {
        let latest = self.chunks.pop_back();
        self.chunks.clear();
        latest
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes currently held.
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(AudioChunk::len).sum()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &AudioChunk> {
        self.chunks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn chunk(tag: u8) -> AudioChunk {
        AudioChunk::from_bytes(vec![tag; 4], Instant::now())
    }

    #[test]
    fn test_unbounded_keeps_order() {
        let mut acc = Accumulator::unbounded();
        for tag in 1..=5 {
            acc.push(chunk(tag));
        }

        let tags: Vec<u8> = acc.drain_all().iter().map(|c| c.bytes()[0]).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5]);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut acc = Accumulator::bounded(2);
        acc.push(chunk(1));
        acc.push(chunk(2));
        acc.push(chunk(3));

        assert_eq!(acc.len(), 2);
        let tags: Vec<u8> = acc.iter().map(|c| c.bytes()[0]).collect();
        assert_eq!(tags, vec![2, 3]);
        assert_eq!(acc.total_bytes(), 8);
    }

    #[test]
    fn test_take_latest_clears() {
        let mut acc = Accumulator::bounded(4);
        acc.push(chunk(1));
        acc.push(chunk(9));

        let latest = acc.take_latest().unwrap();
        assert_eq!(latest.bytes()[0], 9);
        assert!(acc.is_empty());
        assert!(acc.take_latest().is_none());
    }
}
