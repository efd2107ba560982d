//! # Broadcast Triggers
//!
//! A trigger strategy decides, chunk by chunk, when the audio collected so far
//! should be broadcast back to listeners. Two policies exist and they are
//! alternatives, not collaborators:
//!
//! - **Cyclic** ([`cyclic::CyclicTrigger`]): fixed-length record and hold
//!   phases; fires once at each record→hold edge and replays everything
//!   recorded in that phase.
//! - **Energy-gated** ([`energy::EnergyTrigger`]): watches a sliding window of
//!   volume estimates; fires once when silence follows activity and echoes the
//!   latest clip. Every chunk is also relayed live to other listeners.
//!
//! Strategies are plain state machines. They never look at the clock
//! themselves; the caller passes the arrival instant into `ingest`, which keeps
//! them deterministic under test.

pub mod cyclic;
pub mod energy;

use crate::audio::AudioChunk;
use crate::config::{AppConfig, TriggerKind};
use crate::protocol::ServerFrame;
use std::time::{Duration, Instant};

pub use cyclic::CyclicTrigger;
pub use energy::EnergyTrigger;

/// Outcome of a single `ingest` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    /// The chunk was kept in the accumulator
    pub stored: bool,
    /// Accumulated audio should be broadcast now
    pub fire: bool,
}

/// Audio handed to the broadcaster when a strategy fires.
#[derive(Debug)]
pub enum BroadcastPayload {
    /// Every chunk recorded since the last fire, oldest first
    Playback(Vec<AudioChunk>),
    /// Only the most recent chunk
    Latest(AudioChunk),
}

impl BroadcastPayload {
    pub fn chunk_count(&self) -> usize {
        match self {
            BroadcastPayload::Playback(chunks) => chunks.len(),
            BroadcastPayload::Latest(_) => 1,
        }
    }

    /// Time between the first and last chunk's arrival.
    pub fn span(&self) -> Duration {
        match self {
            BroadcastPayload::Playback(chunks) => match (chunks.first(), chunks.last()) {
                (Some(first), Some(last)) => last.received_at().saturating_duration_since(first.received_at()),
                _ => Duration::ZERO,
            },
            BroadcastPayload::Latest(_) => Duration::ZERO,
        }
    }

    /// Outbound frame carrying this payload.
    pub fn into_frame(self) -> ServerFrame {
        match self {
            BroadcastPayload::Playback(chunks) => ServerFrame::Playback {
                chunks: chunks.iter().map(AudioChunk::to_transfer).collect(),
            },
            BroadcastPayload::Latest(chunk) => ServerFrame::Audio {
                data: chunk.to_transfer(),
            },
        }
    }
}

/// Common interface of the trigger policies.
pub trait TriggerStrategy: Send {
    /// Short, stable name for logs and the status endpoint.
    fn name(&self) -> &'static str;

    /// Feed one decoded chunk received at `now`.
    fn ingest(&mut self, chunk: AudioChunk, now: Instant) -> Decision;

    /// Take the audio to broadcast after a fire, or `None` if nothing is stored.
    fn drain_for_broadcast(&mut self) -> Option<BroadcastPayload>;

    /// Number of chunks currently accumulated.
    fn stored_chunks(&self) -> usize;

    /// Whether each accepted chunk should also be relayed live to the
    /// sender's peers.
    fn relays_live(&self) -> bool {
        false
    }

    /// Current phase, for strategies that cycle through named phases.
    fn phase_name(&self) -> Option<&'static str> {
        None
    }

    /// Volume samples currently held, for strategies that keep a window.
    fn window_fill(&self) -> Option<usize> {
        None
    }

    /// Return to the initial state as of `now`, dropping stored audio.
    fn reset(&mut self, now: Instant);
}

/// Build the strategy selected in the configuration.
pub fn build(config: &AppConfig, now: Instant) -> Box<dyn TriggerStrategy> {
    match config.relay.strategy {
        TriggerKind::Cyclic => Box::new(CyclicTrigger::new(
            config.cyclic.accumulate(),
            config.cyclic.hold(),
            now,
        )),
        TriggerKind::EnergyGated => Box::new(EnergyTrigger::new(
            config.energy.window_size,
            config.energy.threshold,
            config.energy.silence(),
            config.energy.max_stored_chunks,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_selects_strategy() {
        let mut config = AppConfig::default();
        let now = Instant::now();
        let strategy = build(&config, now);
        assert_eq!(strategy.name(), "cyclic");
        assert_eq!(strategy.phase_name(), Some("accumulating"));
        assert_eq!(strategy.window_fill(), None);

        config.relay.strategy = TriggerKind::EnergyGated;
        let strategy = build(&config, now);
        assert_eq!(strategy.name(), "energy_gated");
        assert!(strategy.relays_live());
        assert_eq!(strategy.phase_name(), None);
        assert_eq!(strategy.window_fill(), Some(0));
    }

    #[test]
    fn test_payload_frames() {
        let now = Instant::now();
        let playback = BroadcastPayload::Playback(vec![
            AudioChunk::from_bytes(vec![1], now),
            AudioChunk::from_bytes(vec![2], now + Duration::from_millis(750)),
        ]);
        assert_eq!(playback.chunk_count(), 2);
        assert_eq!(playback.span(), Duration::from_millis(750));
        assert_eq!(
            playback.into_frame(),
            ServerFrame::Playback {
                chunks: vec!["AQ==".to_string(), "Ag==".to_string()]
            }
        );

        let latest = BroadcastPayload::Latest(AudioChunk::from_bytes(vec![3], now));
        assert_eq!(
            latest.into_frame(),
            ServerFrame::Audio {
                data: "Aw==".to_string()
            }
        );
    }
}
