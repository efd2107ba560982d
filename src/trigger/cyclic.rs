//! Fixed-duration record/playback cycling.
//!
//! ## State Transitions (evaluated lazily on each ingest):
//! - Accumulating, phase not elapsed → store the chunk
//! - Accumulating, phase elapsed → Holding, fire (chunk not stored)
//! - Holding, phase not elapsed → drop the chunk
//! - Holding, phase elapsed → Accumulating, clear stored audio (chunk not stored)
//!
//! There is no background timer: an idle engine stays in its phase until the
//! next chunk arrives, and one ingest flips at most one phase no matter how
//! long the gap was.

use super::{BroadcastPayload, Decision, TriggerStrategy};
use crate::audio::{Accumulator, AudioChunk};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Holding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Accumulating => "accumulating",
            Phase::Holding => "holding",
        }
    }
}

pub struct CyclicTrigger {
    phase: Phase,
    phase_start: Instant,
    accumulate: Duration,
    hold: Duration,
    accumulator: Accumulator,
}

impl CyclicTrigger {
    /// Start a cycle in the accumulating phase at `now`.
    pub fn new(accumulate: Duration, hold: Duration, now: Instant) -> Self {
        Self {
            phase: Phase::Accumulating,
            phase_start: now,
            accumulate,
            hold,
            accumulator: Accumulator::unbounded(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase, now: Instant) {
        self.phase = phase;
        self.phase_start = now;
    }
}

impl TriggerStrategy for CyclicTrigger {
    fn name(&self) -> &'static str {
        "cyclic"
    }

    fn ingest(&mut self, chunk: AudioChunk, now: Instant) -> Decision {
        let elapsed = now.saturating_duration_since(self.phase_start);

        match self.phase {
            Phase::Accumulating if elapsed < self.accumulate => {
                self.accumulator.push(chunk);
                Decision {
                    stored: true,
                    fire: false,
                }
            }
            Phase::Accumulating => {
                self.enter(Phase::Holding, now);
                info!(
                    stored_chunks = self.accumulator.len(),
                    stored_bytes = self.accumulator.total_bytes(),
                    "Record phase ended, switching to playback"
                );
                Decision {
                    stored: false,
                    fire: true,
                }
            }
            Phase::Holding if elapsed < self.hold => {
                debug!("Holding, chunk of {} bytes not recorded", chunk.len());
                Decision::default()
            }
            Phase::Holding => {
                self.enter(Phase::Accumulating, now);
                self.accumulator.clear();
                info!("Playback phase ended, switching to recording");
                Decision::default()
            }
        }
    }

    fn drain_for_broadcast(&mut self) -> Option<BroadcastPayload> {
        if self.accumulator.is_empty() {
            return None;
        }
        Some(BroadcastPayload::Playback(self.accumulator.drain_all()))
    }

    fn stored_chunks(&self) -> usize {
        self.accumulator.len()
    }

    fn phase_name(&self) -> Option<&'static str> {
        Some(self.phase().as_str())
    }

    fn reset(&mut self, now: Instant) {
        self.enter(Phase::Accumulating, now);
        self.accumulator.clear();
        info!(phase = self.phase.as_str(), "Record/playback cycle reset");
    }
}
