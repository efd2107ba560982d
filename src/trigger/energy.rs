//! Silence-after-activity detection over a sliding window of volume samples.

use super::{BroadcastPayload, Decision, TriggerStrategy};
use crate::audio::{Accumulator, AudioChunk, SlidingWindow};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fires once when the window mean has stayed at or below `threshold` for at
/// least `silence` since the last time it was strictly above it.
///
/// No decision is made until the window has filled. A strategy that has never
/// seen activity never fires: there is nothing to follow.
pub struct EnergyTrigger {
    window: SlidingWindow,
    threshold: f32,
    silence: Duration,
    accumulator: Accumulator,
    last_activity: Option<Instant>,
    fired_since_activity: bool,
}

impl EnergyTrigger {
    pub fn new(window_size: usize, threshold: f32, silence: Duration, max_stored: usize) -> Self {
        Self {
            window: SlidingWindow::new(window_size),
            threshold,
            silence,
            accumulator: Accumulator::bounded(max_stored),
            last_activity: None,
            fired_since_activity: false,
        }
    }

    #[cfg(test)]
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}

impl TriggerStrategy for EnergyTrigger {
    fn name(&self) -> &'static str {
        "energy_gated"
    }

    fn ingest(&mut self, chunk: AudioChunk, now: Instant) -> Decision {
        let volume = chunk.volume();
        self.accumulator.push(chunk);
        self.window.push(volume);

        let stored_only = Decision {
            stored: true,
            fire: false,
        };

        let Some(mean) = self.window.mean() else {
            return stored_only;
        };

        if mean > self.threshold {
            if self.last_activity.is_none() || self.fired_since_activity {
                debug!(mean, "Voice activity detected");
            }
            self.last_activity = Some(now);
            self.fired_since_activity = false;
            return stored_only;
        }

        let Some(last_activity) = self.last_activity else {
            return stored_only;
        };

        let silent_for = now.saturating_duration_since(last_activity);
        if silent_for >= self.silence && !self.fired_since_activity && !self.accumulator.is_empty() {
            self.fired_since_activity = true;
            info!(
                silent_ms = silent_for.as_millis() as u64,
                stored_chunks = self.accumulator.len(),
                "Silence after activity, triggering playback"
            );
            return Decision {
                stored: true,
                fire: true,
            };
        }

        stored_only
    }

    fn drain_for_broadcast(&mut self) -> Option<BroadcastPayload> {
        self.accumulator.take_latest().map(BroadcastPayload::Latest)
    }

    fn stored_chunks(&self) -> usize {
        self.accumulator.len()
    }

    fn relays_live(&self) -> bool {
        true
    }

    fn window_fill(&self) -> Option<usize> {
        Some(self.window.len())
    }

    fn reset(&mut self, _now: Instant) {
        self.window.clear();
        self.accumulator.clear();
        self.last_activity = None;
        self.fired_since_activity = false;
    }
}
