//! Broadcast throttling.
//!
//! The guard is an expiring token rather than a timer: it remembers when the
//! last broadcast fired and compares against the cooldown on the next attempt.
//! Nothing is scheduled, so nothing can outlive the relay or leave the guard
//! stuck in the "busy" state.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReentrancyGuard {
    cooldown: Duration,
    last_fire: Option<Instant>,
}

impl ReentrancyGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fire: None,
        }
    }

    /// Claim the guard for a broadcast at `now`.
    ///
    /// Returns `false` (and leaves the guard untouched) while a previous
    /// claim's cooldown is still running. A rejected attempt is dropped by the
    /// caller, not queued.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.is_active(now) {
            return false;
        }
        self.last_fire = Some(now);
        true
    }

    /// Whether a cooldown is running at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        match self.last_fire {
            Some(fired) => now.saturating_duration_since(fired) < self.cooldown,
            None => false,
        }
    }

    pub fn release(&mut self) {
        self.last_fire = None;
    }

    /// Time left before the guard can be claimed again.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_fire {
            Some(fired) => self.cooldown.saturating_sub(now.saturating_duration_since(fired)),
            None => Duration::ZERO,
        }
    }
}
