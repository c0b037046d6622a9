//! Per-worker single-flight guard.
//!
//! Idle → InFlight on `try_begin`, InFlight → CoolingDown on `finish`,
//! CoolingDown → Idle once the cooldown has elapsed. Time is passed in so the
//! worker loop and tests drive it with the same clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InFlight,
    CoolingDown { until: Instant },
}

impl Phase {
    pub fn is_busy(&self, now: Instant) -> bool {
        match *self {
            Phase::Idle => false,
            Phase::InFlight => true,
            Phase::CoolingDown { until } => now < until,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionState {
    phase: Phase,
    cooldown: Duration,
    attempts: u64,
}

impl ExecutionState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            cooldown,
            attempts: 0,
        }
    }

    pub fn is_busy(&self, now: Instant) -> bool {
        self.phase.is_busy(now)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Claim the slot. False if an attempt is running or cooling down.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if self.is_busy(now) {
            return false;
        }
        self.phase = Phase::InFlight;
        self.attempts += 1;
        true
    }

    /// Mark the running attempt done; the slot frees after the cooldown.
    pub fn finish(&mut self, now: Instant) {
        if self.phase == Phase::InFlight {
            self.phase = Phase::CoolingDown {
                until: now + self.cooldown,
            };
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}
