//! Hard-stop homing of the shooter hood.
//!
//! The hood is driven in closed-loop position toward a raw target far past
//! its lower hard stop. Once the reading stops moving for the dwell time the
//! hood is declared homed and the raw reading becomes the offset subtracted
//! from every later reading. The encoder itself is never re-zeroed.
//!
//! ## Lifecycle
//!
//! 1. `begin()` on entry to HOMING_HOOD arms the dwell deadline
//! 2. Each tick: `update()` pushes the deadline out while the hood moves
//! 3. First tick at or past the deadline: `Homed { offset }`, once

use crate::config::ShooterConfig;
use crate::latch::ChangeLatch;

// ─── Homing Result ──────────────────────────────────────────────────

/// Result of one homing tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingTick {
    /// Still moving, or stationary for less than the dwell.
    InProgress,
    /// Homed on this tick. `offset` is the raw reading at the stop.
    Homed {
        offset: f64,
    },
}

// ─── Homing Record ──────────────────────────────────────────────────

/// Homing bookkeeping for one hood.
#[derive(Debug, Clone, Default)]
pub struct HomingRecord {
    homed: bool,
    offset: f64,
    last_position: Option<f64>,
    deadline_ms: u64,
    timeout_latch: ChangeLatch,
}

impl HomingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to "not homed". The offset is kept until the next home.
    pub fn reset(&mut self) {
        self.homed = false;
        self.last_position = None;
        self.deadline_ms = 0;
        self.timeout_latch.reset();
    }

    /// Arm a new homing attempt at `now_ms`.
    pub fn begin(&mut self, now_ms: u64, raw_position: f64, config: &ShooterConfig) {
        self.reset();
        self.last_position = Some(raw_position);
        self.deadline_ms = now_ms + config.home_dwell_ms;
    }

    /// Feed one raw reading.
    pub fn update(&mut self, now_ms: u64, raw_position: f64, config: &ShooterConfig) -> HomingTick {
        if self.homed {
            return HomingTick::InProgress;
        }
        let moved = self
            .last_position
            .map_or(true, |last| (raw_position - last).abs() > config.home_movement_threshold);
        self.last_position = Some(raw_position);
        if moved {
            self.deadline_ms = now_ms + config.home_dwell_ms;
        }

        if self.timeout_latch.update(now_ms >= self.deadline_ms) {
            self.homed = true;
            self.offset = raw_position;
            return HomingTick::Homed {
                offset: raw_position,
            };
        }
        HomingTick::InProgress
    }

    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Raw reading at the last home.
    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Raw reading expressed relative to the home position.
    #[inline]
    pub fn corrected(&self, raw_position: f64) -> f64 {
        raw_position - self.offset
    }

    /// Raw demand for a position relative to home.
    #[inline]
    pub fn raw(&self, corrected_position: f64) -> f64 {
        corrected_position + self.offset
    }
}
