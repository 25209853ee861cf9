//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use cadence_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use cadence_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Control Phase ──────────────────────────────────────────────────
pub use crate::phase::ControlPhase;

// ─── Hardware Boundary ──────────────────────────────────────────────
pub use crate::hal::{ControlMode, HalError, MotorController, Solenoid, SolenoidState};

// ─── Time ───────────────────────────────────────────────────────────
pub use crate::time::{Clock, ManualClock, MonotonicClock};

/// Default scheduler base period in milliseconds.
pub const DEFAULT_BASE_PERIOD_MS: u64 = 5;
