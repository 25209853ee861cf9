//! Cadence Common Library
//!
//! Shared types for all Cadence workspace crates: the control phase signal,
//! the hardware boundary, the clock abstraction and configuration loading.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading trait and shared config types
//! - [`hal`] - Hardware boundary traits (`MotorController`, `Solenoid`) and `HalError`
//! - [`phase`] - Control phase delivered to every subsystem on mode change
//! - [`time`] - Millisecond clock abstraction (monotonic and manual)
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use cadence_common::prelude::*;
//!
//! let clock = ManualClock::new();
//! clock.advance(5);
//! assert_eq!(clock.now_ms(), 5);
//! assert_eq!(ControlPhase::from_u8(2), Some(ControlPhase::Teleop));
//! ```

pub mod config;
pub mod hal;
pub mod phase;
pub mod prelude;
pub mod time;
