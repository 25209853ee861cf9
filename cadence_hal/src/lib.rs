//! # Cadence HAL Library
//!
//! Simulated hardware behind the traits in [`cadence_common::hal`].
//!
//! # Module Structure
//!
//! - [`drivers`] - driver implementations (currently simulation only)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     cadence_hal (single crate)                   │
//! │  ┌──────────────┐   ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ Subsystem    │──►│ SimMotor /   │◄──►│ shared device state │  │
//! │  │ (core crate) │   │ SimSolenoid  │    │ (Arc<Mutex<..>>)    │  │
//! │  └──────────────┘   └──────────────┘    └──────────┬──────────┘  │
//! │                                                    │             │
//! │                                                    ▼             │
//! │                                         ┌─────────────────────┐  │
//! │                                         │ MotorProbe /        │  │
//! │                                         │ SolenoidProbe       │  │
//! │                                         └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Devices integrate their physics lazily from a shared
//! [`Clock`](cadence_common::time::Clock), so a controller stepped with a
//! `ManualClock` sees exactly reproducible motion.

#![deny(missing_docs)]

pub mod drivers;

// Re-export key types for convenience
pub use crate::drivers::simulation::{
    MotorProbe, RigProbes, SimMotor, SimMotorParams, SimRig, SimSolenoid, SimulationConfig,
    SolenoidProbe,
};
