//! HAL driver implementations.
//!
//! This module contains all driver implementations:
//!
//! - [`simulation`] - Software simulation for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `MotorController` / `Solenoid` from `cadence_common::hal`
//! 3. Construct the devices in the composition root and hand them to the
//!    subsystems that own them

pub mod simulation;
