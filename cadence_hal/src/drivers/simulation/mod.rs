//! Simulation driver module.
//!
//! This module provides software devices for development and testing
//! without physical hardware.

mod motor;
mod rig;
mod solenoid;

pub use motor::{MotorProbe, SimMotor, SimMotorParams};
pub use rig::{RigProbes, SimRig, SimulationConfig};
pub use solenoid::{SimSolenoid, SolenoidProbe};
