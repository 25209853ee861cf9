//! Complete simulated robot: shooter flywheel and hood, collector roller and
//! collector deploy valve.

use super::motor::{MotorProbe, SimMotor, SimMotorParams};
use super::solenoid::{SimSolenoid, SolenoidProbe};
use cadence_common::time::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Device parameters for every simulated mechanism.
///
/// # TOML Example
///
/// ```toml
/// [simulation.hood]
/// max_velocity = 400.0
/// min_position = -1500.0
/// initial_position = 2500.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Shooter flywheel. Free speed matches 6000 rpm on a 2048-tick encoder.
    pub flywheel: SimMotorParams,
    /// Shooter hood, travelling between two hard stops.
    pub hood: SimMotorParams,
    /// Collector roller. Forward output counts the encoder down.
    pub collector: SimMotorParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            flywheel: SimMotorParams {
                max_velocity: 20_480.0,
                time_constant_ms: 150.0,
                stall_current: 120.0,
                ..Default::default()
            },
            hood: SimMotorParams {
                max_velocity: 400.0,
                time_constant_ms: 20.0,
                position_gain: 0.5,
                min_position: Some(-1500.0),
                max_position: Some(6000.0),
                stall_current: 30.0,
                free_current: 0.5,
                inverted: false,
                initial_position: 2500.0,
            },
            collector: SimMotorParams {
                max_velocity: 2000.0,
                time_constant_ms: 30.0,
                inverted: true,
                ..Default::default()
            },
        }
    }
}

/// Probes onto every device of a [`SimRig`].
#[derive(Clone)]
pub struct RigProbes {
    /// Shooter flywheel.
    pub flywheel: MotorProbe,
    /// Shooter hood.
    pub hood: MotorProbe,
    /// Collector roller.
    pub collector_motor: MotorProbe,
    /// Collector deploy valve.
    pub collector_solenoid: SolenoidProbe,
}

/// Every simulated device, ready to be moved into the subsystems.
pub struct SimRig {
    /// Shooter flywheel.
    pub flywheel: SimMotor,
    /// Shooter hood.
    pub hood: SimMotor,
    /// Collector roller.
    pub collector_motor: SimMotor,
    /// Collector deploy valve.
    pub collector_solenoid: SimSolenoid,
}

impl SimRig {
    /// Build every device against `clock`.
    pub fn new(config: &SimulationConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Building simulated rig");
        Self {
            flywheel: SimMotor::new("shooter.flywheel", config.flywheel, Arc::clone(&clock)),
            hood: SimMotor::new("shooter.hood", config.hood, Arc::clone(&clock)),
            collector_motor: SimMotor::new("collector.roller", config.collector, clock),
            collector_solenoid: SimSolenoid::new("collector.deploy"),
        }
    }

    /// Observers for every device. Take them before moving the devices out.
    pub fn probes(&self) -> RigProbes {
        RigProbes {
            flywheel: self.flywheel.probe(),
            hood: self.hood.probe(),
            collector_motor: self.collector_motor.probe(),
            collector_solenoid: self.collector_solenoid.probe(),
        }
    }
}
