//! Hardware boundary between the control core and the actuator drivers.
//!
//! This module defines:
//! - `MotorController` trait - one closed- or open-loop motor channel
//! - `Solenoid` trait - one two-position pneumatic actuator
//! - `ControlMode` / `SolenoidState` - demand interpretation enums
//! - `HalError` enum - error types for hardware operations
//!
//! # Timing Contracts
//!
//! | Operation | Max calls per tick | Blocking |
//! |-----------|--------------------|----------|
//! | reads (`position`, `velocity`, ...) | 1 per signal | never |
//! | `set` / `set_state` | 1 per channel | never |
//!
//! Driver failures are the driver's concern. Callers log them and keep the
//! last good snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for hardware operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Bus or device communication failed for this transaction.
    #[error("Hardware communication error: {0}")]
    Communication(String),

    /// Device rejected a configuration or demand.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Device is no longer reachable.
    #[error("Device disconnected: {0}")]
    Disconnected(String),
}

/// How a motor controller interprets its demand value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ControlMode {
    /// Demand is a fraction of bus voltage in `[-1.0, 1.0]`.
    #[default]
    PercentOutput = 0,
    /// Demand is a closed-loop target in raw encoder ticks.
    Position = 1,
    /// Demand is a closed-loop target in ticks per 100 ms.
    Velocity = 2,
}

impl ControlMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PercentOutput),
            1 => Some(Self::Position),
            2 => Some(Self::Velocity),
            _ => None,
        }
    }
}

/// Commanded position of a two-position actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SolenoidState {
    /// Actuator pulled in. Safe state for every mechanism.
    #[default]
    Retract = 0,
    /// Actuator pushed out.
    Extend = 1,
}

impl SolenoidState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Retract),
            1 => Some(Self::Extend),
            _ => None,
        }
    }

    /// `true` for [`SolenoidState::Extend`].
    #[inline]
    pub const fn is_extended(&self) -> bool {
        matches!(self, Self::Extend)
    }
}

impl From<bool> for SolenoidState {
    fn from(extended: bool) -> Self {
        if extended { Self::Extend } else { Self::Retract }
    }
}

/// Interface to one motor controller channel.
///
/// Readings are raw device units: encoder ticks for position, ticks per
/// 100 ms for velocity, amps for stator current. Subsystems apply their own
/// offsets and scaling on top.
pub trait MotorController: Send {
    /// Push a demand. `demand` is interpreted according to `mode`.
    fn set(&mut self, mode: ControlMode, demand: f64) -> Result<(), HalError>;

    /// Raw encoder position [ticks].
    fn position(&mut self) -> Result<f64, HalError>;

    /// Raw encoder velocity [ticks / 100 ms].
    fn velocity(&mut self) -> Result<f64, HalError>;

    /// Stator current [A].
    fn stator_current(&mut self) -> Result<f64, HalError>;

    /// Overwrite the encoder's reported position.
    ///
    /// Default: unsupported, the reading stays as it is.
    fn set_sensor_position(&mut self, _ticks: f64) -> Result<(), HalError> {
        Err(HalError::Configuration(
            "sensor position is not writable on this controller".to_string(),
        ))
    }
}

/// Interface to one two-position actuator.
pub trait Solenoid: Send {
    /// Command the actuator.
    fn set_state(&mut self, state: SolenoidState) -> Result<(), HalError>;
}
