//! Control phase delivered to every subsystem on a mode change.
//!
//! This is the only externally driven phase signal the control core consumes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Robot control mode.
///
/// `#[repr(u8)]` so the phase can travel through compact telemetry rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ControlPhase {
    /// Outputs held safe, mechanisms idle.
    #[default]
    Disabled = 0,
    /// Pre-programmed routine running.
    Autonomous = 1,
    /// Operator-driven.
    Teleop = 2,
    /// Manual test of individual mechanisms.
    Test = 3,
}

impl ControlPhase {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Autonomous),
            2 => Some(Self::Teleop),
            3 => Some(Self::Test),
            _ => None,
        }
    }

    /// Whether mechanisms may produce motion in this phase.
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Lowercase name, matching the serde representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Autonomous => "autonomous",
            Self::Teleop => "teleop",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for ControlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "autonomous" | "auto" => Ok(Self::Autonomous),
            "teleop" => Ok(Self::Teleop),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown control phase '{other}'")),
        }
    }
}
