//! Error types for the control core.
//!
//! Two levels:
//! - [`SubsystemFault`] - raised by one subsystem's decide step
//! - [`DispatchError`] - what the manager hands to the looper; always fatal
//!   to the looper

use cadence_common::hal::HalError;
use thiserror::Error;

/// Fault raised inside a subsystem's decide step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubsystemFault {
    /// State handler reached a state it has no rule for.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Hardware failure the subsystem cannot work around.
    #[error("hardware fault: {0}")]
    Hardware(#[from] HalError),

    /// Internal bookkeeping is inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Failure of a manager dispatch or lifecycle call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// A subsystem's decide step returned a fault.
    #[error("subsystem '{subsystem}' faulted: {source}")]
    Fault {
        /// Subsystem name.
        subsystem: String,
        /// Underlying fault.
        source: SubsystemFault,
    },

    /// A subsystem panicked during dispatch.
    #[error("subsystem '{subsystem}' panicked: {message}")]
    Panicked {
        /// Subsystem name.
        subsystem: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// `dispatch`/`on_start` called before `initialize`.
    #[error("subsystem manager used before initialize")]
    NotInitialized,

    /// `initialize` called twice.
    #[error("subsystem manager already initialized")]
    AlreadyInitialized,
}

impl DispatchError {
    /// Name of the subsystem at fault, if any.
    pub fn subsystem(&self) -> Option<&str> {
        match self {
            Self::Fault { subsystem, .. } | Self::Panicked { subsystem, .. } => Some(subsystem),
            Self::NotInitialized | Self::AlreadyInitialized => None,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
