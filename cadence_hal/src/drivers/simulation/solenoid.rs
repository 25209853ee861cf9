//! Two-position actuator simulator.
//!
//! The solenoid follows its command instantly. Every accepted write is
//! counted so callers can verify that outputs are only pushed on change.

use cadence_common::hal::{HalError, Solenoid, SolenoidState};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct SolenoidInner {
    state: SolenoidState,
    writes: u64,
    fault: Option<HalError>,
}

/// Simulated solenoid valve.
pub struct SimSolenoid {
    name: String,
    inner: Arc<Mutex<SolenoidInner>>,
}

impl SimSolenoid {
    /// Create a retracted solenoid.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(SolenoidInner::default())),
        }
    }

    /// Observer sharing this solenoid's state.
    pub fn probe(&self) -> SolenoidProbe {
        SolenoidProbe {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Solenoid for SimSolenoid {
    fn set_state(&mut self, state: SolenoidState) -> Result<(), HalError> {
        let mut inner = self.inner.lock();
        if let Some(e) = &inner.fault {
            return Err(e.clone());
        }
        trace!(solenoid = %self.name, ?state, "set_state");
        inner.state = state;
        inner.writes += 1;
        Ok(())
    }
}

/// Test and diagnostics handle onto a [`SimSolenoid`].
#[derive(Clone)]
pub struct SolenoidProbe {
    name: String,
    inner: Arc<Mutex<SolenoidInner>>,
}

impl SolenoidProbe {
    /// Current actuator position.
    pub fn state(&self) -> SolenoidState {
        self.inner.lock().state
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Make every write fail with `fault` until cleared with `None`.
    pub fn inject_fault(&self, fault: Option<HalError>) {
        debug!(solenoid = %self.name, ?fault, "fault injected");
        self.inner.lock().fault = fault;
    }
}
