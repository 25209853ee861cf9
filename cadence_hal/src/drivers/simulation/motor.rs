//! Motor controller simulator.
//!
//! `SimMotor` models one motor channel with an encoder:
//! - PercentOutput: open loop, steady-state velocity `demand * max_velocity`
//! - Velocity: closed loop on the velocity target
//! - Position: proportional closed loop on the position target
//!
//! Velocity follows the commanded velocity through a first-order lag, the
//! position integrates the velocity, and optional hard stops clamp the travel
//! and kill the velocity on contact. Physics is integrated in 1 ms steps up to
//! the current clock reading whenever the device is touched.

use cadence_common::hal::{ControlMode, HalError, MotorController};
use cadence_common::time::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Milliseconds per velocity unit (velocities are ticks per 100 ms).
const VELOCITY_WINDOW_MS: f64 = 100.0;

/// Velocity below which a motor counts as stationary [ticks / 100 ms].
const STANDSTILL_VELOCITY: f64 = 1e-3;

/// Physical parameters of a simulated motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimMotorParams {
    /// Free speed at full output [ticks / 100 ms].
    pub max_velocity: f64,
    /// First-order velocity response time constant [ms].
    pub time_constant_ms: f64,
    /// Position-loop gain [(ticks / 100 ms) per tick of error].
    pub position_gain: f64,
    /// Lower hard stop [raw ticks], if any.
    pub min_position: Option<f64>,
    /// Upper hard stop [raw ticks], if any.
    pub max_position: Option<f64>,
    /// Current drawn at stall with full output [A].
    pub stall_current: f64,
    /// Current drawn while spinning freely [A].
    pub free_current: f64,
    /// Positive output counts the encoder down.
    pub inverted: bool,
    /// Encoder reading at power-up [raw ticks].
    pub initial_position: f64,
}

impl Default for SimMotorParams {
    fn default() -> Self {
        Self {
            max_velocity: 2000.0,
            time_constant_ms: 40.0,
            position_gain: 0.5,
            min_position: None,
            max_position: None,
            stall_current: 60.0,
            free_current: 1.5,
            inverted: false,
            initial_position: 0.0,
        }
    }
}

/// Device state shared between a `SimMotor` and its probes.
#[derive(Debug)]
struct MotorState {
    params: SimMotorParams,
    mode: ControlMode,
    demand: f64,
    /// Physical position [ticks], hard stops apply here.
    position: f64,
    velocity: f64,
    /// Commanded velocity of the last integration step.
    command_velocity: f64,
    /// Encoder reading minus physical position.
    sensor_offset: f64,
    last_update_ms: Option<u64>,
    jammed: bool,
    at_stop: bool,
    fault: Option<HalError>,
    set_count: u64,
    sensor_writes: u64,
}

impl MotorState {
    fn new(params: SimMotorParams) -> Self {
        Self {
            params,
            mode: ControlMode::PercentOutput,
            demand: 0.0,
            position: params.initial_position,
            velocity: 0.0,
            command_velocity: 0.0,
            sensor_offset: 0.0,
            last_update_ms: None,
            jammed: false,
            at_stop: false,
            fault: None,
            set_count: 0,
            sensor_writes: 0,
        }
    }

    /// Integrate physics up to `now_ms`.
    fn advance(&mut self, now_ms: u64, name: &str) {
        let Some(last) = self.last_update_ms else {
            self.last_update_ms = Some(now_ms);
            return;
        };
        if now_ms <= last {
            return;
        }
        for _ in last..now_ms {
            self.step_1ms(name);
        }
        self.last_update_ms = Some(now_ms);
    }

    fn target_velocity(&self) -> f64 {
        let p = &self.params;
        let sign = if p.inverted { -1.0 } else { 1.0 };
        let raw = match self.mode {
            ControlMode::PercentOutput => sign * self.demand.clamp(-1.0, 1.0) * p.max_velocity,
            ControlMode::Velocity => sign * self.demand,
            // Position targets are encoder readings.
            ControlMode::Position => {
                p.position_gain * (self.demand - self.sensor_offset - self.position)
            }
        };
        raw.clamp(-p.max_velocity, p.max_velocity)
    }

    fn step_1ms(&mut self, name: &str) {
        let p = self.params;
        self.command_velocity = self.target_velocity();

        if self.jammed {
            self.velocity = 0.0;
            return;
        }

        let alpha = if p.time_constant_ms <= 1.0 {
            1.0
        } else {
            1.0 / p.time_constant_ms
        };
        self.velocity += (self.command_velocity - self.velocity) * alpha;
        self.position += self.velocity / VELOCITY_WINDOW_MS;

        let mut contact = false;
        if let Some(min) = p.min_position.filter(|&min| self.position <= min) {
            self.position = min;
            if self.velocity < 0.0 {
                self.velocity = 0.0;
            }
            contact = true;
        }
        if let Some(max) = p.max_position.filter(|&max| self.position >= max) {
            self.position = max;
            if self.velocity > 0.0 {
                self.velocity = 0.0;
            }
            contact = true;
        }
        if contact != self.at_stop {
            debug!(motor = name, position = self.position, contact, "hard stop contact changed");
            self.at_stop = contact;
        }
    }

    fn reading(&self) -> f64 {
        self.position + self.sensor_offset
    }

    fn stator_current(&self) -> f64 {
        let p = &self.params;
        if p.max_velocity <= 0.0 {
            return 0.0;
        }
        let command = self.command_velocity / p.max_velocity;
        let actual = self.velocity / p.max_velocity;
        if command.abs() < STANDSTILL_VELOCITY && actual.abs() < STANDSTILL_VELOCITY {
            return 0.0;
        }
        p.free_current + p.stall_current * (command - actual).abs().min(1.0)
    }

    fn check_fault(&self) -> Result<(), HalError> {
        match &self.fault {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Simulated motor controller.
///
/// Cloning is not offered; use [`SimMotor::probe`] for an observer.
pub struct SimMotor {
    name: String,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<MotorState>>,
}

impl SimMotor {
    /// Create a motor at rest at `params.initial_position`.
    pub fn new(name: impl Into<String>, params: SimMotorParams, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        let mut state = MotorState::new(params);
        state.advance(clock.now_ms(), &name);
        Self {
            name,
            clock,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Observer sharing this motor's state.
    pub fn probe(&self) -> MotorProbe {
        MotorProbe {
            name: self.name.clone(),
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&self.state),
        }
    }

    /// Device name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MotorState) -> R) -> R {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.advance(now, &self.name);
        f(&mut state)
    }
}

impl MotorController for SimMotor {
    fn set(&mut self, mode: ControlMode, demand: f64) -> Result<(), HalError> {
        if !demand.is_finite() {
            return Err(HalError::Configuration(format!(
                "{}: non-finite demand {demand}",
                self.name
            )));
        }
        self.with_state(|s| {
            s.check_fault()?;
            trace!(motor = %self.name, ?mode, demand, "set");
            s.mode = mode;
            s.demand = demand;
            s.set_count += 1;
            Ok(())
        })
    }

    fn position(&mut self) -> Result<f64, HalError> {
        self.with_state(|s| s.check_fault().map(|_| s.reading()))
    }

    fn velocity(&mut self) -> Result<f64, HalError> {
        self.with_state(|s| s.check_fault().map(|_| s.velocity))
    }

    fn stator_current(&mut self) -> Result<f64, HalError> {
        self.with_state(|s| s.check_fault().map(|_| s.stator_current()))
    }

    fn set_sensor_position(&mut self, ticks: f64) -> Result<(), HalError> {
        self.with_state(|s| {
            s.check_fault()?;
            s.sensor_offset = ticks - s.position;
            s.sensor_writes += 1;
            Ok(())
        })
    }
}

/// Test and diagnostics handle onto a [`SimMotor`].
#[derive(Clone)]
pub struct MotorProbe {
    name: String,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<MotorState>>,
}

impl MotorProbe {
    fn with_state<R>(&self, f: impl FnOnce(&mut MotorState) -> R) -> R {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.advance(now, &self.name);
        f(&mut state)
    }

    /// Last commanded mode and demand.
    pub fn last_command(&self) -> (ControlMode, f64) {
        let state = self.state.lock();
        (state.mode, state.demand)
    }

    /// Encoder reading at the current clock time [raw ticks].
    pub fn position(&self) -> f64 {
        self.with_state(|s| s.reading())
    }

    /// Velocity at the current clock time [ticks / 100 ms].
    pub fn velocity(&self) -> f64 {
        self.with_state(|s| s.velocity)
    }

    /// Number of accepted `set` calls.
    pub fn set_count(&self) -> u64 {
        self.state.lock().set_count
    }

    /// Number of `set_sensor_position` calls.
    pub fn sensor_writes(&self) -> u64 {
        self.state.lock().sensor_writes
    }

    /// Whether the mechanism is resting on a hard stop.
    pub fn at_hard_stop(&self) -> bool {
        self.with_state(|s| s.at_stop)
    }

    /// Block (or free) the mechanism. A jammed motor does not move.
    pub fn set_jammed(&self, jammed: bool) {
        self.with_state(|s| {
            debug!(motor = %self.name, jammed, "jam injected");
            s.jammed = jammed;
        });
    }

    /// Make every device call fail with `fault` until cleared with `None`.
    pub fn inject_fault(&self, fault: Option<HalError>) {
        self.with_state(|s| {
            debug!(motor = %self.name, ?fault, "fault injected");
            s.fault = fault;
        });
    }

    /// Move the mechanism to `position` physical ticks, at rest.
    pub fn teleport(&self, position: f64) {
        self.with_state(|s| {
            s.position = position;
            s.velocity = 0.0;
        });
    }
}
