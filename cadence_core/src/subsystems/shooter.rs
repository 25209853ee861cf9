//! Flywheel shooter with an adjustable hood.
//!
//! # States
//!
//! | State        | Flywheel                 | Hood                          | Period  |
//! |--------------|--------------------------|-------------------------------|---------|
//! | `Disabling`  | 0 %                      | 0 % (limp)                    | dormant |
//! | `HomingHood` | 0 %                      | position toward `home_target` | active  |
//! | `Holding`    | 0 %                      | position `min_hood`           | dormant |
//! | `Shooting`   | `rpm / full_scale_rpm` % | position from distance        | active  |
//!
//! `Hold` and `Shoot` requests made while the hood is not homed go through
//! `HomingHood` first. An explicit `HomeHood` re-homes and then settles in
//! `Holding`.

pub mod homing;

use self::homing::{HomingRecord, HomingTick};
use crate::config::ShooterConfig;
use crate::error::SubsystemFault;
use crate::subsystem::{StateCore, StateMachine, Subsystem, run_state_machine};
use cadence_common::hal::{ControlMode, MotorController};
use cadence_common::phase::ControlPhase;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

/// Internal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShooterState {
    Disabling,
    HomingHood,
    Holding,
    Shooting,
}

/// Requested intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShooterWanted {
    Disable,
    HomeHood,
    Hold,
    Shoot,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShooterInputs {
    hood_raw: f64,
    hood_stator: f64,
    /// [ticks / 100 ms]
    flywheel_velocity: f64,
    flywheel_stator: f64,
}

#[derive(Debug, Clone, Copy)]
struct ShooterOutputs {
    flywheel_mode: ControlMode,
    flywheel_demand: f64,
    hood_mode: ControlMode,
    hood_demand: f64,
}

impl ShooterOutputs {
    const SAFE: Self = Self {
        flywheel_mode: ControlMode::PercentOutput,
        flywheel_demand: 0.0,
        hood_mode: ControlMode::PercentOutput,
        hood_demand: 0.0,
    };
}

/// Shooter subsystem.
pub struct Shooter {
    core: StateCore<ShooterState, ShooterWanted>,
    config: ShooterConfig,
    flywheel: Box<dyn MotorController>,
    hood: Box<dyn MotorController>,
    inputs: ShooterInputs,
    outputs: ShooterOutputs,
    homing: HomingRecord,
    target_distance: f64,
}

impl Shooter {
    pub const NAME: &'static str = "Shooter";

    pub fn new(
        config: ShooterConfig,
        flywheel: impl MotorController + 'static,
        hood: impl MotorController + 'static,
    ) -> Self {
        let target_distance = config.min_distance;
        Self {
            core: StateCore::new(Self::NAME, ShooterState::Disabling, ShooterWanted::Disable),
            config,
            flywheel: Box::new(flywheel),
            hood: Box::new(hood),
            inputs: ShooterInputs::default(),
            outputs: ShooterOutputs::SAFE,
            homing: HomingRecord::new(),
            target_distance,
        }
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn current_state(&self) -> ShooterState {
        self.core.current()
    }

    pub fn wanted_state(&self) -> ShooterWanted {
        self.core.wanted()
    }

    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homing.is_homed()
    }

    /// Hood position relative to home [ticks].
    pub fn hood_position(&self) -> f64 {
        self.homing.corrected(self.inputs.hood_raw)
    }

    /// Flywheel speed [rpm].
    pub fn flywheel_speed(&self) -> f64 {
        self.inputs.flywheel_velocity * 600.0 / self.config.ticks_per_rev
    }

    pub fn target_distance(&self) -> f64 {
        self.target_distance
    }

    /// Flywheel speed for a shot from `distance` metres [rpm].
    pub fn distance_to_speed(&self, distance: f64) -> f64 {
        let c = &self.config;
        interpolate(distance, c.min_distance, c.max_distance, c.min_speed_rpm, c.max_speed_rpm)
    }

    /// Hood position for a shot from `distance` metres [ticks above home].
    pub fn distance_to_hood(&self, distance: f64) -> f64 {
        let c = &self.config;
        interpolate(distance, c.min_distance, c.max_distance, c.min_hood, c.max_hood)
    }

    /// `true` only while shooting with flywheel and hood inside tolerance.
    pub fn ready_to_shoot(&self) -> bool {
        if self.core.current() != ShooterState::Shooting || !self.homing.is_homed() {
            return false;
        }
        let speed_error = (self.flywheel_speed() - self.distance_to_speed(self.target_distance)).abs();
        let hood_error = (self.hood_position() - self.distance_to_hood(self.target_distance)).abs();
        speed_error <= self.config.speed_tolerance_rpm && hood_error <= self.config.hood_tolerance
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Set the shot distance [m]. Clamped to the configured range when used.
    pub fn set_target_distance(&mut self, distance: f64) {
        if !distance.is_finite() {
            warn!(distance, "Ignoring non-finite shooter target distance");
            return;
        }
        debug!(distance, "Shooter target distance set");
        self.target_distance = distance;
    }

    // ─── Handlers ───────────────────────────────────────────────────

    fn handle_disabling(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.config.dormant_period_ms);
        }
        self.outputs = ShooterOutputs::SAFE;
    }

    fn handle_homing(&mut self, now_ms: u64) {
        if self.core.state_changed() {
            self.core.set_period(self.config.active_period_ms);
            self.homing.begin(now_ms, self.inputs.hood_raw, &self.config);
            info!(raw = self.inputs.hood_raw, "Homing shooter hood");
        }
        self.outputs = ShooterOutputs {
            flywheel_mode: ControlMode::PercentOutput,
            flywheel_demand: 0.0,
            hood_mode: ControlMode::Position,
            hood_demand: self.config.home_target,
        };

        if let HomingTick::Homed { offset } =
            self.homing.update(now_ms, self.inputs.hood_raw, &self.config)
        {
            info!(offset, "Shooter hood homed");
            if self.core.wanted() == ShooterWanted::HomeHood {
                self.core.redirect(ShooterWanted::Hold);
            }
        }
    }

    fn handle_holding(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.config.dormant_period_ms);
        }
        self.outputs = ShooterOutputs {
            flywheel_mode: ControlMode::PercentOutput,
            flywheel_demand: 0.0,
            hood_mode: ControlMode::Position,
            hood_demand: self.homing.raw(self.config.min_hood),
        };
    }

    fn handle_shooting(&mut self) -> Result<(), SubsystemFault> {
        if !self.homing.is_homed() {
            return Err(SubsystemFault::Invariant(
                "shooting with an unhomed hood".to_string(),
            ));
        }
        if self.core.state_changed() {
            self.core.set_period(self.config.active_period_ms);
        }
        let rpm = self.distance_to_speed(self.target_distance);
        let hood = self.distance_to_hood(self.target_distance);
        self.outputs = ShooterOutputs {
            flywheel_mode: ControlMode::PercentOutput,
            flywheel_demand: rpm / self.config.full_scale_rpm,
            hood_mode: ControlMode::Position,
            hood_demand: self.homing.raw(hood),
        };
        Ok(())
    }
}

/// Linear map of `x` from `[x0, x1]` onto `[y0, y1]`, `x` clamped to the range.
fn interpolate(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let x = x.clamp(x0, x1);
    y0 + (y1 - y0) / (x1 - x0) * (x - x0)
}

impl StateMachine for Shooter {
    type State = ShooterState;
    type Wanted = ShooterWanted;

    fn core(&self) -> &StateCore<ShooterState, ShooterWanted> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StateCore<ShooterState, ShooterWanted> {
        &mut self.core
    }

    fn target_state(&self, wanted: ShooterWanted) -> ShooterState {
        match wanted {
            ShooterWanted::Disable => ShooterState::Disabling,
            ShooterWanted::HomeHood => ShooterState::HomingHood,
            ShooterWanted::Hold if self.homing.is_homed() => ShooterState::Holding,
            ShooterWanted::Shoot if self.homing.is_homed() => ShooterState::Shooting,
            ShooterWanted::Hold | ShooterWanted::Shoot => ShooterState::HomingHood,
        }
    }

    fn handle_state(&mut self, state: ShooterState, now_ms: u64) -> Result<(), SubsystemFault> {
        match state {
            ShooterState::Disabling => self.handle_disabling(),
            ShooterState::HomingHood => self.handle_homing(now_ms),
            ShooterState::Holding => self.handle_holding(),
            ShooterState::Shooting => self.handle_shooting()?,
        }
        Ok(())
    }
}

impl Subsystem for Shooter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&mut self, phase: ControlPhase) {
        let wanted = match phase {
            ControlPhase::Teleop | ControlPhase::Autonomous => ShooterWanted::Hold,
            ControlPhase::Disabled | ControlPhase::Test => ShooterWanted::Disable,
        };
        self.homing.reset();
        self.core.reset(ShooterState::Disabling, wanted);
        self.core.set_period(self.config.active_period_ms);
        self.stop();
        info!(%phase, ?wanted, "Shooter started");
    }

    fn read_periodic(&mut self) {
        match self.hood.position() {
            Ok(p) => self.inputs.hood_raw = p,
            Err(e) => warn!(subsystem = Self::NAME, "hood position read failed: {e}"),
        }
        match self.hood.stator_current() {
            Ok(a) => self.inputs.hood_stator = a,
            Err(e) => warn!(subsystem = Self::NAME, "hood current read failed: {e}"),
        }
        match self.flywheel.velocity() {
            Ok(v) => self.inputs.flywheel_velocity = v,
            Err(e) => warn!(subsystem = Self::NAME, "flywheel velocity read failed: {e}"),
        }
        match self.flywheel.stator_current() {
            Ok(a) => self.inputs.flywheel_stator = a,
            Err(e) => warn!(subsystem = Self::NAME, "flywheel current read failed: {e}"),
        }
    }

    fn on_loop(&mut self, now_ms: u64) -> Result<(), SubsystemFault> {
        run_state_machine(self, now_ms)
    }

    fn write_periodic(&mut self) {
        let out = self.outputs;
        if let Err(e) = self.flywheel.set(out.flywheel_mode, out.flywheel_demand) {
            warn!(subsystem = Self::NAME, "flywheel write failed: {e}");
        }
        if let Err(e) = self.hood.set(out.hood_mode, out.hood_demand) {
            warn!(subsystem = Self::NAME, "hood write failed: {e}");
        }
    }

    fn stop(&mut self) {
        self.outputs = ShooterOutputs::SAFE;
        self.write_periodic();
    }

    fn when_run_again(&self) -> u64 {
        self.core.period_ms()
    }

    fn log_headers(&self) -> String {
        [
            "systemState",
            "wantedState",
            "homed",
            "hoodPosition",
            "hoodDemand",
            "hoodStator",
            "flywheelRpm",
            "flywheelDemand",
            "flywheelStator",
            "targetDistance",
            "readyToShoot",
        ]
        .iter()
        .map(|field| format!("{}.{field}", Self::NAME))
        .collect::<Vec<_>>()
        .join(",")
    }

    fn log_values(&self) -> String {
        format!(
            "{:?},{:?},{},{:.1},{:.1},{:.2},{:.0},{:.3},{:.2},{:.2},{}",
            self.core.current(),
            self.core.wanted(),
            self.homing.is_homed(),
            self.hood_position(),
            self.outputs.hood_demand,
            self.inputs.hood_stator,
            self.flywheel_speed(),
            self.outputs.flywheel_demand,
            self.inputs.flywheel_stator,
            self.target_distance,
            self.ready_to_shoot(),
        )
    }

    fn wake_flag(&self) -> Arc<AtomicBool> {
        self.core.wake_flag()
    }

    fn output_telemetry(&self) {
        debug!(
            subsystem = Self::NAME,
            state = ?self.core.current(),
            homed = self.homing.is_homed(),
            hood = self.hood_position(),
            rpm = self.flywheel_speed(),
            ready = self.ready_to_shoot(),
            "telemetry"
        );
    }
}
