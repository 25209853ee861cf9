//! Roller collector on a pneumatic deploy arm, with a motor self-test.
//!
//! ## Self-Test
//! `Assessing` retracts the arm and runs the roller forward for
//! `assess_duration_ms`, counted in loops of the active period. At expiry
//! the roller stops and the test passes when the encoder moved at least
//! `min_assess_movement` in the forward direction (forward counts down).
//! The last result stays readable after the state machine moves on.

use crate::config::CollectorConfig;
use crate::error::SubsystemFault;
use crate::latch::ChangeLatch;
use crate::subsystem::{StateCore, StateMachine, Subsystem, run_state_machine};
use cadence_common::hal::{ControlMode, MotorController, Solenoid, SolenoidState};
use cadence_common::phase::ControlPhase;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

/// Collector states. Also used as the requested intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorState {
    Assessing,
    Backing,
    Collecting,
    Feeding,
    Disabling,
    Holding,
    Manual,
}

#[derive(Debug, Clone, Copy, Default)]
struct CollectorInputs {
    position: f64,
    stator: f64,
}

#[derive(Debug, Clone, Copy)]
struct CollectorOutputs {
    motor_mode: ControlMode,
    motor_demand: f64,
    solenoid: SolenoidState,
}

impl CollectorOutputs {
    const SAFE: Self = Self {
        motor_mode: ControlMode::PercentOutput,
        motor_demand: 0.0,
        solenoid: SolenoidState::Retract,
    };
}

/// Loop countdown over a duration, rescaled when the period changes.
#[derive(Debug, Clone, Copy)]
struct Countdown {
    loops_remaining: u64,
    expiry: ChangeLatch,
}

impl Countdown {
    fn new(duration_ms: u64, period_ms: u64) -> Self {
        Self {
            loops_remaining: loops_for(duration_ms, period_ms),
            expiry: ChangeLatch::new(),
        }
    }

    /// Count one loop. Returns `true` on the loop the countdown runs out.
    fn tick(&mut self) -> bool {
        self.loops_remaining = self.loops_remaining.saturating_sub(1);
        self.expiry.update(self.loops_remaining == 0)
    }

    fn is_expired(&self) -> bool {
        self.loops_remaining == 0
    }

    fn rescale(&mut self, old_period_ms: u64, new_period_ms: u64) {
        let remaining_ms = self.loops_remaining * old_period_ms;
        self.loops_remaining = loops_for(remaining_ms, new_period_ms);
    }
}

fn loops_for(duration_ms: u64, period_ms: u64) -> u64 {
    duration_ms.div_ceil(period_ms.max(1))
}

#[derive(Debug, Clone, Copy)]
struct Assessment {
    start_position: f64,
    countdown: Countdown,
    result: Option<bool>,
}

/// Collector subsystem.
pub struct Collector {
    core: StateCore<CollectorState, CollectorState>,
    config: CollectorConfig,
    active_period_ms: u64,
    motor: Box<dyn MotorController>,
    solenoid: Box<dyn Solenoid>,
    inputs: CollectorInputs,
    outputs: CollectorOutputs,
    /// Last state the valve accepted. `None` until the first write.
    solenoid_state: Option<SolenoidState>,
    assessment: Option<Assessment>,
    last_result: Option<bool>,
    backing: Option<Countdown>,
    manual_motor_demand: f64,
    manual_solenoid: SolenoidState,
}

impl Collector {
    pub const NAME: &'static str = "Collector";

    pub fn new(
        config: CollectorConfig,
        motor: impl MotorController + 'static,
        solenoid: impl Solenoid + 'static,
    ) -> Self {
        let active_period_ms = config.active_period_ms;
        Self {
            core: StateCore::new(Self::NAME, CollectorState::Disabling, CollectorState::Disabling),
            config,
            active_period_ms,
            motor: Box::new(motor),
            solenoid: Box::new(solenoid),
            inputs: CollectorInputs::default(),
            outputs: CollectorOutputs::SAFE,
            solenoid_state: None,
            assessment: None,
            last_result: None,
            backing: None,
            manual_motor_demand: 0.0,
            manual_solenoid: SolenoidState::Retract,
        }
    }

    pub fn current_state(&self) -> CollectorState {
        self.core.current()
    }

    pub fn wanted_state(&self) -> CollectorState {
        self.core.wanted()
    }

    /// Roller encoder reading [ticks].
    pub fn motor_position(&self) -> f64 {
        self.inputs.position
    }

    // ─── Self-Test ──────────────────────────────────────────────────

    /// The self-test finished and is still the requested state.
    pub fn is_assessment_complete(&self) -> bool {
        self.core.wanted() == CollectorState::Assessing
            && self
                .assessment
                .as_ref()
                .is_some_and(|a| a.result.is_some())
    }

    /// Completion of the handler for `state`. Only `Assessing` has one.
    pub fn is_handler_complete(&self, state: CollectorState) -> bool {
        match state {
            CollectorState::Assessing => self.is_assessment_complete(),
            other => {
                warn!(
                    subsystem = Self::NAME,
                    state = ?other,
                    "{other:?} has no completion notion"
                );
                false
            }
        }
    }

    /// Last finished self-test: `Some(true)` passed, `Some(false)` failed.
    pub fn assessment_result(&self) -> Option<bool> {
        self.last_result
    }

    // ─── Test Controls ──────────────────────────────────────────────

    /// Roller demand used in `Manual` [-1, 1].
    pub fn set_manual_motor_demand(&mut self, demand: f64) {
        if !demand.is_finite() {
            warn!(demand, "Ignoring non-finite manual collector demand");
            return;
        }
        self.manual_motor_demand = demand.clamp(-1.0, 1.0);
    }

    /// Arm position used in `Manual`.
    pub fn set_manual_solenoid(&mut self, extend: bool) {
        self.manual_solenoid = SolenoidState::from(extend);
    }

    /// Change the active period. Running countdowns keep their remaining time.
    pub fn set_active_period(&mut self, period_ms: u64) {
        if period_ms == 0 {
            warn!(subsystem = Self::NAME, "Ignoring zero active period");
            return;
        }
        let old = self.active_period_ms;
        if old == period_ms {
            return;
        }
        if let Some(a) = self.assessment.as_mut() {
            a.countdown.rescale(old, period_ms);
        }
        if let Some(b) = self.backing.as_mut() {
            b.rescale(old, period_ms);
        }
        if self.core.period_ms() == old && self.is_active_state(self.core.current()) {
            self.core.set_period(period_ms);
        }
        self.active_period_ms = period_ms;
        debug!(subsystem = Self::NAME, old, new = period_ms, "active period changed");
    }

    fn is_active_state(&self, state: CollectorState) -> bool {
        !matches!(state, CollectorState::Disabling | CollectorState::Holding)
    }

    fn set_motor(&mut self, demand: f64) {
        self.outputs.motor_mode = ControlMode::PercentOutput;
        self.outputs.motor_demand = demand;
    }

    // ─── Handlers ───────────────────────────────────────────────────

    fn handle_assessing(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.active_period_ms);
            self.outputs.solenoid = SolenoidState::Retract;
            self.set_motor(self.config.assess_demand);
            self.assessment = Some(Assessment {
                start_position: self.inputs.position,
                countdown: Countdown::new(self.config.assess_duration_ms, self.active_period_ms),
                result: None,
            });
            info!(start = self.inputs.position, "Collector self-test started");
            return;
        }

        let position = self.inputs.position;
        let Some(a) = self.assessment.as_mut() else {
            return;
        };
        if a.result.is_some() || !a.countdown.tick() {
            return;
        }
        let movement = a.start_position - position;
        let passed = movement >= self.config.min_assess_movement;
        a.result = Some(passed);
        self.last_result = Some(passed);
        self.set_motor(0.0);
        if passed {
            info!(movement, "Collector self-test passed: motor functioning");
        } else {
            warn!(
                movement,
                required = self.config.min_assess_movement,
                "Collector self-test failed: no movement detected"
            );
        }
    }

    fn handle_backing(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.active_period_ms);
            self.outputs.solenoid = SolenoidState::Extend;
            self.backing = Some(Countdown::new(
                self.config.backing_eject_ms,
                self.active_period_ms,
            ));
        } else if let Some(b) = self.backing.as_mut() {
            b.tick();
        }
        let ejecting = self.backing.as_ref().is_some_and(|b| !b.is_expired());
        let speed = self.config.collect_speed;
        self.set_motor(if ejecting { speed } else { -speed });
    }

    fn handle_collecting(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.active_period_ms);
            self.outputs.solenoid = SolenoidState::Extend;
            self.set_motor(self.config.collect_speed);
        }
    }

    fn handle_feeding(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.active_period_ms);
            self.set_motor(self.config.feed_speed);
        }
    }

    fn handle_resting(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.config.dormant_period_ms);
            self.outputs = CollectorOutputs::SAFE;
        }
    }

    fn handle_manual(&mut self) {
        if self.core.state_changed() {
            self.core.set_period(self.active_period_ms);
            self.manual_motor_demand = 0.0;
            self.manual_solenoid = SolenoidState::Retract;
        }
        self.set_motor(self.manual_motor_demand);
        self.outputs.solenoid = self.manual_solenoid;
    }
}

impl StateMachine for Collector {
    type State = CollectorState;
    type Wanted = CollectorState;

    fn core(&self) -> &StateCore<CollectorState, CollectorState> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StateCore<CollectorState, CollectorState> {
        &mut self.core
    }

    fn target_state(&self, wanted: CollectorState) -> CollectorState {
        wanted
    }

    fn handle_state(&mut self, state: CollectorState, _now_ms: u64) -> Result<(), SubsystemFault> {
        match state {
            CollectorState::Assessing => self.handle_assessing(),
            CollectorState::Backing => self.handle_backing(),
            CollectorState::Collecting => self.handle_collecting(),
            CollectorState::Feeding => self.handle_feeding(),
            CollectorState::Disabling | CollectorState::Holding => self.handle_resting(),
            CollectorState::Manual => self.handle_manual(),
        }
        Ok(())
    }

    fn on_transition(&mut self, from: CollectorState, _to: CollectorState) {
        match from {
            CollectorState::Assessing => self.assessment = None,
            CollectorState::Backing => self.backing = None,
            _ => {}
        }
    }
}

impl Subsystem for Collector {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&mut self, phase: ControlPhase) {
        let initial = match phase {
            ControlPhase::Teleop | ControlPhase::Autonomous => CollectorState::Holding,
            ControlPhase::Disabled => CollectorState::Disabling,
            ControlPhase::Test => CollectorState::Manual,
        };
        self.core.reset(initial, initial);
        self.core.set_period(self.active_period_ms);
        self.assessment = None;
        self.backing = None;
        self.stop();
        info!(%phase, state = ?initial, "Collector started");
    }

    fn read_periodic(&mut self) {
        match self.motor.position() {
            Ok(p) => self.inputs.position = p,
            Err(e) => warn!(subsystem = Self::NAME, "roller position read failed: {e}"),
        }
        match self.motor.stator_current() {
            Ok(a) => self.inputs.stator = a,
            Err(e) => warn!(subsystem = Self::NAME, "roller current read failed: {e}"),
        }
    }

    fn on_loop(&mut self, now_ms: u64) -> Result<(), SubsystemFault> {
        run_state_machine(self, now_ms)
    }

    fn write_periodic(&mut self) {
        let demand = self.outputs.solenoid;
        if self.solenoid_state != Some(demand) {
            match self.solenoid.set_state(demand) {
                Ok(()) => self.solenoid_state = Some(demand),
                Err(e) => warn!(subsystem = Self::NAME, "deploy valve write failed: {e}"),
            }
        }
        if let Err(e) = self
            .motor
            .set(self.outputs.motor_mode, self.outputs.motor_demand)
        {
            warn!(subsystem = Self::NAME, "roller write failed: {e}");
        }
    }

    fn stop(&mut self) {
        self.outputs = CollectorOutputs::SAFE;
        self.write_periodic();
    }

    fn when_run_again(&self) -> u64 {
        self.core.period_ms()
    }

    fn log_headers(&self) -> String {
        [
            "systemState",
            "motorControlMode",
            "motorDemand",
            "motorPosition",
            "motorStator",
            "solenoidState",
        ]
        .iter()
        .map(|field| format!("{}.{field}", Self::NAME))
        .collect::<Vec<_>>()
        .join(",")
    }

    fn log_values(&self) -> String {
        let solenoid = self
            .solenoid_state
            .map_or_else(|| "Unknown".to_string(), |s| format!("{s:?}"));
        format!(
            "{:?},{:?},{:.3},{:.1},{:.2},{solenoid}",
            self.core.current(),
            self.outputs.motor_mode,
            self.outputs.motor_demand,
            self.inputs.position,
            self.inputs.stator,
        )
    }

    fn wake_flag(&self) -> Arc<AtomicBool> {
        self.core.wake_flag()
    }

    fn zero_sensors(&mut self) {
        if let Err(e) = self.motor.set_sensor_position(0.0) {
            warn!(subsystem = Self::NAME, "roller encoder zero failed: {e}");
        }
    }

    fn output_telemetry(&self) {
        debug!(
            subsystem = Self::NAME,
            state = ?self.core.current(),
            position = self.inputs.position,
            assessment = ?self.last_result,
            "telemetry"
        );
    }
}
