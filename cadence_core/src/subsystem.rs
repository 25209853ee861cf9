//! Subsystem contract and the reusable state-machine core.
//!
//! Every mechanism is a [`Subsystem`]: the manager calls `read_periodic`,
//! `on_loop` and `write_periodic` in that order on each due tick, and only
//! `read_periodic`/`write_periodic`/`stop` may touch hardware.
//!
//! Concrete subsystems keep their bookkeeping in a [`StateCore`] and implement
//! [`StateMachine`]; [`run_state_machine`] then provides the decide step:
//!
//! ```text
//!   handle(current) ──► target(wanted) == current? ──yes──► done
//!                              │ no
//!                              ▼
//!                       enter(target), state_changed = true
//!                              │
//!                              ▼
//!                       handle(target)  (one extra pass, latch-gated)
//! ```

use crate::error::SubsystemFault;
use crate::latch::ChangeLatch;
use cadence_common::phase::ControlPhase;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Shared handle to a concrete subsystem.
pub type SubsystemHandle<T> = Arc<Mutex<T>>;

/// Type-erased handle held by the manager.
pub type SharedSubsystem = Arc<Mutex<dyn Subsystem>>;

/// Wrap a subsystem for sharing between the manager and command issuers.
pub fn into_handle<T: Subsystem + 'static>(subsystem: T) -> SubsystemHandle<T> {
    Arc::new(Mutex::new(subsystem))
}

/// Lifecycle interface the manager drives.
pub trait Subsystem: Send {
    /// Stable name, used as the log-field prefix.
    fn name(&self) -> &str;

    /// Enter the initial state for `phase` with safe outputs.
    fn start(&mut self, phase: ControlPhase);

    /// Refresh the inputs snapshot from hardware.
    fn read_periodic(&mut self);

    /// Decide step. Operates on snapshots only.
    fn on_loop(&mut self, now_ms: u64) -> Result<(), SubsystemFault>;

    /// Push the outputs snapshot to hardware.
    fn write_periodic(&mut self);

    /// Force safe outputs and push them immediately.
    fn stop(&mut self);

    /// Requested re-run period [ms]. 0 means dormant until woken.
    fn when_run_again(&self) -> u64;

    /// Comma-delimited field names, each prefixed with `name()`.
    fn log_headers(&self) -> String;

    /// Comma-delimited values matching `log_headers`.
    fn log_values(&self) -> String;

    /// Flag raised by an accepted wanted-state request.
    fn wake_flag(&self) -> Arc<AtomicBool>;

    /// Re-zero sensors that support it.
    fn zero_sensors(&mut self) {}

    /// Emit dashboard values.
    fn output_telemetry(&self) {}
}

/// Outcome of a wanted-state request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WantedStateChange {
    /// New wanted state recorded, subsystem woken.
    Accepted,
    /// Same as the current wanted state; nothing changed.
    Redundant,
}

/// Bookkeeping shared by every state-machine subsystem.
///
/// `S` is the internal state, `W` the externally requested intent. For most
/// subsystems the two are the same type.
#[derive(Debug)]
pub struct StateCore<S, W> {
    name: String,
    current: S,
    wanted: W,
    state_changed: bool,
    settle_latch: ChangeLatch,
    period_ms: u64,
    wake: Arc<AtomicBool>,
}

impl<S, W> StateCore<S, W>
where
    S: Copy + Eq + Debug,
    W: Copy + Eq + Debug,
{
    pub fn new(name: impl Into<String>, current: S, wanted: W) -> Self {
        Self {
            name: name.into(),
            current,
            wanted,
            state_changed: true,
            settle_latch: ChangeLatch::new(),
            period_ms: 0,
            wake: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn current(&self) -> S {
        self.current
    }

    #[inline]
    pub fn wanted(&self) -> W {
        self.wanted
    }

    /// `true` on the first handler pass after entering `current`.
    #[inline]
    pub fn state_changed(&self) -> bool {
        self.state_changed
    }

    #[inline]
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    #[inline]
    pub fn set_period(&mut self, period_ms: u64) {
        self.period_ms = period_ms;
    }

    pub fn wake_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.wake)
    }

    /// Start over in `current`/`wanted`, with the setup path armed.
    pub fn reset(&mut self, current: S, wanted: W) {
        self.current = current;
        self.wanted = wanted;
        self.state_changed = true;
        self.settle_latch.reset();
    }

    /// Record an external request.
    pub fn request(&mut self, wanted: W, requester: &str) -> WantedStateChange {
        if wanted == self.wanted {
            warn!(
                subsystem = %self.name,
                requester,
                ?wanted,
                redundant = true,
                "redundant request: {requester} is setting wanted state of {} to {wanted:?} again",
                self.name
            );
            return WantedStateChange::Redundant;
        }
        info!(
            subsystem = %self.name,
            requester,
            ?wanted,
            "{requester} is setting wanted state of {} to {wanted:?}",
            self.name
        );
        self.wanted = wanted;
        self.wake.store(true, Ordering::Release);
        WantedStateChange::Accepted
    }

    /// Change the wanted state from inside a handler. No wake is raised; the
    /// decide step reconciles right after the handler returns.
    pub fn redirect(&mut self, wanted: W) {
        if wanted != self.wanted {
            debug!(subsystem = %self.name, from = ?self.wanted, to = ?wanted, "wanted state redirected");
            self.wanted = wanted;
        }
    }

    fn enter(&mut self, next: S) {
        self.current = next;
        self.state_changed = true;
    }
}

/// State-machine side of a subsystem, driven by [`run_state_machine`].
pub trait StateMachine {
    type State: Copy + Eq + Debug;
    type Wanted: Copy + Eq + Debug;

    fn core(&self) -> &StateCore<Self::State, Self::Wanted>;

    fn core_mut(&mut self) -> &mut StateCore<Self::State, Self::Wanted>;

    /// State that serves `wanted` right now.
    fn target_state(&self, wanted: Self::Wanted) -> Self::State;

    /// Run the handler for `state`. `core().state_changed()` is `true` on
    /// the first pass after entering it.
    fn handle_state(&mut self, state: Self::State, now_ms: u64) -> Result<(), SubsystemFault>;

    /// Hook called just before `current` becomes `to`.
    fn on_transition(&mut self, _from: Self::State, _to: Self::State) {}

    /// Record an external request. See [`StateCore::request`].
    fn set_wanted_state(&mut self, wanted: Self::Wanted, requester: &str) -> WantedStateChange {
        self.core_mut().request(wanted, requester)
    }
}

/// Extra handler passes allowed per decide step after a transition.
pub const MAX_REENTRY: usize = 1;

/// Decide step shared by every state-machine subsystem.
///
/// Runs the current state's handler, reconciles toward the wanted state and,
/// when a transition happened, runs the new state's handler once more in the
/// same call. A second transition in the same call is recorded but its
/// handler waits for the next tick.
pub fn run_state_machine<M>(machine: &mut M, now_ms: u64) -> Result<(), SubsystemFault>
where
    M: StateMachine + ?Sized,
{
    machine.core_mut().settle_latch.reset();

    for _ in 0..=MAX_REENTRY {
        let current = machine.core().current();
        machine.handle_state(current, now_ms)?;
        machine.core_mut().state_changed = false;

        let target = machine.target_state(machine.core().wanted());
        let changed = target != current;
        if changed {
            debug!(
                subsystem = %machine.core().name(),
                from = ?current,
                to = ?target,
                "state transition"
            );
            machine.on_transition(current, target);
            machine.core_mut().enter(target);
        }

        if !machine.core_mut().settle_latch.update(changed) {
            break;
        }
    }
    Ok(())
}
