//! Multi-rate dispatch over the registered subsystems.
//!
//! ## Dispatch Step
//! 1. Consume every subsystem's wake flag (requests raised during this step
//!    are seen on the next one).
//! 2. In registration order, run each subsystem that is woken or whose
//!    next-due time has passed: `read_periodic` → `on_loop` → `write_periodic`.
//! 3. Re-arm: `next_due = completion + when_run_again()`, or dormant for 0.
//!
//! A fault or panic inside a subsystem is logged as a crash record and
//! returned as [`DispatchError`]; the step stops at that subsystem.

use crate::error::{DispatchError, SubsystemFault, panic_message};
use crate::subsystem::SharedSubsystem;
use cadence_common::phase::ControlPhase;
use cadence_common::time::Clock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace};

// ─── Scheduling Entry ───────────────────────────────────────────────

/// Scheduling bookkeeping for one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleEntry {
    /// Period requested after the last run [ms]. 0 = dormant.
    pub desired_period_ms: u64,
    /// Start time of the last run [ms].
    pub last_run_ms: Option<u64>,
    /// Earliest start of the next run [ms]. `None` while dormant.
    pub next_due_ms: Option<u64>,
    /// Measured time between the last two runs [ms].
    pub last_delta_ms: u64,
    /// Duration of the last run [ms].
    pub last_duration_ms: u64,
    /// Runs since the last `on_start`.
    pub run_count: u64,
}

impl ScheduleEntry {
    /// Whether the subsystem runs at `now_ms` without a wake.
    #[inline]
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.next_due_ms.is_some_and(|due| now_ms >= due)
    }

    /// Dormant: no timed run pending.
    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.next_due_ms.is_none()
    }
}

struct Registered {
    name: String,
    handle: SharedSubsystem,
    wake: Arc<AtomicBool>,
    wake_pending: bool,
    entry: ScheduleEntry,
}

// ─── Subsystem Manager ──────────────────────────────────────────────

/// Ordered set of subsystems and their schedules.
pub struct SubsystemManager {
    clock: Arc<dyn Clock>,
    base_period_ms: u64,
    subsystems: Vec<Registered>,
    initialized: bool,
}

impl SubsystemManager {
    /// Create an empty manager timing runs with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            base_period_ms: 0,
            subsystems: Vec::new(),
            initialized: false,
        }
    }

    /// Register the subsystems. Dispatch order is the order given.
    ///
    /// # Errors
    /// `AlreadyInitialized` on a second call.
    pub fn initialize(
        &mut self,
        base_period_ms: u64,
        subsystems: Vec<SharedSubsystem>,
    ) -> Result<(), DispatchError> {
        if self.initialized {
            return Err(DispatchError::AlreadyInitialized);
        }
        self.base_period_ms = base_period_ms;
        self.subsystems = subsystems
            .into_iter()
            .map(|handle| {
                let (name, wake) = {
                    let s = handle.lock();
                    (s.name().to_string(), s.wake_flag())
                };
                Registered {
                    name,
                    handle,
                    wake,
                    wake_pending: false,
                    entry: ScheduleEntry::default(),
                }
            })
            .collect();
        self.initialized = true;

        info!(
            base_period_ms,
            subsystems = ?self.names(),
            "SubsystemManager initialized"
        );
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn base_period_ms(&self) -> u64 {
        self.base_period_ms
    }

    /// Subsystem names in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.subsystems.iter().map(|r| r.name.as_str()).collect()
    }

    /// Scheduling snapshot for `name`.
    pub fn schedule(&self, name: &str) -> Option<ScheduleEntry> {
        self.subsystems
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.entry)
    }

    /// Start every subsystem for `phase`.
    ///
    /// Subsystems that come up with a non-zero period are due at `now_ms`;
    /// a period of 0 leaves the subsystem dormant until its first wake.
    pub fn on_start(&mut self, phase: ControlPhase, now_ms: u64) -> Result<(), DispatchError> {
        self.ensure_initialized()?;
        info!(%phase, "Starting subsystems");
        for r in &mut self.subsystems {
            let period = {
                let mut subsystem = r.handle.lock();
                subsystem.start(phase);
                subsystem.when_run_again()
            };
            r.wake.store(false, Ordering::Release);
            r.wake_pending = false;
            r.entry = ScheduleEntry {
                desired_period_ms: period,
                next_due_ms: (period > 0).then_some(now_ms),
                ..ScheduleEntry::default()
            };
            if period == 0 {
                debug!(subsystem = %r.name, "subsystem starts dormant");
            }
        }
        Ok(())
    }

    /// Drive every subsystem to its safe outputs.
    pub fn on_stop(&mut self) {
        info!("Stopping subsystems");
        for r in &mut self.subsystems {
            r.handle.lock().stop();
            r.entry.next_due_ms = None;
            r.wake_pending = false;
        }
    }

    /// Forward to every subsystem's `zero_sensors`.
    pub fn zero_sensors(&self) {
        for r in &self.subsystems {
            r.handle.lock().zero_sensors();
        }
    }

    /// Forward to every subsystem's `output_telemetry`.
    pub fn output_telemetry(&self) {
        for r in &self.subsystems {
            r.handle.lock().output_telemetry();
        }
    }

    /// One dispatch step at `now_ms`. Returns how many subsystems ran.
    pub fn dispatch(&mut self, now_ms: u64) -> Result<usize, DispatchError> {
        self.ensure_initialized()?;

        for r in &mut self.subsystems {
            r.wake_pending |= r.wake.swap(false, Ordering::AcqRel);
        }

        let mut ran = 0;
        for r in &mut self.subsystems {
            if !(r.wake_pending || r.entry.is_due(now_ms)) {
                continue;
            }
            let woken = std::mem::take(&mut r.wake_pending);

            let start = self.clock.now_ms();
            let outcome = {
                let mut subsystem = r.handle.lock();
                catch_unwind(AssertUnwindSafe(|| -> Result<u64, SubsystemFault> {
                    subsystem.read_periodic();
                    subsystem.on_loop(now_ms)?;
                    subsystem.write_periodic();
                    Ok(subsystem.when_run_again())
                }))
            };
            let completion = self.clock.now_ms();

            let period = match outcome {
                Ok(Ok(period)) => period,
                Ok(Err(fault)) => {
                    error!(subsystem = %r.name, %fault, now_ms, "CRASH: subsystem fault during dispatch");
                    return Err(DispatchError::Fault {
                        subsystem: r.name.clone(),
                        source: fault,
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(subsystem = %r.name, %message, now_ms, "CRASH: subsystem panicked during dispatch");
                    return Err(DispatchError::Panicked {
                        subsystem: r.name.clone(),
                        message,
                    });
                }
            };

            let entry = &mut r.entry;
            entry.last_delta_ms = entry.last_run_ms.map_or(0, |last| now_ms.saturating_sub(last));
            entry.last_run_ms = Some(now_ms);
            entry.last_duration_ms = completion.saturating_sub(start);
            entry.desired_period_ms = period;
            entry.next_due_ms = (period > 0).then(|| completion + period);
            entry.run_count += 1;
            ran += 1;

            trace!(
                subsystem = %r.name,
                woken,
                period,
                delta = entry.last_delta_ms,
                duration = entry.last_duration_ms,
                "dispatched"
            );
            if period == 0 {
                debug!(subsystem = %r.name, "subsystem dormant");
            }
        }
        Ok(ran)
    }

    /// Combined comma-delimited header in registration order.
    pub fn log_headers(&self) -> String {
        let mut fields = Vec::with_capacity(self.subsystems.len() * 2);
        for r in &self.subsystems {
            fields.push(format!(
                "{0}.schedDeltaDesired,{0}.schedDeltaActual,{0}.schedDuration",
                r.name
            ));
            let own = r.handle.lock().log_headers();
            if !own.is_empty() {
                fields.push(own);
            }
        }
        fields.join(",")
    }

    /// Combined comma-delimited values matching [`log_headers`](Self::log_headers).
    pub fn log_values(&self) -> String {
        let mut fields = Vec::with_capacity(self.subsystems.len() * 2);
        for r in &self.subsystems {
            let e = &r.entry;
            fields.push(format!(
                "{},{},{}",
                e.desired_period_ms, e.last_delta_ms, e.last_duration_ms
            ));
            let own = r.handle.lock().log_values();
            if !own.is_empty() {
                fields.push(own);
            }
        }
        fields.join(",")
    }

    fn ensure_initialized(&self) -> Result<(), DispatchError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DispatchError::NotInitialized)
        }
    }
}
