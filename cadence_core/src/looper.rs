//! Fixed-period driver thread.
//!
//! The looper owns one background thread named `looper` that calls
//! [`SubsystemManager::dispatch`] every base period, measures the tick and
//! sleeps for the remainder. Late ticks are not caught up.
//!
//! ## Fault Handling
//! A [`DispatchError`] ends the loop: the crash is logged, every subsystem is
//! stopped (safe outputs), and the error is kept for [`Looper::take_fault`].
//!
//! ## RT Setup
//! With the `rt` feature the thread switches itself to `SCHED_FIFO` at the
//! configured priority. Failure is logged and the loop runs unprivileged.

use crate::error::DispatchError;
use crate::manager::SubsystemManager;
use crate::telemetry::TelemetryWriter;
use cadence_common::phase::ControlPhase;
use cadence_common::time::Clock;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from looper lifecycle calls.
#[derive(Debug, Error)]
pub enum LooperError {
    /// The looper thread could not be created.
    #[error("failed to spawn looper thread: {0}")]
    Spawn(#[source] io::Error),

    /// The telemetry sink failed.
    #[error("telemetry write failed: {0}")]
    Telemetry(#[source] io::Error),

    /// `on_start` was rejected by the manager.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Total ticks executed.
    pub cycle_count: u64,
    /// Last tick duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum tick duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum tick duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Ticks whose duration exceeded the base period.
    pub overruns: u64,
    /// Last measured start-to-start period minus the desired period [ns].
    pub last_overrun_ns: i64,
    /// Maximum start-to-start lateness [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            last_overrun_ns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a tick duration and its lateness versus the desired period.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        self.last_overrun_ns = latency_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average tick time [ns] (returns 0 if no ticks).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct LoopStatus {
    stats: CycleStats,
    fault: Option<DispatchError>,
}

// ─── Looper ─────────────────────────────────────────────────────────

/// Background thread ticking a [`SubsystemManager`].
pub struct Looper {
    manager: Arc<Mutex<SubsystemManager>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    rt_priority: i32,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<LoopStatus>>,
    telemetry: Arc<Mutex<Option<TelemetryWriter>>>,
    handle: Option<JoinHandle<()>>,
}

impl Looper {
    /// Looper ticking `manager` at its base period.
    pub fn new(manager: Arc<Mutex<SubsystemManager>>, clock: Arc<dyn Clock>) -> Self {
        let base_ms = manager.lock().base_period_ms().max(1);
        Self {
            manager,
            clock,
            period: Duration::from_millis(base_ms),
            rt_priority: 0,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(LoopStatus::default())),
            telemetry: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// SCHED_FIFO priority used when built with the `rt` feature.
    pub fn with_rt_priority(mut self, priority: i32) -> Self {
        self.rt_priority = priority;
        self
    }

    /// Attach (or detach) a telemetry writer.
    pub fn set_telemetry(&self, writer: Option<TelemetryWriter>) {
        *self.telemetry.lock() = writer;
    }

    pub fn manager(&self) -> Arc<Mutex<SubsystemManager>> {
        Arc::clone(&self.manager)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Timing statistics since the last `start`.
    pub fn stats(&self) -> CycleStats {
        self.status.lock().stats
    }

    /// Fault that ended the loop, if any. Cleared by this call; kept across
    /// restarts until taken.
    pub fn take_fault(&self) -> Option<DispatchError> {
        self.status.lock().fault.take()
    }

    /// Start every subsystem for `phase` and spawn the loop thread.
    ///
    /// No-op while already running.
    pub fn start(&mut self, phase: ControlPhase) -> Result<(), LooperError> {
        if self.is_running() {
            debug!("Looper already running");
            return Ok(());
        }
        // A loop that ended on a fault leaves a finished thread behind.
        self.join();

        self.manager.lock().on_start(phase, self.clock.now_ms())?;
        {
            // An unclaimed fault survives the restart until `take_fault`.
            let mut status = self.status.lock();
            status.stats = CycleStats::new();
            if let Some(fault) = &status.fault {
                warn!(%fault, "Restarting with an untaken fault from the previous session");
            }
        }
        self.running.store(true, Ordering::Release);

        let ctx = LoopContext {
            manager: Arc::clone(&self.manager),
            clock: Arc::clone(&self.clock),
            period: self.period,
            rt_priority: self.rt_priority,
            running: Arc::clone(&self.running),
            status: Arc::clone(&self.status),
            telemetry: Arc::clone(&self.telemetry),
        };
        let handle = std::thread::Builder::new()
            .name("looper".to_string())
            .spawn(move || ctx.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                LooperError::Spawn(e)
            })?;
        self.handle = Some(handle);

        info!(%phase, period_ms = self.period.as_millis() as u64, "Looper started");
        Ok(())
    }

    /// Stop the loop after the in-flight tick and join the thread.
    ///
    /// No-op when not running.
    pub fn stop(&mut self) -> Result<(), LooperError> {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.join();
        if let Some(writer) = self.telemetry.lock().as_mut() {
            writer.flush().map_err(LooperError::Telemetry)?;
        }
        if was_running {
            let stats = self.stats();
            info!(
                cycles = stats.cycle_count,
                overruns = stats.overruns,
                avg_us = stats.avg_cycle_ns() / 1000,
                max_us = stats.max_cycle_ns / 1000,
                "Looper stopped"
            );
        }
        Ok(())
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Looper thread panicked");
            }
        }
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Looper stop on drop failed: {e}");
        }
    }
}

/// Everything the loop thread needs.
struct LoopContext {
    manager: Arc<Mutex<SubsystemManager>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    rt_priority: i32,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<LoopStatus>>,
    telemetry: Arc<Mutex<Option<TelemetryWriter>>>,
}

impl LoopContext {
    fn run(self) {
        if let Err(e) = rt_set_scheduler(self.rt_priority) {
            warn!("{e}; continuing without RT scheduling");
        }

        let period_ns = self.period.as_nanos() as i64;
        let mut last_start: Option<Instant> = None;

        while self.running.load(Ordering::Acquire) {
            let tick_start = Instant::now();
            let latency_ns = last_start.map_or(0, |prev| {
                tick_start.duration_since(prev).as_nanos() as i64 - period_ns
            });
            last_start = Some(tick_start);

            let now_ms = self.clock.now_ms();
            let result = self.manager.lock().dispatch(now_ms);
            if let Err(fault) = result {
                error!(%fault, now_ms, "CRASH: looper halted by dispatch fault");
                self.manager.lock().on_stop();
                self.status.lock().fault = Some(fault);
                self.running.store(false, Ordering::Release);
                break;
            }

            self.record_telemetry(now_ms);

            let elapsed = tick_start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;
            {
                let mut status = self.status.lock();
                status.stats.record(duration_ns, latency_ns);
                if elapsed > self.period {
                    status.stats.overruns += 1;
                    let overruns = status.stats.overruns;
                    if overruns <= 10 || overruns % 1000 == 0 {
                        warn!(
                            "Tick overrun #{overruns}: tick took {}us (period {}us)",
                            duration_ns / 1000,
                            period_ns / 1000
                        );
                    }
                }
            }

            if elapsed < self.period {
                std::thread::sleep(self.period - elapsed);
            }
        }
        debug!("Looper thread exiting");
    }

    fn record_telemetry(&self, now_ms: u64) {
        let mut slot = self.telemetry.lock();
        let Some(writer) = slot.as_mut() else {
            return;
        };
        let manager = self.manager.lock();
        if let Err(e) = writer.record(&manager, now_ms) {
            warn!("{}; telemetry disabled", LooperError::Telemetry(e));
            *slot = None;
        }
    }
}

/// Set SCHED_FIFO with the given RT priority on the calling thread.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), LooperError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = io::Error::last_os_error();
        return Err(LooperError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    info!(priority, "Looper thread running SCHED_FIFO");
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), LooperError> {
    Ok(()) // No-op in simulation mode
}
