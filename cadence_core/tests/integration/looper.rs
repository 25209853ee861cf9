//! Integration test: looper on a real thread.
//!
//! Uses the monotonic clock and short sleeps; timing assertions are loose
//! bounds so they hold on a loaded CI machine. Mechanism requests are issued
//! from a second thread while the loop runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use cadence_common::phase::ControlPhase;
use cadence_common::time::{Clock, MonotonicClock};
use cadence_core::config::ControllerConfig;
use cadence_core::error::{DispatchError, SubsystemFault};
use cadence_core::looper::Looper;
use cadence_core::manager::SubsystemManager;
use cadence_core::subsystem::{
    SharedSubsystem, StateMachine, Subsystem, SubsystemHandle, into_handle,
};
use cadence_core::subsystems::{Collector, CollectorState, Shooter, ShooterWanted};
use cadence_core::telemetry::TelemetryWriter;
use cadence_hal::SimRig;
use parking_lot::Mutex;

/// Counts runs; faults or panics once `fail_after` runs are reached.
struct Counter {
    runs: Arc<AtomicU64>,
    stops: Arc<AtomicU64>,
    fail_after: Option<u64>,
    fail_at: Option<u64>,
    panic_after: Option<u64>,
    wake: Arc<AtomicBool>,
}

impl Counter {
    fn new() -> Self {
        Self {
            runs: Arc::new(AtomicU64::new(0)),
            stops: Arc::new(AtomicU64::new(0)),
            fail_after: None,
            fail_at: None,
            panic_after: None,
            wake: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Subsystem for Counter {
    fn name(&self) -> &str {
        "Counter"
    }
    fn start(&mut self, _phase: ControlPhase) {}
    fn read_periodic(&mut self) {}
    fn on_loop(&mut self, _now_ms: u64) -> Result<(), SubsystemFault> {
        let n = self.runs.fetch_add(1, Ordering::AcqRel) + 1;
        if self.panic_after.is_some_and(|limit| n >= limit) {
            panic!("counter overflowed its budget");
        }
        if self.fail_after.is_some_and(|limit| n >= limit) || self.fail_at == Some(n) {
            return Err(SubsystemFault::Invariant(format!("run {n}")));
        }
        Ok(())
    }
    fn write_periodic(&mut self) {}
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::AcqRel);
    }
    fn when_run_again(&self) -> u64 {
        5
    }
    fn log_headers(&self) -> String {
        "Counter.runs".to_string()
    }
    fn log_values(&self) -> String {
        self.runs.load(Ordering::Acquire).to_string()
    }
    fn wake_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.wake)
    }
}

fn looper_with(counter: Counter) -> Looper {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut manager = SubsystemManager::new(Arc::clone(&clock));
    let shared: SharedSubsystem = Arc::new(Mutex::new(counter));
    manager.initialize(5, vec![shared]).unwrap();
    Looper::new(Arc::new(Mutex::new(manager)), clock)
}

fn wait_until_stopped(looper: &Looper, timeout: Duration) -> bool {
    let end = Instant::now() + timeout;
    while Instant::now() < end {
        if !looper.is_running() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_start_stop_idempotent() {
    let mut looper = looper_with(Counter::new());
    assert!(!looper.is_running());
    looper.stop().unwrap();

    looper.start(ControlPhase::Teleop).unwrap();
    looper.start(ControlPhase::Teleop).unwrap();
    assert!(looper.is_running());

    looper.stop().unwrap();
    looper.stop().unwrap();
    assert!(!looper.is_running());
    assert!(looper.take_fault().is_none());
}

#[test]
fn test_ticks_and_runs_counted() {
    let counter = Counter::new();
    let runs = Arc::clone(&counter.runs);
    let mut looper = looper_with(counter);

    looper.start(ControlPhase::Teleop).unwrap();
    std::thread::sleep(Duration::from_millis(250));
    looper.stop().unwrap();

    let stats = looper.stats();
    // 50 ticks nominal at 5 ms.
    assert!(stats.cycle_count >= 10, "only {} ticks", stats.cycle_count);
    assert!(stats.cycle_count <= 60, "{} ticks", stats.cycle_count);
    assert!(stats.min_cycle_ns <= stats.max_cycle_ns);

    let runs = runs.load(Ordering::Acquire);
    assert!(runs >= 5, "only {runs} runs");
    assert!(runs <= stats.cycle_count);

    // Nothing runs after stop returns.
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(looper.stats().cycle_count, stats.cycle_count);
}

#[test]
fn test_fault_halts_loop_and_stops_subsystems() {
    let mut counter = Counter::new();
    counter.fail_after = Some(3);
    let stops = Arc::clone(&counter.stops);
    let mut looper = looper_with(counter);

    looper.start(ControlPhase::Teleop).unwrap();
    assert!(wait_until_stopped(&looper, Duration::from_secs(2)));

    match looper.take_fault() {
        Some(DispatchError::Fault { subsystem, source }) => {
            assert_eq!(subsystem, "Counter");
            assert_eq!(source, SubsystemFault::Invariant("run 3".to_string()));
        }
        other => panic!("expected a fault, got {other:?}"),
    }
    assert!(looper.take_fault().is_none());
    assert_eq!(stops.load(Ordering::Acquire), 1);
    looper.stop().unwrap();
}

#[test]
fn test_panic_halts_loop() {
    let mut counter = Counter::new();
    counter.panic_after = Some(2);
    let mut looper = looper_with(counter);

    looper.start(ControlPhase::Autonomous).unwrap();
    assert!(wait_until_stopped(&looper, Duration::from_secs(2)));
    match looper.take_fault() {
        Some(DispatchError::Panicked { subsystem, message }) => {
            assert_eq!(subsystem, "Counter");
            assert_eq!(message, "counter overflowed its budget");
        }
        other => panic!("expected a panic record, got {other:?}"),
    }
}

#[test]
fn test_restart_after_fault() {
    let mut counter = Counter::new();
    counter.fail_after = Some(2);
    let runs = Arc::clone(&counter.runs);
    let mut looper = looper_with(counter);

    looper.start(ControlPhase::Teleop).unwrap();
    assert!(wait_until_stopped(&looper, Duration::from_secs(2)));
    assert!(looper.take_fault().is_some());

    // The counter keeps faulting, so the second session ends the same way.
    looper.start(ControlPhase::Teleop).unwrap();
    assert!(wait_until_stopped(&looper, Duration::from_secs(2)));
    assert!(looper.take_fault().is_some());
    assert_eq!(runs.load(Ordering::Acquire), 3);
}

#[test]
fn test_untaken_fault_survives_restart() {
    let mut counter = Counter::new();
    counter.fail_at = Some(2);
    let runs = Arc::clone(&counter.runs);
    let mut looper = looper_with(counter);

    looper.start(ControlPhase::Teleop).unwrap();
    assert!(wait_until_stopped(&looper, Duration::from_secs(2)));

    // The second session runs cleanly; the first session's fault is still there.
    looper.start(ControlPhase::Teleop).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(looper.is_running());
    assert!(runs.load(Ordering::Acquire) > 2);
    looper.stop().unwrap();

    match looper.take_fault() {
        Some(DispatchError::Fault { subsystem, source }) => {
            assert_eq!(subsystem, "Counter");
            assert_eq!(source, SubsystemFault::Invariant("run 2".to_string()));
        }
        other => panic!("expected the first session's fault, got {other:?}"),
    }
    assert!(looper.take_fault().is_none());
}

/// Shooter and collector on the simulated rig, driven by a real looper.
fn mechanism_looper() -> (Looper, SubsystemHandle<Shooter>, SubsystemHandle<Collector>) {
    let config = ControllerConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let rig = SimRig::new(&config.simulation, Arc::clone(&clock));
    let shooter = into_handle(Shooter::new(config.shooter.clone(), rig.flywheel, rig.hood));
    let collector = into_handle(Collector::new(
        config.collector.clone(),
        rig.collector_motor,
        rig.collector_solenoid,
    ));

    let mut manager = SubsystemManager::new(Arc::clone(&clock));
    manager
        .initialize(
            config.scheduler.base_period_ms,
            vec![
                shooter.clone() as SharedSubsystem,
                collector.clone() as SharedSubsystem,
            ],
        )
        .unwrap();
    let looper = Looper::new(Arc::new(Mutex::new(manager)), clock);
    (looper, shooter, collector)
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + timeout;
    while Instant::now() < end {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_requests_from_another_thread_while_running() {
    let (mut looper, shooter, collector) = mechanism_looper();
    looper.start(ControlPhase::Teleop).unwrap();

    let operator = {
        let collector = Arc::clone(&collector);
        std::thread::spawn(move || {
            let mut seen = Vec::new();
            for state in [
                CollectorState::Collecting,
                CollectorState::Holding,
                CollectorState::Assessing,
            ] {
                collector.lock().set_wanted_state(state, "operator");
                let reached = wait_for(Duration::from_secs(2), || {
                    collector.lock().current_state() == state
                });
                seen.push((state, reached));
            }
            let finished = wait_for(Duration::from_secs(2), || {
                collector.lock().is_assessment_complete()
            });
            (seen, finished)
        })
    };

    let (seen, finished) = operator.join().unwrap();
    for (state, reached) in seen {
        assert!(reached, "looper never entered {state:?}");
    }
    assert!(finished, "self-test never completed");
    assert_eq!(collector.lock().assessment_result(), Some(true));

    // A held collector handle does not block requests to the shooter.
    {
        let _held = collector.lock();
        let (tx, rx) = mpsc::channel();
        let shooter = Arc::clone(&shooter);
        std::thread::spawn(move || {
            let change = shooter.lock().set_wanted_state(ShooterWanted::Shoot, "driver");
            tx.send(change).unwrap();
        });
        assert!(
            rx.recv_timeout(Duration::from_secs(1)).is_ok(),
            "shooter request blocked behind the collector lock"
        );
    }
    assert_eq!(shooter.lock().wanted_state(), ShooterWanted::Shoot);

    let stop_started = Instant::now();
    looper.stop().unwrap();
    assert!(stop_started.elapsed() < Duration::from_secs(1));
    assert!(!looper.is_running());
    assert!(looper.take_fault().is_none());
}

#[test]
fn test_telemetry_file_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let mut looper = looper_with(Counter::new());
    looper.set_telemetry(Some(TelemetryWriter::create(&path, 2).unwrap()));

    looper.start(ControlPhase::Teleop).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    looper.stop().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("time_ms,Counter.schedDeltaDesired,Counter.schedDeltaActual,Counter.schedDuration,Counter.runs")
    );
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    for row in rows {
        assert_eq!(row.split(',').count(), 5, "{row}");
    }
}
