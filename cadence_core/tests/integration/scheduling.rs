//! Integration test: multi-rate scheduling over a simulated second.
//!
//! Subsystems requesting 5, 20 and 100 ms run `floor(1000 / p)` times (±1)
//! when the manager is stepped every 5 ms; dormant subsystems run only when
//! woken, once per wake.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cadence_common::phase::ControlPhase;
use cadence_common::time::{Clock, ManualClock};
use cadence_core::error::SubsystemFault;
use cadence_core::manager::SubsystemManager;
use cadence_core::subsystem::{SharedSubsystem, SubsystemHandle, Subsystem, into_handle};

/// Records the time of every run.
struct Recorder {
    name: &'static str,
    period_ms: u64,
    runs: Vec<u64>,
    wake: Arc<AtomicBool>,
}

impl Recorder {
    fn new(name: &'static str, period_ms: u64) -> SubsystemHandle<Self> {
        into_handle(Self {
            name,
            period_ms,
            runs: Vec::new(),
            wake: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Subsystem for Recorder {
    fn name(&self) -> &str {
        self.name
    }
    fn start(&mut self, _phase: ControlPhase) {
        self.runs.clear();
    }
    fn read_periodic(&mut self) {}
    fn on_loop(&mut self, now_ms: u64) -> Result<(), SubsystemFault> {
        self.runs.push(now_ms);
        Ok(())
    }
    fn write_periodic(&mut self) {}
    fn stop(&mut self) {}
    fn when_run_again(&self) -> u64 {
        self.period_ms
    }
    fn log_headers(&self) -> String {
        format!("{}.runs", self.name)
    }
    fn log_values(&self) -> String {
        self.runs.len().to_string()
    }
    fn wake_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.wake)
    }
}

fn setup(recorders: &[&SubsystemHandle<Recorder>]) -> (SubsystemManager, ManualClock) {
    let clock = ManualClock::new();
    let mut manager = SubsystemManager::new(Arc::new(clock.clone()));
    let shared: Vec<SharedSubsystem> = recorders
        .iter()
        .map(|r| Arc::clone(*r) as SharedSubsystem)
        .collect();
    manager.initialize(5, shared).unwrap();
    manager.on_start(ControlPhase::Teleop, 0).unwrap();
    (manager, clock)
}

/// Step every 5 ms over `[0, end_ms)`.
fn run(manager: &mut SubsystemManager, clock: &ManualClock, end_ms: u64) {
    let mut now = clock.now_ms();
    while now < end_ms {
        manager.dispatch(now).unwrap();
        now = clock.advance(5);
    }
}

#[test]
fn test_periods_over_one_second() {
    let fast = Recorder::new("Fast", 5);
    let medium = Recorder::new("Medium", 20);
    let slow = Recorder::new("Slow", 100);
    let (mut manager, clock) = setup(&[&fast, &medium, &slow]);

    run(&mut manager, &clock, 1000);

    for (handle, period) in [(&fast, 5u64), (&medium, 20), (&slow, 100)] {
        let runs = handle.lock().runs.len() as i64;
        let expected = (1000 / period) as i64;
        assert!(
            (runs - expected).abs() <= 1,
            "period {period}: {runs} runs, expected {expected}"
        );
    }

    let e = manager.schedule("Medium").unwrap();
    assert_eq!(e.desired_period_ms, 20);
    assert_eq!(e.last_delta_ms, 20);
    assert_eq!(e.run_count, 50);
}

#[test]
fn test_run_spacing_never_shorter_than_period() {
    let medium = Recorder::new("Medium", 20);
    let slow = Recorder::new("Slow", 100);
    let (mut manager, clock) = setup(&[&medium, &slow]);
    run(&mut manager, &clock, 1000);

    for (handle, period) in [(&medium, 20u64), (&slow, 100)] {
        let runs = handle.lock().runs.clone();
        for pair in runs.windows(2) {
            assert!(pair[1] - pair[0] >= period, "{pair:?} closer than {period}");
        }
    }
}

#[test]
fn test_dormant_never_runs_without_wake() {
    let fast = Recorder::new("Fast", 5);
    let dormant = Recorder::new("Dormant", 0);
    let (mut manager, clock) = setup(&[&fast, &dormant]);
    run(&mut manager, &clock, 1000);

    assert_eq!(fast.lock().runs.len(), 200);
    assert!(
        dormant.lock().runs.is_empty(),
        "period-0 subsystem ran {} times without a wake",
        dormant.lock().runs.len()
    );
    let e = manager.schedule("Dormant").unwrap();
    assert!(e.is_dormant());
    assert_eq!(e.run_count, 0);
}

#[test]
fn test_wake_runs_dormant_on_next_step_only() {
    let dormant = Recorder::new("Dormant", 0);
    let (mut manager, clock) = setup(&[&dormant]);
    run(&mut manager, &clock, 100);
    assert!(dormant.lock().runs.is_empty());

    let wake = dormant.lock().wake_flag();
    wake.store(true, Ordering::Release);
    run(&mut manager, &clock, 200);
    assert_eq!(dormant.lock().runs, vec![100]);

    // Two wakes before a step collapse into one run.
    wake.store(true, Ordering::Release);
    wake.store(true, Ordering::Release);
    run(&mut manager, &clock, 300);
    assert_eq!(dormant.lock().runs, vec![100, 200]);
}

#[test]
fn test_wake_pulls_slow_run_forward() {
    let slow = Recorder::new("Slow", 100);
    let (mut manager, clock) = setup(&[&slow]);
    run(&mut manager, &clock, 30);
    assert_eq!(slow.lock().runs, vec![0]);

    slow.lock().wake_flag().store(true, Ordering::Release);
    run(&mut manager, &clock, 250);
    // Woken at 30, then the period restarts from there.
    assert_eq!(slow.lock().runs, vec![0, 30, 130, 230]);
    assert_eq!(manager.schedule("Slow").unwrap().last_delta_ms, 100);
}

#[test]
fn test_dispatch_follows_registration_order() {
    let a = Recorder::new("A", 5);
    let b = Recorder::new("B", 5);
    let (mut manager, _clock) = setup(&[&a, &b]);
    assert_eq!(manager.names(), vec!["A", "B"]);
    assert_eq!(
        manager.log_headers(),
        "A.schedDeltaDesired,A.schedDeltaActual,A.schedDuration,A.runs,\
         B.schedDeltaDesired,B.schedDeltaActual,B.schedDuration,B.runs"
    );
    assert_eq!(manager.dispatch(0).unwrap(), 2);
}

#[test]
fn test_restart_rearms_every_schedule() {
    let slow = Recorder::new("Slow", 100);
    let (mut manager, clock) = setup(&[&slow]);
    run(&mut manager, &clock, 50);
    manager.on_stop();
    assert_eq!(manager.dispatch(clock.now_ms()).unwrap(), 0);

    let now = clock.now_ms();
    manager.on_start(ControlPhase::Autonomous, now).unwrap();
    assert_eq!(manager.dispatch(now).unwrap(), 1);
    assert_eq!(slow.lock().runs, vec![now]);
    assert_eq!(manager.schedule("Slow").unwrap().run_count, 1);
}
