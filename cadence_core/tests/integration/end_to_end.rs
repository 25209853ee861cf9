//! Integration test: shooter and collector on the simulated rig.
//!
//! Drives the full manager → subsystem → simulated device path with a
//! manual clock: homing, spin-up to readyToShoot, the collector self-test,
//! safe stop, telemetry rows and hardware hiccups.

use std::io::{self, Write};
use std::sync::Arc;

use cadence_common::hal::{ControlMode, HalError, SolenoidState};
use cadence_common::phase::ControlPhase;
use cadence_common::time::Clock;
use cadence_core::config::ControllerConfig;
use cadence_core::subsystem::StateMachine;
use cadence_core::subsystems::{CollectorState, ShooterState, ShooterWanted};
use cadence_core::telemetry::TelemetryWriter;
use parking_lot::Mutex;

use super::Harness;

#[test]
fn test_teleop_shoot_and_assess() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);

    {
        let mut shooter = h.shooter.lock();
        shooter.set_target_distance(3.0);
        shooter.set_wanted_state(ShooterWanted::Shoot, "driver");
    }
    h.collector
        .lock()
        .set_wanted_state(CollectorState::Assessing, "driver");

    // The self-test finishes long before the hood is homed.
    assert!(h.run_until(400, |h| h.collector.lock().is_assessment_complete()));
    assert_eq!(h.collector.lock().assessment_result(), Some(true));
    assert_eq!(h.manager.schedule("Collector").unwrap().desired_period_ms, 20);
    assert_eq!(h.shooter.lock().current_state(), ShooterState::HomingHood);

    assert!(h.run_until(6000, |h| h.shooter.lock().ready_to_shoot()));
    let shooter = h.shooter.lock();
    assert!(shooter.is_homed());
    assert_eq!(shooter.current_state(), ShooterState::Shooting);
    let expected_rpm = shooter.distance_to_speed(3.0);
    assert!((shooter.flywheel_speed() - expected_rpm).abs() <= 100.0);
    let (mode, demand) = h.probes.flywheel.last_command();
    assert_eq!(mode, ControlMode::PercentOutput);
    assert!((demand - expected_rpm / 6000.0).abs() < 1e-12);
    assert_eq!(h.manager.schedule("Shooter").unwrap().desired_period_ms, 5);
}

#[test]
fn test_jammed_roller_fails_assessment() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    h.probes.collector_motor.set_jammed(true);
    h.collector
        .lock()
        .set_wanted_state(CollectorState::Assessing, "pit");

    assert!(h.run_until(400, |h| h.collector.lock().is_assessment_complete()));
    assert_eq!(h.collector.lock().assessment_result(), Some(false));
    assert_eq!(h.probes.collector_motor.last_command().1, 0.0);

    // Completion drops as soon as the request moves on; the result stays.
    h.collector
        .lock()
        .set_wanted_state(CollectorState::Holding, "pit");
    assert!(!h.collector.lock().is_assessment_complete());
    h.step();
    assert_eq!(h.collector.lock().current_state(), CollectorState::Holding);
    assert_eq!(h.collector.lock().assessment_result(), Some(false));
}

#[test]
fn test_collector_dormant_until_requested() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    for _ in 0..4 {
        h.step();
    }
    let before = h.manager.schedule("Collector").unwrap().run_count;
    // Holding asks for 100 ms; nothing runs it sooner without a request.
    for _ in 0..10 {
        h.step();
    }
    assert_eq!(h.manager.schedule("Collector").unwrap().run_count, before);

    h.collector
        .lock()
        .set_wanted_state(CollectorState::Collecting, "driver");
    h.step();
    assert_eq!(h.manager.schedule("Collector").unwrap().run_count, before + 1);
    assert_eq!(h.probes.collector_solenoid.state(), SolenoidState::Extend);
    assert_eq!(h.probes.collector_motor.last_command().1, 0.9);
}

#[test]
fn test_stop_is_safe_from_any_state() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    h.shooter
        .lock()
        .set_wanted_state(ShooterWanted::Shoot, "driver");
    h.collector
        .lock()
        .set_wanted_state(CollectorState::Backing, "driver");
    assert!(h.run_until(3000, |h| h.shooter.lock().current_state() == ShooterState::Shooting));

    h.manager.on_stop();
    assert_eq!(h.probes.flywheel.last_command(), (ControlMode::PercentOutput, 0.0));
    assert_eq!(h.probes.hood.last_command(), (ControlMode::PercentOutput, 0.0));
    assert_eq!(h.probes.collector_motor.last_command(), (ControlMode::PercentOutput, 0.0));
    assert_eq!(h.probes.collector_solenoid.state(), SolenoidState::Retract);
    assert_eq!(h.step(), 0);
}

#[test]
fn test_disabled_then_teleop_rehomes() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    assert!(h.run_until(3000, |h| h.shooter.lock().current_state() == ShooterState::Holding));

    h.start(ControlPhase::Disabled);
    assert!(!h.shooter.lock().is_homed());
    assert_eq!(h.shooter.lock().current_state(), ShooterState::Disabling);
    assert_eq!(h.collector.lock().current_state(), CollectorState::Disabling);

    h.start(ControlPhase::Teleop);
    assert_eq!(h.shooter.lock().current_state(), ShooterState::HomingHood);
    assert!(h.run_until(3000, |h| h.shooter.lock().is_homed()));
}

#[test]
fn test_hood_read_fault_is_not_fatal() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    h.probes
        .hood
        .inject_fault(Some(HalError::Communication("frame lost".to_string())));
    for _ in 0..20 {
        h.step();
    }
    // Frozen snapshot for less than the dwell: no crash, not homed.
    assert!(!h.shooter.lock().is_homed());
    assert_eq!(h.shooter.lock().current_state(), ShooterState::HomingHood);

    h.probes.hood.inject_fault(None);
    assert!(h.run_until(4000, |h| h.shooter.lock().is_homed()));
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_telemetry_rows_cover_both_subsystems() {
    let mut h = Harness::new(&ControllerConfig::default());
    h.start(ControlPhase::Teleop);
    let buf = SharedBuf::default();
    let mut writer = TelemetryWriter::new(buf.clone(), 4);

    for _ in 0..20 {
        h.step();
        writer.record(&h.manager, h.clock.now_ms()).unwrap();
    }
    writer.flush().unwrap();
    assert_eq!(writer.rows_written(), 5);

    let text = String::from_utf8(buf.0.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("time_ms,Shooter.schedDeltaDesired,"));
    assert!(lines[0].contains(",Collector.schedDeltaDesired,"));
    assert!(lines[0].ends_with(",Collector.solenoidState"));
    let columns = lines[0].split(',').count();
    for row in &lines[1..] {
        assert_eq!(row.split(',').count(), columns, "{row}");
    }
    assert!(lines[1].starts_with("5,5,5,0,"));
}
