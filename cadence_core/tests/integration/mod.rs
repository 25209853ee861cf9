mod config;
mod end_to_end;
mod looper;
mod scheduling;

use std::sync::Arc;

use cadence_common::phase::ControlPhase;
use cadence_common::time::{Clock, ManualClock};
use cadence_core::config::ControllerConfig;
use cadence_core::manager::SubsystemManager;
use cadence_core::subsystem::{SharedSubsystem, SubsystemHandle, into_handle};
use cadence_core::subsystems::{Collector, Shooter};
use cadence_hal::{RigProbes, SimRig};

/// Shooter and collector on the simulated rig, stepped by a manual clock.
pub struct Harness {
    pub clock: ManualClock,
    pub manager: SubsystemManager,
    pub shooter: SubsystemHandle<Shooter>,
    pub collector: SubsystemHandle<Collector>,
    pub probes: RigProbes,
    pub base_ms: u64,
}

impl Harness {
    pub fn new(config: &ControllerConfig) -> Self {
        let clock = ManualClock::new();
        let rig = SimRig::new(&config.simulation, Arc::new(clock.clone()));
        let probes = rig.probes();
        let shooter = into_handle(Shooter::new(config.shooter.clone(), rig.flywheel, rig.hood));
        let collector = into_handle(Collector::new(
            config.collector.clone(),
            rig.collector_motor,
            rig.collector_solenoid,
        ));

        let mut manager = SubsystemManager::new(Arc::new(clock.clone()));
        manager
            .initialize(
                config.scheduler.base_period_ms,
                vec![
                    shooter.clone() as SharedSubsystem,
                    collector.clone() as SharedSubsystem,
                ],
            )
            .unwrap();

        Self {
            clock,
            manager,
            shooter,
            collector,
            probes,
            base_ms: config.scheduler.base_period_ms,
        }
    }

    pub fn start(&mut self, phase: ControlPhase) {
        let now = self.clock.now_ms();
        self.manager.on_start(phase, now).unwrap();
        self.manager.dispatch(now).unwrap();
    }

    /// Advance one base period and dispatch. Returns how many subsystems ran.
    pub fn step(&mut self) -> usize {
        let now = self.clock.advance(self.base_ms);
        self.manager.dispatch(now).unwrap()
    }

    /// Step until `done` holds or `limit_ms` elapses.
    pub fn run_until(&mut self, limit_ms: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        let end = self.clock.now_ms() + limit_ms;
        while self.clock.now_ms() < end {
            self.step();
            if done(self) {
                return true;
            }
        }
        false
    }
}
