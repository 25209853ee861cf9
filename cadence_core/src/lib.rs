//! # Cadence Core Library
//!
//! Cooperative multi-rate scheduler for robot mechanisms. One looper thread
//! ticks a [`SubsystemManager`](manager::SubsystemManager) at a fixed base
//! period; each registered subsystem runs only when its requested period
//! has elapsed or an accepted wanted-state request woke it.
//!
//! ## Layers
//!
//! 1. **Looper** - fixed-period thread, timing statistics, crash handling
//! 2. **SubsystemManager** - per-subsystem schedule and dispatch order
//! 3. **Subsystem** - read → decide → write contract
//! 4. **StateMachine** - current/wanted state core with bounded re-entry
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cadence_common::prelude::*;
//! use cadence_core::config::ControllerConfig;
//! use cadence_core::manager::SubsystemManager;
//! use cadence_core::subsystem::{SharedSubsystem, StateMachine, into_handle};
//! use cadence_core::subsystems::{Collector, CollectorState};
//! use cadence_hal::SimRig;
//!
//! let cfg = ControllerConfig::default();
//! let clock = ManualClock::new();
//! let rig = SimRig::new(&cfg.simulation, Arc::new(clock.clone()));
//! let collector = into_handle(Collector::new(
//!     cfg.collector.clone(),
//!     rig.collector_motor,
//!     rig.collector_solenoid,
//! ));
//!
//! let mut manager = SubsystemManager::new(Arc::new(clock.clone()));
//! let shared: SharedSubsystem = collector.clone();
//! manager.initialize(cfg.scheduler.base_period_ms, vec![shared]).unwrap();
//! manager.on_start(ControlPhase::Teleop, 0).unwrap();
//! manager.dispatch(0).unwrap();
//!
//! collector.lock().set_wanted_state(CollectorState::Collecting, "doc");
//! assert_eq!(manager.dispatch(5).unwrap(), 1);
//! assert_eq!(collector.lock().current_state(), CollectorState::Collecting);
//! ```

pub mod config;
pub mod error;
pub mod latch;
pub mod looper;
pub mod manager;
pub mod subsystem;
pub mod subsystems;
pub mod telemetry;
