//! Concrete mechanisms.
//!
//! Each mechanism owns its devices behind the `cadence_common::hal` traits,
//! keeps separate inputs and outputs snapshots, and is driven by
//! [`run_state_machine`](crate::subsystem::run_state_machine).

pub mod collector;
pub mod shooter;

pub use collector::{Collector, CollectorState};
pub use shooter::{Shooter, ShooterState, ShooterWanted};
