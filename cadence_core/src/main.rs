//! # Cadence Controller
//!
//! Runs the shooter and collector on simulated hardware under the looper.
//!
//! Startup sequence:
//! 1. Load and validate the controller TOML (defaults when no file given)
//! 2. Build the simulated rig and the subsystems, register them in order
//! 3. Run one looper session in `Disabled`, then restart in `--phase`
//! 4. Request SHOOT at `--distance` and the collector self-test
//! 5. Stop on Ctrl-C or after `--duration-s`, report readiness and the
//!    self-test result

use cadence_common::config::SharedConfig;
use cadence_common::phase::ControlPhase;
use cadence_common::time::{Clock, MonotonicClock};
use cadence_core::config::{ControllerConfig, load_config};
use cadence_core::looper::Looper;
use cadence_core::manager::SubsystemManager;
use cadence_core::subsystem::{SharedSubsystem, StateMachine, into_handle};
use cadence_core::subsystems::{Collector, CollectorState, Shooter, ShooterWanted};
use cadence_core::telemetry::TelemetryWriter;
use cadence_hal::SimRig;
use clap::Parser;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const REQUESTER: &str = "cli";

/// Cadence - cooperative multi-rate mechanism controller
#[derive(Parser, Debug)]
#[command(name = "cadence_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Multi-rate subsystem scheduler running against simulated hardware")]
struct Args {
    /// Controller configuration TOML. Built-in defaults when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Control phase after the initial disabled session.
    #[arg(long, default_value = "teleop")]
    phase: ControlPhase,

    /// Run time in the requested phase, seconds. 0 = until Ctrl-C.
    #[arg(long, default_value_t = 5.0)]
    duration_s: f64,

    /// Shot distance [m].
    #[arg(long, default_value_t = 3.0)]
    distance: f64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Tracing is set up before the config is validated so load errors are
    // visible; the file's log level is read leniently first.
    let shared = args
        .config
        .as_deref()
        .and_then(peek_shared_config)
        .unwrap_or_default();
    setup_tracing(&args, &shared);

    info!("Cadence v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Cadence shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            info!("No --config given, using built-in defaults");
            ControllerConfig::default()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let rig = SimRig::new(&config.simulation, Arc::clone(&clock));

    let shooter = into_handle(Shooter::new(config.shooter.clone(), rig.flywheel, rig.hood));
    let collector = into_handle(Collector::new(
        config.collector.clone(),
        rig.collector_motor,
        rig.collector_solenoid,
    ));

    let mut manager = SubsystemManager::new(Arc::clone(&clock));
    let subsystems: Vec<SharedSubsystem> = vec![
        shooter.clone() as SharedSubsystem,
        collector.clone() as SharedSubsystem,
    ];
    manager.initialize(config.scheduler.base_period_ms, subsystems)?;
    let manager = Arc::new(Mutex::new(manager));

    let mut looper = Looper::new(Arc::clone(&manager), Arc::clone(&clock))
        .with_rt_priority(config.scheduler.rt_priority);
    if config.telemetry.enabled {
        let writer = TelemetryWriter::create(
            Path::new(&config.telemetry.path),
            config.telemetry.interval_ticks,
        )?;
        looper.set_telemetry(Some(writer));
    }

    // Setup signal handler for graceful shutdown.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    // ── Disabled session: every mechanism at safe outputs ──
    looper.start(ControlPhase::Disabled)?;
    std::thread::sleep(Duration::from_millis(200));
    looper.stop()?;

    // ── Requested phase ──
    looper.start(args.phase)?;
    {
        let mut s = shooter.lock();
        s.set_target_distance(args.distance);
        s.set_wanted_state(ShooterWanted::Shoot, REQUESTER);
    }
    collector
        .lock()
        .set_wanted_state(CollectorState::Assessing, REQUESTER);

    let deadline = (args.duration_s > 0.0)
        .then(|| Instant::now() + Duration::from_secs_f64(args.duration_s));
    let mut reported_ready = false;
    let mut reported_assessment = false;
    while running.load(Ordering::SeqCst) && looper.is_running() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run duration elapsed");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));

        if !reported_ready && shooter.lock().ready_to_shoot() {
            info!(distance = args.distance, "Shooter ready to shoot");
            reported_ready = true;
        }
        if !reported_assessment {
            let c = collector.lock();
            if c.is_assessment_complete() {
                match c.assessment_result() {
                    Some(true) => info!("Collector self-test passed"),
                    _ => warn!("Collector self-test failed"),
                }
                reported_assessment = true;
            }
        }
        manager.lock().output_telemetry();
    }

    looper.stop()?;
    manager.lock().on_stop();

    let stats = looper.stats();
    info!(
        cycles = stats.cycle_count,
        overruns = stats.overruns,
        avg_us = stats.avg_cycle_ns() / 1000,
        max_latency_us = stats.max_latency_ns / 1000,
        ready_to_shoot = reported_ready,
        assessment = ?collector.lock().assessment_result(),
        "Run summary"
    );

    if let Some(fault) = looper.take_fault() {
        return Err(fault.into());
    }
    Ok(())
}

/// Read only the `[shared]` section, ignoring every other error.
fn peek_shared_config(path: &Path) -> Option<SharedConfig> {
    #[derive(serde::Deserialize)]
    struct Peek {
        #[serde(default)]
        shared: SharedConfig,
    }
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str::<Peek>(&content).ok().map(|p| p.shared)
}

/// Setup tracing subscriber based on CLI arguments and the config log level.
fn setup_tracing(args: &Args, shared: &SharedConfig) {
    let directive = if args.verbose {
        "debug"
    } else {
        shared.log_level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
