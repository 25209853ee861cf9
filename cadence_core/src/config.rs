//! TOML configuration loader with validation.
//!
//! Loads `ControllerConfig` from one TOML file. Every section is optional and
//! falls back to the tuned defaults below. Validates: positive base period,
//! active periods that are multiples of the base period, ordered distance and
//! speed ranges, positive tolerances and durations.

use std::path::Path;

use cadence_common::config::{ConfigError, ConfigLoader, SharedConfig};
use cadence_common::prelude::DEFAULT_BASE_PERIOD_MS;
use cadence_hal::SimulationConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

// ─── Scheduler ──────────────────────────────────────────────────────

/// Looper and manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Looper tick period [ms].
    pub base_period_ms: u64,
    /// SCHED_FIFO priority of the looper thread (`rt` feature only).
    pub rt_priority: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_period_ms: DEFAULT_BASE_PERIOD_MS,
            rt_priority: 80,
        }
    }
}

// ─── Telemetry ──────────────────────────────────────────────────────

/// CSV telemetry output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Output file, truncated on start.
    pub path: String,
    /// Ticks between rows.
    pub interval_ticks: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "cadence_telemetry.csv".to_string(),
            interval_ticks: 1,
        }
    }
}

// ─── Shooter ────────────────────────────────────────────────────────

/// Shooter tunables. Hood positions are encoder ticks above the homed zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShooterConfig {
    /// Period while homing or shooting [ms].
    pub active_period_ms: u64,
    /// Period while holding or disabled [ms]. 0 = dormant until woken.
    pub dormant_period_ms: u64,
    /// Closest shot [m].
    pub min_distance: f64,
    /// Farthest shot [m].
    pub max_distance: f64,
    /// Flywheel speed at `min_distance` [rpm].
    pub min_speed_rpm: f64,
    /// Flywheel speed at `max_distance` [rpm].
    pub max_speed_rpm: f64,
    /// Hood position at `min_distance` [ticks]. Also the parked position.
    pub min_hood: f64,
    /// Hood position at `max_distance` [ticks].
    pub max_hood: f64,
    /// Flywheel speed at 100 % output [rpm].
    pub full_scale_rpm: f64,
    /// Flywheel encoder resolution [ticks / rev].
    pub ticks_per_rev: f64,
    /// Allowed flywheel speed error for a shot [rpm].
    pub speed_tolerance_rpm: f64,
    /// Allowed hood position error for a shot [ticks].
    pub hood_tolerance: f64,
    /// Raw position demand while homing, past the lower hard stop [ticks].
    pub home_target: f64,
    /// Largest per-tick movement still counted as stationary [ticks].
    pub home_movement_threshold: f64,
    /// How long the hood must be stationary to count as homed [ms].
    pub home_dwell_ms: u64,
}

impl Default for ShooterConfig {
    fn default() -> Self {
        Self {
            active_period_ms: 5,
            dormant_period_ms: 100,
            min_distance: 1.0,
            max_distance: 6.0,
            min_speed_rpm: 2500.0,
            max_speed_rpm: 5000.0,
            min_hood: 200.0,
            max_hood: 3500.0,
            full_scale_rpm: 6000.0,
            ticks_per_rev: 2048.0,
            speed_tolerance_rpm: 100.0,
            hood_tolerance: 30.0,
            home_target: -100_000.0,
            home_movement_threshold: 2.0,
            home_dwell_ms: 250,
        }
    }
}

impl ShooterConfig {
    /// Validate shooter parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_distance > self.min_distance) {
            return Err(format!(
                "shooter: max_distance ({}) must exceed min_distance ({})",
                self.max_distance, self.min_distance
            ));
        }
        if self.full_scale_rpm <= 0.0 {
            return Err("shooter: full_scale_rpm must be > 0".to_string());
        }
        for (name, rpm) in [
            ("min_speed_rpm", self.min_speed_rpm),
            ("max_speed_rpm", self.max_speed_rpm),
        ] {
            if !(0.0..=self.full_scale_rpm).contains(&rpm) {
                return Err(format!(
                    "shooter: {name} ({rpm}) outside [0, full_scale_rpm {}]",
                    self.full_scale_rpm
                ));
            }
        }
        if self.ticks_per_rev <= 0.0 {
            return Err("shooter: ticks_per_rev must be > 0".to_string());
        }
        if self.speed_tolerance_rpm <= 0.0 || self.hood_tolerance <= 0.0 {
            return Err("shooter: tolerances must be > 0".to_string());
        }
        if self.home_movement_threshold < 0.0 {
            return Err("shooter: home_movement_threshold must be >= 0".to_string());
        }
        if self.home_dwell_ms == 0 {
            return Err("shooter: home_dwell_ms must be > 0".to_string());
        }
        if self.home_target >= self.min_hood.min(self.max_hood) {
            return Err("shooter: home_target must lie below the hood range".to_string());
        }
        Ok(())
    }
}

// ─── Collector ──────────────────────────────────────────────────────

/// Collector tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Period while assessing, backing, collecting, feeding or manual [ms].
    pub active_period_ms: u64,
    /// Period while holding or disabled [ms]. 0 = dormant until woken.
    pub dormant_period_ms: u64,
    /// Roller output while collecting [-1, 1].
    pub collect_speed: f64,
    /// Roller output while feeding [-1, 1].
    pub feed_speed: f64,
    /// Forward run before reversing in BACKING [ms].
    pub backing_eject_ms: u64,
    /// Self-test duration [ms].
    pub assess_duration_ms: u64,
    /// Roller output during the self-test [-1, 1].
    pub assess_demand: f64,
    /// Encoder travel required to pass the self-test [ticks].
    pub min_assess_movement: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            active_period_ms: 20,
            dormant_period_ms: 100,
            collect_speed: 0.9,
            feed_speed: 0.0,
            backing_eject_ms: 100,
            assess_duration_ms: 250,
            assess_demand: 0.5,
            min_assess_movement: 100.0,
        }
    }
}

impl CollectorConfig {
    /// Validate collector parameters.
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("collect_speed", self.collect_speed),
            ("feed_speed", self.feed_speed),
            ("assess_demand", self.assess_demand),
        ] {
            if !(-1.0..=1.0).contains(&v) {
                return Err(format!("collector: {name} ({v}) outside [-1, 1]"));
            }
        }
        if self.assess_duration_ms == 0 {
            return Err("collector: assess_duration_ms must be > 0".to_string());
        }
        if self.min_assess_movement <= 0.0 {
            return Err("collector: min_assess_movement must be > 0".to_string());
        }
        Ok(())
    }
}

// ─── Controller Config Bundle ───────────────────────────────────────

/// Complete controller configuration, one TOML file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub shared: SharedConfig,
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
    pub shooter: ShooterConfig,
    pub collector: CollectorConfig,
    pub simulation: SimulationConfig,
}

impl ControllerConfig {
    /// Run all validation rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let base = self.scheduler.base_period_ms;
        if base == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler: base_period_ms must be > 0".to_string(),
            ));
        }
        if self.telemetry.interval_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry: interval_ticks must be > 0".to_string(),
            ));
        }

        for (name, period, allow_zero) in [
            ("shooter.active_period_ms", self.shooter.active_period_ms, false),
            ("shooter.dormant_period_ms", self.shooter.dormant_period_ms, true),
            ("collector.active_period_ms", self.collector.active_period_ms, false),
            ("collector.dormant_period_ms", self.collector.dormant_period_ms, true),
        ] {
            validate_period(name, period, base, allow_zero).map_err(ConfigError::ValidationError)?;
        }

        self.shooter.validate().map_err(ConfigError::ValidationError)?;
        self.collector.validate().map_err(ConfigError::ValidationError)?;
        Ok(())
    }
}

fn validate_period(name: &str, period: u64, base: u64, allow_zero: bool) -> Result<(), String> {
    if period == 0 {
        return if allow_zero {
            Ok(())
        } else {
            Err(format!("{name} must be > 0"))
        };
    }
    if period % base != 0 {
        return Err(format!(
            "{name} ({period}) must be a multiple of base_period_ms ({base})"
        ));
    }
    Ok(())
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the controller configuration.
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let config = ControllerConfig::load(path)?;
    config.validate()?;
    info!(
        path = %path.display(),
        service = %config.shared.service_name,
        base_period_ms = config.scheduler.base_period_ms,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse and validate from a TOML string.
pub fn load_config_from_str(content: &str) -> Result<ControllerConfig, ConfigError> {
    let config = ControllerConfig::from_toml(content)?;
    config.validate()?;
    Ok(config)
}
