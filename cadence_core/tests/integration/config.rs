//! Integration test: controller configuration files.
//!
//! Validates: the shipped sample loads and matches the built-in defaults,
//! partial files fall back per section, and every rejection surfaces as the
//! right `ConfigError` variant.

use std::fs;
use std::path::{Path, PathBuf};

use cadence_common::config::{ConfigError, LogLevel};
use cadence_core::config::{ControllerConfig, load_config};
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sample_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/controller.toml")
}

#[test]
fn test_sample_config_matches_defaults() {
    let cfg = load_config(&sample_path()).unwrap();
    let mut expected = ControllerConfig::default();
    expected.telemetry.interval_ticks = 4;
    assert_eq!(cfg, expected);
}

#[test]
fn test_partial_file() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(
        tmp.path(),
        "controller.toml",
        r#"
[shared]
log_level = "debug"
service_name = "practice-bot"

[scheduler]
base_period_ms = 10

[shooter]
active_period_ms = 10
max_distance = 8.0

[collector]
active_period_ms = 40
dormant_period_ms = 0

[simulation.collector]
inverted = true
max_velocity = 1000.0
"#,
    );

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.shared.log_level, LogLevel::Debug);
    assert_eq!(cfg.shared.service_name, "practice-bot");
    assert_eq!(cfg.scheduler.base_period_ms, 10);
    assert_eq!(cfg.shooter.max_distance, 8.0);
    assert_eq!(cfg.shooter.min_distance, 1.0);
    assert_eq!(cfg.collector.dormant_period_ms, 0);
    assert_eq!(cfg.simulation.collector.max_velocity, 1000.0);
    assert_eq!(cfg.simulation.hood, ControllerConfig::default().simulation.hood);
}

#[test]
fn test_missing_file() {
    let tmp = TempDir::new().unwrap();
    let err = load_config(&tmp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn test_syntax_error() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "bad.toml", "[scheduler\nbase_period_ms = 5");
    assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_default_periods_must_divide_new_base() {
    // Shooter's default 5 ms active period does not fit a 10 ms base.
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "c.toml", "[scheduler]\nbase_period_ms = 10\n");
    match load_config(&path) {
        Err(ConfigError::ValidationError(msg)) => {
            assert!(msg.contains("shooter.active_period_ms"), "{msg}")
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_reject_zero_telemetry_interval() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "c.toml", "[telemetry]\ninterval_ticks = 0\n");
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::ValidationError(_))
    ));
}
