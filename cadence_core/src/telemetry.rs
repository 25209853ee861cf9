//! Comma-delimited telemetry rows.
//!
//! The manager's combined header is written once, prefixed with `time_ms`,
//! followed by one row every `interval_ticks` ticks. Every row must have as
//! many fields as the header.

use crate::manager::SubsystemManager;
use std::fs::File;
use std::io::{self, Write};
use std::iter;
use std::path::Path;
use tracing::info;

/// Row writer over any byte sink.
pub struct TelemetryWriter {
    csv: csv::Writer<Box<dyn Write + Send>>,
    interval_ticks: u64,
    ticks: u64,
    rows: u64,
    header_written: bool,
}

impl TelemetryWriter {
    /// Writer emitting a row every `interval_ticks` ticks (minimum 1).
    pub fn new(sink: impl Write + Send + 'static, interval_ticks: u64) -> Self {
        let sink: Box<dyn Write + Send> = Box::new(sink);
        Self {
            csv: csv::WriterBuilder::new().from_writer(sink),
            interval_ticks: interval_ticks.max(1),
            ticks: 0,
            rows: 0,
            header_written: false,
        }
    }

    /// CSV file at `path`, truncated if present.
    pub fn create(path: &Path, interval_ticks: u64) -> io::Result<Self> {
        let file = File::create(path)?;
        info!(path = %path.display(), interval_ticks, "Telemetry file opened");
        Ok(Self::new(file, interval_ticks))
    }

    /// Called once per tick. Returns whether a row was written.
    ///
    /// A row whose width differs from the header is rejected.
    pub fn record(&mut self, manager: &SubsystemManager, now_ms: u64) -> io::Result<bool> {
        let due = self.ticks % self.interval_ticks == 0;
        self.ticks += 1;
        if !due {
            return Ok(false);
        }
        if !self.header_written {
            let headers = manager.log_headers();
            self.csv
                .write_record(iter::once("time_ms").chain(headers.split(',')))?;
            self.header_written = true;
        }
        let values = manager.log_values();
        let now = now_ms.to_string();
        self.csv
            .write_record(iter::once(now.as_str()).chain(values.split(',')))?;
        self.rows += 1;
        Ok(true)
    }

    /// Rows written so far, header excluded.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.csv.flush()
    }
}
