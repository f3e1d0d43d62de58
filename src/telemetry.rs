//! Daily CSV log of distance and IMU readings.
//!
//! One file per local day, `<prefix>_<YYYY-MM-DD>.csv`, with a
//! `<prefix>_latest.csv` symlink repointed at each rollover. Cells hold `NC`
//! when the sensor is not connected and `NL` when it has no latest value.

use crate::sampler::PeriodicTask;
use crate::snapshot::{Reading, Snapshot, SnapshotCache};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CSV_HEADER: &str = "datetime,unix_ts,distance_mm,ax,ay,az,gx,gy,gz,temp_c";
pub const NOT_CONNECTED: &str = "NC";
pub const NO_LATEST: &str = "NL";

const IMU_COLUMNS: usize = 7;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

struct DailyFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

pub struct TelemetryLogger {
    dir: PathBuf,
    prefix: String,
    period: Duration,
    current: Option<DailyFile>,
    rows: u64,
    failing: bool,
}

impl TelemetryLogger {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, period: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            period,
            current: None,
            rows: 0,
            failing: false,
        }
    }

    pub fn file_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", self.prefix, date.format("%Y-%m-%d")))
    }

    pub fn latest_link(&self) -> PathBuf {
        self.dir.join(format!("{}_latest.csv", self.prefix))
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append one row stamped `now`, rolling over to a new file when the local date changes.
    pub fn log<Tz: TimeZone>(&mut self, snapshot: &Snapshot, now: &DateTime<Tz>) -> Result<(), TelemetryError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let date = now.date_naive();
        if self.current.as_ref().map(|c| c.date) != Some(date) {
            self.rotate(date)?;
        }

        let row = format_row(snapshot, now);
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        writeln!(current.file, "{row}")
            .and_then(|_| current.file.flush())
            .map_err(|source| TelemetryError::Io {
                path: current.path.clone(),
                source,
            })?;

        self.rows += 1;
        Ok(())
    }

    fn rotate(&mut self, date: NaiveDate) -> Result<(), TelemetryError> {
        let path = self.file_path(date);
        let io_err = |source: io::Error| TelemetryError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        if file.metadata().map_err(io_err)?.len() == 0 {
            writeln!(file, "{CSV_HEADER}").map_err(io_err)?;
        }

        self.repoint_latest(&path)?;

        info!("Telemetry logging to {}", path.display());
        self.current = Some(DailyFile { date, path, file });
        Ok(())
    }

    /// Build the new link beside the old one and rename it into place.
    fn repoint_latest(&self, target: &Path) -> Result<(), TelemetryError> {
        let link = self.latest_link();
        let staging = self.dir.join(format!(".{}_latest.csv.tmp", self.prefix));
        let io_err = |source: io::Error| TelemetryError::Io {
            path: link.clone(),
            source,
        };

        // Relative target so the directory can be moved or mounted elsewhere.
        let relative = target.file_name().map(PathBuf::from).unwrap_or_else(|| target.to_path_buf());

        match fs::remove_file(&staging) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(io_err(e)),
            _ => {}
        }
        symlink(&relative, &staging).map_err(io_err)?;
        fs::rename(&staging, &link).map_err(io_err)?;

        debug!("{} -> {}", link.display(), relative.display());
        Ok(())
    }
}

impl PeriodicTask for TelemetryLogger {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let snapshot = cache.snapshot();
        match self.log(&snapshot, &Local::now()) {
            Ok(()) => {
                if self.failing {
                    info!("Telemetry logging resumed");
                    self.failing = false;
                }
            }
            Err(e) => {
                if !self.failing {
                    warn!("Telemetry logging failed: {}", e);
                    self.failing = true;
                }
                // Reopen on the next tick.
                self.current = None;
            }
        }
    }
}

/// One CSV line (no newline) for `snapshot` logged at `now`.
pub fn format_row<Tz: TimeZone>(snapshot: &Snapshot, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut row = String::with_capacity(96);
    let unix_ts = now.timestamp_millis() as f64 / 1000.0;
    let _ = write!(row, "{},{:.3},", now.format("%Y-%m-%dT%H:%M:%S%.3f"), unix_ts);

    match &snapshot.distance {
        Reading::Fresh { value, .. } => {
            let _ = write!(row, "{value}");
        }
        Reading::Stale => row.push_str(NO_LATEST),
        Reading::Absent => row.push_str(NOT_CONNECTED),
    }

    match &snapshot.inertial {
        Reading::Fresh { value, .. } => {
            for v in value.accel_m_s2.iter().chain(value.gyro_rad_s.iter()) {
                let _ = write!(row, ",{v:.4}");
            }
            let _ = write!(row, ",{:.2}", value.temp_c);
        }
        other => {
            let cell = if matches!(other, Reading::Stale) { NO_LATEST } else { NOT_CONNECTED };
            for _ in 0..IMU_COLUMNS {
                row.push(',');
                row.push_str(cell);
            }
        }
    }

    row
}
