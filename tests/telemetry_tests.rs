use chrono::{Local, TimeZone, Utc};
use quadlink::sampler::PeriodicTask;
use quadlink::sensors::InertialReading;
use quadlink::snapshot::{Reading, Snapshot, SnapshotCache};
use quadlink::telemetry::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn imu() -> InertialReading {
    InertialReading {
        accel_m_s2: [0.12345, -0.5, 9.80665],
        gyro_rad_s: [0.0, 0.001, -0.25],
        temp_c: 31.456,
    }
}

#[test]
fn test_row_not_connected() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let row = format_row(&Snapshot::default(), &now);
    assert_eq!(
        row,
        "2024-03-01T12:00:00.000,1709294400.000,NC,NC,NC,NC,NC,NC,NC,NC"
    );
}

#[test]
fn test_row_no_latest() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let snapshot = Snapshot {
        distance: Reading::Stale,
        inertial: Reading::Stale,
        ..Snapshot::default()
    };
    let row = format_row(&snapshot, &now);
    assert!(row.ends_with(",NL,NL,NL,NL,NL,NL,NL,NL"));
}

#[test]
fn test_row_with_values() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let snapshot = Snapshot {
        distance: Reading::Fresh { value: 512, at: 0.0 },
        inertial: Reading::Fresh { value: imu(), at: 0.0 },
        ..Snapshot::default()
    };

    let row = format_row(&snapshot, &now);
    let cells: Vec<&str> = row.split(',').collect();
    assert_eq!(cells.len(), CSV_HEADER.split(',').count());
    assert_eq!(cells[2], "512");
    assert_eq!(cells[3], "0.1235");
    assert_eq!(cells[4], "-0.5000");
    assert_eq!(cells[5], "9.8067");
    assert_eq!(cells[8], "-0.2500");
    assert_eq!(cells[9], "31.46");
}

#[test]
fn test_mixed_sentinels() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let snapshot = Snapshot {
        distance: Reading::Fresh { value: 80, at: 0.0 },
        inertial: Reading::Absent,
        ..Snapshot::default()
    };
    let row = format_row(&snapshot, &now);
    let cells: Vec<&str> = row.split(',').collect();
    assert_eq!(cells[2], "80");
    assert!(cells[3..].iter().all(|c| *c == NOT_CONNECTED));
}

#[test]
fn test_header_written_once_per_file() {
    let dir = TempDir::new().unwrap();
    let day = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

    let mut logger = TelemetryLogger::new(dir.path(), "sensors", Duration::from_millis(100));
    logger.log(&Snapshot::default(), &day).unwrap();
    logger.log(&Snapshot::default(), &day).unwrap();
    assert_eq!(logger.rows_written(), 2);

    // A restarted logger appends to the same day without a second header
    let mut restarted = TelemetryLogger::new(dir.path(), "sensors", Duration::from_millis(100));
    restarted.log(&Snapshot::default(), &day).unwrap();

    let path = dir.path().join("sensors_2024-03-01.csv");
    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);
}

#[test]
fn test_daily_rollover_and_latest_link() {
    let dir = TempDir::new().unwrap();
    let mut logger = TelemetryLogger::new(dir.path(), "sensors", Duration::from_millis(100));

    let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();

    logger.log(&Snapshot::default(), &day1).unwrap();
    let link = logger.latest_link();
    assert_eq!(
        fs::read_link(&link).unwrap().to_str(),
        Some("sensors_2024-03-01.csv")
    );

    logger.log(&Snapshot::default(), &day2).unwrap();
    assert_eq!(
        fs::read_link(&link).unwrap().to_str(),
        Some("sensors_2024-03-02.csv")
    );

    let first = fs::read_to_string(dir.path().join("sensors_2024-03-01.csv")).unwrap();
    let second = fs::read_to_string(&link).unwrap();
    assert_eq!(first.lines().count(), 2);
    assert_eq!(second.lines().count(), 2);
    assert!(second.lines().nth(1).unwrap().starts_with("2024-03-02T00:00:01.000"));

    // No staging link left behind
    assert!(!dir.path().join(".sensors_latest.csv.tmp").exists());
}

#[test]
fn test_unwritable_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();

    let mut logger = TelemetryLogger::new(blocker.join("logs"), "sensors", Duration::from_millis(100));
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert!(matches!(
        logger.log(&Snapshot::default(), &now),
        Err(TelemetryError::Io { .. })
    ));
    assert_eq!(logger.rows_written(), 0);
}

#[test]
fn test_tick_logs_current_snapshot() {
    let dir = TempDir::new().unwrap();
    let cache = SnapshotCache::new();
    cache.set_distance(Reading::fresh(42));

    let mut logger = TelemetryLogger::new(dir.path(), "robot", Duration::from_millis(100));
    assert_eq!(logger.name(), "telemetry");
    logger.tick(&cache);
    assert_eq!(logger.rows_written(), 1);

    let path = logger.file_path(Local::now().date_naive());
    let content = fs::read_to_string(path).unwrap();
    let row = content.lines().nth(1).unwrap();
    assert_eq!(row.split(',').nth(2), Some("42"));
}
