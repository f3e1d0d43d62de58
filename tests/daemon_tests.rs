use quadlink::actuator::ActuatorBridge;
use quadlink::config::Config;
use quadlink::daemon::{Daemon, Devices};
use quadlink::ipc::IpcClient;
use quadlink::protocol::decode_speed;
use quadlink::sensors::{
    InertialReading, InertialSensor, NetworkMode, NetworkProbe, NetworkStatus, RangeSensor,
    SensorError,
};
use quadlink::snapshot::Freshness;
use quadlink::transport::mock::MockConnector;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

struct FixedRanger(u16);

impl RangeSensor for FixedRanger {
    fn data_ready(&mut self) -> Result<bool, SensorError> {
        Ok(true)
    }

    fn read_distance_mm(&mut self) -> Result<u16, SensorError> {
        Ok(self.0)
    }
}

struct LevelImu;

impl InertialSensor for LevelImu {
    fn read(&mut self) -> Result<InertialReading, SensorError> {
        Ok(InertialReading {
            accel_m_s2: [0.0, 0.0, 9.81],
            gyro_rad_s: [0.0; 3],
            temp_c: 28.0,
        })
    }
}

struct Offline;

impl NetworkProbe for Offline {
    fn probe(&mut self) -> NetworkStatus {
        NetworkStatus {
            mode: NetworkMode::Unknown,
            ssid: String::new(),
            ip: String::new(),
        }
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.ipc.socket_path = dir.join("sensors.sock");
    config.ipc.recv_timeout_ms = 50;
    config.telemetry.dir = dir.join("logs");
    config.telemetry.rate_hz = 50.0;
    config.sampling.ranging_hz = 100.0;
    config.sampling.inertial_hz = 100.0;
    config.sampling.power_hz = 50.0;
    config.sampling.network_hz = 20.0;
    config.sampling.panel_hz = 20.0;
    config.actuator.neutral_angle = 95;
    config
}

fn devices() -> Devices {
    Devices {
        ranging: Some(Box::new(FixedRanger(640))),
        inertial: Some(Box::new(LevelImu)),
        power: None,
        network: Box::new(Offline),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_serves_snapshots_and_shuts_down_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let bus = MockConnector::new();

    let daemon = Daemon::start(&config, devices(), Some(ActuatorBridge::new(bus.clone()))).unwrap();
    let socket = daemon.socket_path().to_path_buf();
    assert!(socket.exists());

    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = daemon.cache().snapshot();
    assert_eq!(snapshot.distance.value(), Some(&640));
    assert_eq!(snapshot.power.freshness(), Freshness::Absent);

    let response = IpcClient::new(&socket)
        .with_timeout(Duration::from_secs(2))
        .get()
        .await
        .unwrap();
    assert_eq!(response.distance_mm, Some(640));
    assert_eq!(response.imu.temp_c, Some(28.0));
    assert_eq!(response.state.imu, Freshness::Fresh);

    let report = daemon.shutdown().await;
    assert!(!socket.exists());
    assert_eq!(report.ipc.replies, 1);

    let names: Vec<&str> = report.loops.iter().map(|(name, _)| name.as_str()).collect();
    for expected in ["ranging", "inertial", "power", "network", "status-panel", "telemetry"] {
        assert!(names.contains(&expected), "missing {} in {:?}", expected, names);
    }
    assert!(report.loops.iter().all(|(_, stats)| stats.ticks > 0));

    // Motor stop, then steering servo to neutral
    let sent = bus.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0][1], 0x01);
    assert_eq!(decode_speed([sent[0][3], sent[0][4]]), 0);
    assert_eq!(&sent[1][1..5], &[0x02, 2, 0, 95]);

    let logs = std::fs::read_dir(dir.path().join("logs")).unwrap().count();
    assert!(logs >= 2, "expected a daily file and the latest link");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_without_actuator_or_telemetry() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.telemetry.enabled = false;

    let daemon: Daemon<MockConnector> = Daemon::start(&config, devices(), None).unwrap();
    assert!(daemon.actuator().is_none());

    let stop = daemon.stop_signal();
    assert!(!stop.is_stopped());

    let report = daemon.shutdown().await;
    assert!(stop.is_stopped());
    assert!(report.loops.iter().all(|(name, _)| name != "telemetry"));
    assert!(!dir.path().join("logs").exists());
}

#[tokio::test]
async fn test_daemon_rejects_bad_battery_table() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.power.battery_table = vec![];

    let result: Result<Daemon<MockConnector>, _> = Daemon::start(&config, devices(), None);
    assert!(result.is_err());
}
