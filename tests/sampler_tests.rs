use quadlink::sampler::*;
use quadlink::sensors::{
    BatteryTable, InertialReading, InertialSensor, NetworkMode, NetworkProbe, NetworkStatus,
    PowerSample, PowerSensor, RangeSensor, SensorError, VoltageFilter,
};
use quadlink::shutdown::StopSignal;
use quadlink::snapshot::{Freshness, Reading, SnapshotCache};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted ranging sensor; an empty script keeps failing.
struct ScriptedRanger {
    ready: VecDeque<bool>,
    distances: VecDeque<Result<u16, SensorError>>,
    stopped: Arc<AtomicBool>,
}

impl ScriptedRanger {
    fn new(ready: &[bool], distances: Vec<Result<u16, SensorError>>) -> Self {
        Self {
            ready: ready.iter().copied().collect(),
            distances: distances.into(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl RangeSensor for ScriptedRanger {
    fn data_ready(&mut self) -> Result<bool, SensorError> {
        Ok(self.ready.pop_front().unwrap_or(true))
    }

    fn read_distance_mm(&mut self) -> Result<u16, SensorError> {
        self.distances
            .pop_front()
            .unwrap_or(Err(SensorError::Timeout("scripted")))
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FlakyImu {
    calls: usize,
}

impl InertialSensor for FlakyImu {
    fn read(&mut self) -> Result<InertialReading, SensorError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(SensorError::Bus {
                addr: 0x68,
                reason: "nack".into(),
            });
        }
        Ok(InertialReading {
            accel_m_s2: [0.0, 0.0, 9.81],
            gyro_rad_s: [0.0; 3],
            temp_c: 25.0,
        })
    }
}

struct SteadyPower(f32);

impl PowerSensor for SteadyPower {
    fn read(&mut self) -> Result<PowerSample, SensorError> {
        Ok(PowerSample {
            bus_voltage_v: self.0,
            current_ma: 500.0,
            power_mw: 3700.0,
        })
    }
}

struct FixedNetwork(Arc<AtomicUsize>);

impl NetworkProbe for FixedNetwork {
    fn probe(&mut self) -> NetworkStatus {
        self.0.fetch_add(1, Ordering::SeqCst);
        NetworkStatus {
            mode: NetworkMode::Station,
            ssid: "workshop".into(),
            ip: "192.168.1.20".into(),
        }
    }
}

const PERIOD: Duration = Duration::from_millis(5);

#[test]
fn test_period_from_hz() {
    assert_eq!(period_from_hz(10.0), Duration::from_millis(100));
    assert_eq!(period_from_hz(0.0), period_from_hz(0.01));
    assert_eq!(period_from_hz(-5.0), Duration::from_secs(100));
}

#[test]
fn test_absent_sensors_report_absent() {
    let cache = SnapshotCache::new();

    RangingSampler::new(None, PERIOD).tick(&cache);
    InertialSampler::new(None, PERIOD).tick(&cache);
    PowerSampler::new(None, PERIOD, VoltageFilter::default(), BatteryTable::default()).tick(&cache);

    let snap = cache.snapshot();
    assert_eq!(snap.distance, Reading::Absent);
    assert_eq!(snap.inertial, Reading::Absent);
    assert_eq!(snap.power, Reading::Absent);
    assert_eq!(snap.timestamp, 0.0);
}

#[test]
fn test_ranging_skips_until_data_ready() {
    let cache = SnapshotCache::new();
    let sensor = ScriptedRanger::new(&[false, true, false], vec![Ok(420), Ok(999)]);
    let mut sampler = RangingSampler::new(Some(Box::new(sensor)), PERIOD);

    // Installed but no first frame yet
    sampler.tick(&cache);
    assert_eq!(cache.snapshot().distance, Reading::Stale);
    assert_eq!(cache.snapshot().timestamp, 0.0);

    sampler.tick(&cache);
    let snap = cache.snapshot();
    assert_eq!(snap.distance.value(), Some(&420));
    assert!(snap.timestamp > 0.0);

    // Not ready again: previous value stays
    sampler.tick(&cache);
    assert_eq!(cache.snapshot().distance, snap.distance);
}

#[test]
fn test_ranging_failure_goes_stale() {
    let cache = SnapshotCache::new();
    let sensor = ScriptedRanger::new(
        &[],
        vec![
            Ok(100),
            Err(SensorError::InvalidMeasurement {
                device: "vl53l1x",
                status: 4,
            }),
            Ok(120),
        ],
    );
    let mut sampler = RangingSampler::new(Some(Box::new(sensor)), PERIOD);

    sampler.tick(&cache);
    assert_eq!(cache.snapshot().distance.value(), Some(&100));
    let fresh_ts = cache.snapshot().timestamp;

    sampler.tick(&cache);
    let snap = cache.snapshot();
    assert_eq!(snap.distance, Reading::Stale);
    assert_eq!(snap.timestamp, fresh_ts);

    sampler.tick(&cache);
    assert_eq!(cache.snapshot().distance.value(), Some(&120));
}

#[test]
fn test_ranging_without_data_ready_reads_every_tick() {
    let cache = SnapshotCache::new();
    let sensor = ScriptedRanger::new(&[false, false], vec![Ok(10), Ok(11)]);
    let mut sampler = RangingSampler::new(Some(Box::new(sensor)), PERIOD).use_data_ready(false);

    sampler.tick(&cache);
    sampler.tick(&cache);
    assert_eq!(cache.snapshot().distance.value(), Some(&11));
}

#[test]
fn test_inertial_alternates_fresh_and_stale() {
    let cache = SnapshotCache::new();
    let mut sampler = InertialSampler::new(Some(Box::new(FlakyImu { calls: 0 })), PERIOD);

    sampler.tick(&cache);
    assert_eq!(cache.snapshot().inertial.freshness(), Freshness::Fresh);
    sampler.tick(&cache);
    assert_eq!(cache.snapshot().inertial.freshness(), Freshness::Stale);
    sampler.tick(&cache);
    assert_eq!(cache.snapshot().inertial.freshness(), Freshness::Fresh);
}

#[test]
fn test_power_sampler_fills_percentage() {
    let cache = SnapshotCache::new();
    let table = BatteryTable::new(&[(6.0, 0), (8.0, 100)]).unwrap();
    let mut sampler = PowerSampler::new(
        Some(Box::new(SteadyPower(7.0))),
        PERIOD,
        VoltageFilter::default(),
        table,
    );

    sampler.tick(&cache);
    let snap = cache.snapshot();
    let power = snap.power.value().unwrap();
    assert_eq!(power.battery_percent, 50);
    assert_eq!(power.bus_voltage_v_filt, 7.0);
}

#[test]
fn test_network_sampler_updates_status() {
    let cache = SnapshotCache::new();
    let probes = Arc::new(AtomicUsize::new(0));
    let mut sampler = NetworkSampler::new(Box::new(FixedNetwork(Arc::clone(&probes))), PERIOD);

    sampler.tick(&cache);
    let snap = cache.snapshot();
    assert_eq!(snap.network.mode, NetworkMode::Station);
    assert_eq!(snap.network.ssid, "workshop");
    assert_eq!(probes.load(Ordering::SeqCst), 1);
    assert!(snap.timestamp > 0.0);
}

#[test]
fn test_spawned_loop_stops_and_finishes() {
    let cache = Arc::new(SnapshotCache::new());
    let stop = StopSignal::new();
    let sensor = ScriptedRanger::new(&[], (0..1000).map(Ok).collect());
    let stopped = Arc::clone(&sensor.stopped);

    let handle = spawn_periodic(
        RangingSampler::new(Some(Box::new(sensor)), PERIOD),
        Arc::clone(&cache),
        stop.clone(),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(60));
    stop.stop();
    let stats = handle.join().unwrap();

    assert!(stats.ticks >= 2);
    assert!(stopped.load(Ordering::SeqCst));
    assert!(cache.snapshot().distance.is_fresh());
}

#[test]
fn test_stop_signal_interrupts_sleep() {
    let stop = StopSignal::new();
    assert!(stop.sleep(Duration::from_millis(5)));

    let remote = stop.clone();
    let waker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        remote.stop();
    });

    let started = std::time::Instant::now();
    assert!(!stop.sleep(Duration::from_secs(10)));
    assert!(started.elapsed() < Duration::from_secs(2));
    waker.join().unwrap();
}
