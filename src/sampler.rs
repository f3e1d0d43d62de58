//! Fixed-rate loops that poll one sensor each and publish into the snapshot.

use crate::sensors::{
    BatteryTable, InertialSensor, NetworkProbe, PowerReading, PowerSensor, RangeSensor, SensorError,
    VoltageFilter,
};
use crate::shutdown::StopSignal;
use crate::snapshot::{Freshness, Reading, SnapshotCache};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Slowest rate a loop will run at, whatever it is configured with.
const MIN_RATE_HZ: f64 = 0.01;

pub fn period_from_hz(hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(MIN_RATE_HZ))
}

/// One unit of periodic work against the shared snapshot.
pub trait PeriodicTask: Send {
    fn name(&self) -> &str;

    fn period(&self) -> Duration;

    fn tick(&mut self, cache: &SnapshotCache);

    /// Runs once after the loop has stopped.
    fn finish(&mut self) {}
}

impl<T: PeriodicTask + ?Sized> PeriodicTask for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn period(&self) -> Duration {
        (**self).period()
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        (**self).tick(cache)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub ticks: u64,
    /// Ticks that took longer than the period.
    pub overruns: u64,
}

/// Tick, then sleep out the rest of the period, until `stop` fires.
pub fn run_periodic<T>(task: &mut T, cache: &SnapshotCache, stop: &StopSignal) -> LoopStats
where
    T: PeriodicTask + ?Sized,
{
    let mut stats = LoopStats::default();
    let period = task.period();

    while !stop.is_stopped() {
        let started = Instant::now();
        task.tick(cache);
        stats.ticks += 1;

        let elapsed = started.elapsed();
        if elapsed > period {
            stats.overruns += 1;
            trace!("{} overran its period: {:?} > {:?}", task.name(), elapsed, period);
        }

        if !stop.sleep(period.saturating_sub(elapsed)) {
            break;
        }
    }

    task.finish();
    debug!("{} stopped after {} ticks ({} overruns)", task.name(), stats.ticks, stats.overruns);
    stats
}

/// Run `task` on its own named OS thread.
pub fn spawn_periodic<T>(
    mut task: T,
    cache: Arc<SnapshotCache>,
    stop: StopSignal,
) -> io::Result<JoinHandle<LoopStats>>
where
    T: PeriodicTask + 'static,
{
    let name = task.name().to_string();
    thread::Builder::new()
        .name(name)
        .spawn(move || run_periodic(&mut task, &cache, &stop))
}

/// Logs freshness transitions once instead of on every tick.
#[derive(Debug)]
struct HealthLog {
    name: &'static str,
    last: Option<Freshness>,
}

impl HealthLog {
    fn new(name: &'static str) -> Self {
        Self { name, last: None }
    }

    fn observe(&mut self, now: Freshness, error: Option<&SensorError>) {
        if self.last == Some(now) {
            return;
        }
        match now {
            Freshness::Fresh if self.last.is_some() => info!("{}: readings resumed", self.name),
            Freshness::Fresh => debug!("{}: first reading", self.name),
            Freshness::Stale => match error {
                Some(e) => warn!("{}: read failed: {}", self.name, e),
                None => warn!("{}: no fresh reading", self.name),
            },
            Freshness::Absent => info!("{}: sensor not installed, reporting absent", self.name),
        }
        self.last = Some(now);
    }
}

pub struct RangingSampler {
    sensor: Option<Box<dyn RangeSensor>>,
    period: Duration,
    use_data_ready: bool,
    has_sample: bool,
    health: HealthLog,
}

impl RangingSampler {
    pub fn new(sensor: Option<Box<dyn RangeSensor>>, period: Duration) -> Self {
        Self {
            sensor,
            period,
            use_data_ready: true,
            has_sample: false,
            health: HealthLog::new("ranging"),
        }
    }

    /// When set (the default), a tick with no new sample leaves the previous value
    /// alone, or reports stale until the first sample arrives.
    pub fn use_data_ready(mut self, enabled: bool) -> Self {
        self.use_data_ready = enabled;
        self
    }
}

impl PeriodicTask for RangingSampler {
    fn name(&self) -> &str {
        "ranging"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let Some(sensor) = self.sensor.as_mut() else {
            self.health.observe(Freshness::Absent, None);
            cache.set_distance(Reading::Absent);
            return;
        };

        if self.use_data_ready {
            match sensor.data_ready() {
                Ok(true) => {}
                Ok(false) => {
                    if !self.has_sample {
                        cache.set_distance(Reading::Stale);
                    }
                    return;
                }
                Err(e) => {
                    self.health.observe(Freshness::Stale, Some(&e));
                    cache.set_distance(Reading::Stale);
                    return;
                }
            }
        }

        let reading = match sensor.read_distance_mm() {
            Ok(mm) => {
                self.health.observe(Freshness::Fresh, None);
                self.has_sample = true;
                Reading::fresh(mm)
            }
            Err(e) => {
                self.health.observe(Freshness::Stale, Some(&e));
                Reading::Stale
            }
        };
        cache.set_distance(reading);
    }

    fn finish(&mut self) {
        if let Some(sensor) = self.sensor.as_mut() {
            if let Err(e) = sensor.stop() {
                warn!("ranging: stop failed: {}", e);
            }
        }
    }
}

pub struct InertialSampler {
    sensor: Option<Box<dyn InertialSensor>>,
    period: Duration,
    health: HealthLog,
}

impl InertialSampler {
    pub fn new(sensor: Option<Box<dyn InertialSensor>>, period: Duration) -> Self {
        Self {
            sensor,
            period,
            health: HealthLog::new("inertial"),
        }
    }
}

impl PeriodicTask for InertialSampler {
    fn name(&self) -> &str {
        "inertial"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let reading = match self.sensor.as_mut().map(|s| s.read()) {
            None => {
                self.health.observe(Freshness::Absent, None);
                Reading::Absent
            }
            Some(Ok(value)) => {
                self.health.observe(Freshness::Fresh, None);
                Reading::fresh(value)
            }
            Some(Err(e)) => {
                self.health.observe(Freshness::Stale, Some(&e));
                Reading::Stale
            }
        };
        cache.set_inertial(reading);
    }
}

/// Filters the bus voltage and maps it to a battery percentage.
pub struct PowerSampler {
    sensor: Option<Box<dyn PowerSensor>>,
    period: Duration,
    filter: VoltageFilter,
    table: BatteryTable,
    health: HealthLog,
}

impl PowerSampler {
    pub fn new(
        sensor: Option<Box<dyn PowerSensor>>,
        period: Duration,
        filter: VoltageFilter,
        table: BatteryTable,
    ) -> Self {
        Self {
            sensor,
            period,
            filter,
            table,
            health: HealthLog::new("power"),
        }
    }
}

impl PeriodicTask for PowerSampler {
    fn name(&self) -> &str {
        "power"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let reading = match self.sensor.as_mut().map(|s| s.read()) {
            None => {
                self.health.observe(Freshness::Absent, None);
                Reading::Absent
            }
            Some(Ok(sample)) => {
                self.health.observe(Freshness::Fresh, None);
                Reading::fresh(PowerReading::from_sample(sample, &mut self.filter, &self.table))
            }
            Some(Err(e)) => {
                self.health.observe(Freshness::Stale, Some(&e));
                Reading::Stale
            }
        };
        cache.set_power(reading);
    }
}

pub struct NetworkSampler {
    probe: Box<dyn NetworkProbe>,
    period: Duration,
}

impl NetworkSampler {
    pub fn new(probe: Box<dyn NetworkProbe>, period: Duration) -> Self {
        Self { probe, period }
    }
}

impl PeriodicTask for NetworkSampler {
    fn name(&self) -> &str {
        "network"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let status = self.probe.probe();
        trace!("network: {} {:?} {:?}", status.mode, status.ssid, status.ip);
        cache.set_network(status);
    }
}
