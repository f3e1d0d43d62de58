//! Wires devices, samplers, the IPC server and the telemetry logger together.

use crate::actuator::ActuatorBridge;
use crate::config::Config;
use crate::display::StatusPanel;
use crate::ipc::server::ServerStats;
use crate::ipc::{IpcError, IpcServer};
use crate::sampler::{
    period_from_hz, spawn_periodic, InertialSampler, LoopStats, NetworkSampler, PeriodicTask,
    PowerSampler, RangingSampler,
};
use crate::sensors::inertial::MPU6050_ADDR;
use crate::sensors::power::{TableError, INA219_ADDR};
use crate::sensors::ranging::VL53L1X_ADDR;
use crate::sensors::{
    I2cBus, Ina219, InertialSensor, Mpu6050, NetworkProbe, PowerSensor, RangeSensor, SensorError,
    SystemNetworkProbe, VoltageFilter, Vl53l1x,
};
use crate::shutdown::StopSignal;
use crate::snapshot::SnapshotCache;
use crate::telemetry::TelemetryLogger;
use crate::transport::{Connector, SpiConnector};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("sensor bus unavailable: {0}")]
    SensorBus(#[source] SensorError),
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("invalid battery table: {0}")]
    BatteryTable(#[from] TableError),
    #[error("cannot start {name} worker: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Sensor handles, built once at startup and moved into their samplers.
pub struct Devices {
    pub ranging: Option<Box<dyn RangeSensor>>,
    pub inertial: Option<Box<dyn InertialSensor>>,
    pub power: Option<Box<dyn PowerSensor>>,
    pub network: Box<dyn NetworkProbe>,
}

impl Devices {
    /// Only the bus itself is required; a sensor that fails to come up is
    /// reported absent for the lifetime of the daemon.
    pub fn open(config: &Config) -> Result<Self, DaemonError> {
        let bus = I2cBus::open(&config.i2c.path).map_err(DaemonError::SensorBus)?;

        let ranging = if config.i2c.ranging {
            installed("VL53L1X", Vl53l1x::open(bus.device(VL53L1X_ADDR)))
                .map(|s| Box::new(s) as Box<dyn RangeSensor>)
        } else {
            None
        };

        let inertial = if config.i2c.inertial {
            installed("MPU-6050", Mpu6050::open(bus.device(MPU6050_ADDR)))
                .map(|s| Box::new(s) as Box<dyn InertialSensor>)
        } else {
            None
        };

        let power = if config.i2c.power {
            installed("INA219", Ina219::open(bus.device(INA219_ADDR)))
                .map(|s| Box::new(s) as Box<dyn PowerSensor>)
        } else {
            None
        };

        let network = Box::new(SystemNetworkProbe::new(
            config.sampling.network_interfaces.clone(),
        ));

        Ok(Self {
            ranging,
            inertial,
            power,
            network,
        })
    }
}

fn installed<T>(name: &str, result: Result<T, SensorError>) -> Option<T> {
    match result {
        Ok(sensor) => {
            info!("{} ready", name);
            Some(sensor)
        }
        Err(e) => {
            warn!("{} not available: {}", name, e);
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub loops: Vec<(String, LoopStats)>,
    pub ipc: ServerStats,
}

pub struct Daemon<C: Connector = SpiConnector> {
    cache: Arc<SnapshotCache>,
    stop: StopSignal,
    workers: Vec<(String, JoinHandle<LoopStats>)>,
    ipc: Option<tokio::task::JoinHandle<ServerStats>>,
    socket_path: PathBuf,
    actuator: Option<ActuatorBridge<C>>,
    neutral_angle: u8,
}

impl<C: Connector> Daemon<C> {
    /// Bind the IPC socket and start every worker. Must run inside a tokio runtime.
    pub fn start(
        config: &Config,
        devices: Devices,
        actuator: Option<ActuatorBridge<C>>,
    ) -> Result<Self, DaemonError> {
        let cache = Arc::new(SnapshotCache::new());
        let stop = StopSignal::new();
        let battery_table = config.power.battery_table()?;

        let server = IpcServer::bind(&config.ipc.socket_path, Arc::clone(&cache))?
            .with_recv_timeout(config.ipc.recv_timeout());
        let socket_path = server.path().to_path_buf();

        let sampling = &config.sampling;
        let mut tasks: Vec<Box<dyn PeriodicTask>> = vec![
            Box::new(
                RangingSampler::new(devices.ranging, period_from_hz(sampling.ranging_hz))
                    .use_data_ready(sampling.ranging_use_data_ready),
            ),
            Box::new(InertialSampler::new(
                devices.inertial,
                period_from_hz(sampling.inertial_hz),
            )),
            Box::new(PowerSampler::new(
                devices.power,
                period_from_hz(sampling.power_hz),
                VoltageFilter::new(config.power.ema_alpha),
                battery_table,
            )),
            Box::new(NetworkSampler::new(
                devices.network,
                period_from_hz(sampling.network_hz),
            )),
            Box::new(StatusPanel::new(period_from_hz(sampling.panel_hz))),
        ];

        if config.telemetry.enabled {
            tasks.push(Box::new(TelemetryLogger::new(
                &config.telemetry.dir,
                config.telemetry.prefix.clone(),
                period_from_hz(config.telemetry.rate_hz),
            )));
        }

        let mut workers = Vec::with_capacity(tasks.len());
        for task in tasks {
            let name = task.name().to_string();
            match spawn_periodic(task, Arc::clone(&cache), stop.clone()) {
                Ok(handle) => workers.push((name, handle)),
                Err(source) => {
                    stop.stop();
                    for (_, handle) in workers {
                        let _ = handle.join();
                    }
                    return Err(DaemonError::Spawn { name, source });
                }
            }
        }

        let ipc_stop = stop.clone();
        let ipc = tokio::spawn(async move {
            let stats = server.run(ipc_stop).await;
            // Dropping the server unlinks the socket file.
            drop(server);
            stats
        });

        info!("Daemon started with {} workers", workers.len());

        Ok(Self {
            cache,
            stop,
            workers,
            ipc: Some(ipc),
            socket_path,
            actuator,
            neutral_angle: config.actuator.neutral_angle,
        })
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    pub fn actuator(&self) -> Option<&ActuatorBridge<C>> {
        self.actuator.as_ref()
    }

    /// Stop and join every worker, remove the socket, then release the actuators.
    /// Failures here are logged, never returned.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Shutting down");
        self.stop.stop();

        let mut report = ShutdownReport::default();

        let workers = std::mem::take(&mut self.workers);
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(|(name, handle)| {
                    let stats = handle.join().unwrap_or_else(|_| {
                        warn!("{} worker panicked", name);
                        LoopStats::default()
                    });
                    (name, stats)
                })
                .collect::<Vec<_>>()
        })
        .await;
        match joined {
            Ok(loops) => report.loops = loops,
            Err(e) => warn!("Joining workers failed: {}", e),
        }

        if let Some(ipc) = self.ipc.take() {
            match ipc.await {
                Ok(stats) => report.ipc = stats,
                Err(e) => warn!("IPC server task failed: {}", e),
            }
        }

        if let Some(actuator) = self.actuator.take() {
            if let Err(e) = actuator.release(self.neutral_angle) {
                warn!("Actuator release incomplete: {}", e);
            }
            actuator.close();
        }

        info!("Shutdown complete");
        report
    }
}
