//! Sensor drivers behind small traits so the samplers can run against fakes.

pub mod bus;
pub mod inertial;
pub mod network;
pub mod power;
pub mod ranging;

pub use bus::{I2cBus, I2cDevice};
pub use inertial::Mpu6050;
pub use network::{NetworkMode, NetworkStatus, SystemNetworkProbe};
pub use power::{BatteryTable, Ina219, PowerReading, VoltageFilter};
pub use ranging::Vl53l1x;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("cannot open I2C bus {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I2C transfer to 0x{addr:02X} failed: {reason}")]
    Bus { addr: u16, reason: String },
    #[error("{device}: unexpected identity {found:02X?}")]
    Identity { device: &'static str, found: Vec<u8> },
    #[error("{device}: no fresh measurement (status {status})")]
    InvalidMeasurement { device: &'static str, status: u8 },
    #[error("{0}: timed out")]
    Timeout(&'static str),
    #[error("I2C bus lock poisoned")]
    LockPoisoned,
}

/// Register-level access to one device. [`I2cDevice`] is the hardware
/// implementation; tests substitute register maps.
pub trait RegisterIo: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError>;

    /// Write `bytes` (usually a register address) then fill `buf`.
    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), SensorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialReading {
    pub accel_m_s2: [f32; 3],
    pub gyro_rad_s: [f32; 3],
    pub temp_c: f32,
}

/// Unfiltered electrical sample from the power monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub bus_voltage_v: f32,
    pub current_ma: f32,
    pub power_mw: f32,
}

pub trait RangeSensor: Send {
    fn data_ready(&mut self) -> Result<bool, SensorError>;

    fn read_distance_mm(&mut self) -> Result<u16, SensorError>;

    fn stop(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

pub trait InertialSensor: Send {
    fn read(&mut self) -> Result<InertialReading, SensorError>;
}

pub trait PowerSensor: Send {
    fn read(&mut self) -> Result<PowerSample, SensorError>;
}

/// Best-effort; probes never fail, they report what they could find.
pub trait NetworkProbe: Send {
    fn probe(&mut self) -> NetworkStatus;
}
