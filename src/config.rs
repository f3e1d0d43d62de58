//! TOML configuration for the daemon and the CLI.
//!
//! Every section and field has a default, so an empty file (or no file at all)
//! describes a complete setup.

use crate::ipc::DEFAULT_SOCKET_PATH;
use crate::sensors::power::{TableError, DEFAULT_2S_TABLE, DEFAULT_EMA_ALPHA};
use crate::sensors::BatteryTable;
use crate::transport::SpiConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/quadlink/quadlink.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    pub path: PathBuf,
    /// Probe for the VL53L1X at startup.
    pub ranging: bool,
    /// Probe for the MPU-6050 at startup.
    pub inertial: bool,
    /// Probe for the INA219 at startup.
    pub power: bool,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/i2c-1"),
            ranging: true,
            inertial: true,
            power: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub ranging_hz: f64,
    pub inertial_hz: f64,
    pub power_hz: f64,
    pub network_hz: f64,
    pub panel_hz: f64,
    /// Skip ranging ticks until the sensor flags a new sample.
    pub ranging_use_data_ready: bool,
    /// Interfaces searched, in order, for the reported IPv4 address.
    pub network_interfaces: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            ranging_hz: 10.0,
            inertial_hz: 100.0,
            power_hz: 10.0,
            network_hz: 2.0,
            panel_hz: 2.0,
            ranging_use_data_ready: true,
            network_interfaces: vec!["wlan0".into(), "eth0".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub ema_alpha: f32,
    /// `[volts, percent]` rows, strictly ascending by voltage.
    pub battery_table: Vec<(f32, u8)>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            ema_alpha: DEFAULT_EMA_ALPHA,
            battery_table: DEFAULT_2S_TABLE.to_vec(),
        }
    }
}

impl PowerConfig {
    pub fn battery_table(&self) -> Result<BatteryTable, TableError> {
        BatteryTable::new(&self.battery_table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub recv_timeout_ms: u64,
    pub client_timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            recv_timeout_ms: 500,
            client_timeout_ms: 250,
        }
    }
}

impl IpcConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub prefix: String,
    pub rate_hz: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("/var/log/quadlink"),
            prefix: "sensors".into(),
            rate_hz: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Let the daemon hold the command bus and release the actuators on shutdown.
    pub enabled: bool,
    pub neutral_angle: u8,
    pub leg_delay_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            neutral_angle: 90,
            leg_delay_ms: 5,
        }
    }
}

impl ActuatorConfig {
    pub fn leg_delay(&self) -> Duration {
        Duration::from_millis(self.leg_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: SpiConfig,
    pub i2c: I2cConfig,
    pub sampling: SamplingConfig,
    pub power: PowerConfig,
    pub ipc: IpcConfig,
    pub telemetry: TelemetryConfig,
    pub actuator: ActuatorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Every problem found, empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let rates = [
            ("sampling.ranging_hz", self.sampling.ranging_hz),
            ("sampling.inertial_hz", self.sampling.inertial_hz),
            ("sampling.power_hz", self.sampling.power_hz),
            ("sampling.network_hz", self.sampling.network_hz),
            ("sampling.panel_hz", self.sampling.panel_hz),
            ("telemetry.rate_hz", self.telemetry.rate_hz),
        ];
        for (name, hz) in rates {
            if !(hz.is_finite() && hz > 0.0) {
                errors.push(format!("{name} must be a positive rate, got {hz}"));
            }
        }

        if !(0.0..=1.0).contains(&self.power.ema_alpha) {
            errors.push(format!(
                "power.ema_alpha must be within 0..=1, got {}",
                self.power.ema_alpha
            ));
        }
        if let Err(e) = self.power.battery_table() {
            errors.push(format!("power.battery_table: {e}"));
        }

        if self.bus.mode > 3 {
            errors.push(format!("bus.mode must be 0..=3, got {}", self.bus.mode));
        }
        if self.bus.max_speed_hz == 0 {
            errors.push("bus.max_speed_hz cannot be 0".into());
        }

        if self.actuator.neutral_angle > 180 {
            errors.push(format!(
                "actuator.neutral_angle must be 0..=180, got {}",
                self.actuator.neutral_angle
            ));
        }

        if self.ipc.recv_timeout_ms == 0 {
            errors.push("ipc.recv_timeout_ms cannot be 0".into());
        }
        if self.ipc.socket_path.as_os_str().is_empty() {
            errors.push("ipc.socket_path cannot be empty".into());
        }

        if self.telemetry.enabled && self.telemetry.prefix.is_empty() {
            errors.push("telemetry.prefix cannot be empty".into());
        }

        errors
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
