//! Linux i2c-dev bus shared by every sensor.
//!
//! One mutex covers the slave-address switch and the transfer that follows it,
//! so samplers on different threads never interleave halves of a transaction.

use super::{RegisterIo, SensorError};
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default)]
struct BusState {
    device: Option<LinuxI2CDevice>,
    current_addr: Option<u16>,
}

pub struct I2cBus {
    path: PathBuf,
    state: Mutex<BusState>,
}

impl I2cBus {
    /// The device node is checked here; it is opened on the first transfer.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, SensorError> {
        let path = path.as_ref().to_path_buf();
        std::fs::metadata(&path).map_err(|source| SensorError::Open {
            path: path.clone(),
            source,
        })?;

        debug!("Using I2C bus {}", path.display());

        Ok(Arc::new(Self {
            path,
            state: Mutex::new(BusState::default()),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn device(self: &Arc<Self>, addr: u16) -> I2cDevice {
        I2cDevice {
            bus: Arc::clone(self),
            addr,
        }
    }

    pub fn write(&self, addr: u16, bytes: &[u8]) -> Result<(), SensorError> {
        let mut state = self.state.lock().map_err(|_| SensorError::LockPoisoned)?;
        let device = self.select(&mut state, addr)?;
        device.write(bytes).map_err(|e| bus_error(addr, &e))
    }

    pub fn write_read(&self, addr: u16, bytes: &[u8], buf: &mut [u8]) -> Result<(), SensorError> {
        let mut state = self.state.lock().map_err(|_| SensorError::LockPoisoned)?;
        let device = self.select(&mut state, addr)?;
        device.write(bytes).map_err(|e| bus_error(addr, &e))?;
        device.read(buf).map_err(|e| bus_error(addr, &e))
    }

    fn select<'s>(
        &self,
        state: &'s mut BusState,
        addr: u16,
    ) -> Result<&'s mut LinuxI2CDevice, SensorError> {
        if state.device.is_none() {
            let device =
                LinuxI2CDevice::new(&self.path, addr).map_err(|e| bus_error(addr, &e))?;
            debug!("Opened I2C bus {}", self.path.display());
            state.device = Some(device);
            state.current_addr = Some(addr);
        }

        let device = state.device.as_mut().ok_or_else(|| SensorError::Bus {
            addr,
            reason: "bus not open".into(),
        })?;

        if state.current_addr != Some(addr) {
            if let Err(e) = device.set_slave_address(addr) {
                state.current_addr = None;
                return Err(bus_error(addr, &e));
            }
            state.current_addr = Some(addr);
        }

        Ok(device)
    }
}

fn bus_error(addr: u16, e: &LinuxI2CError) -> SensorError {
    SensorError::Bus {
        addr,
        reason: e.to_string(),
    }
}

/// One slave address on a shared [`I2cBus`].
#[derive(Clone)]
pub struct I2cDevice {
    bus: Arc<I2cBus>,
    addr: u16,
}

impl RegisterIo for I2cDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        self.bus.write(self.addr, bytes)
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), SensorError> {
        self.bus.write_read(self.addr, bytes, buf)
    }
}
