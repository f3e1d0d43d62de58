//! VL53L1X time-of-flight ranging sensor.
//!
//! Bring-up follows the vendor's ultra-lite driver: identity check, default
//! configuration block, one VHV calibration cycle, then short distance mode
//! with a 100 ms timing budget in continuous ranging.

use super::{RangeSensor, RegisterIo, SensorError};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub const VL53L1X_ADDR: u16 = 0x29;

const DEVICE: &str = "vl53l1x";

const REG_VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND: u16 = 0x0008;
const REG_VHV_CONFIG_INIT: u16 = 0x000B;
const REG_DEFAULT_CONFIG_START: u16 = 0x002D;
const REG_GPIO_HV_MUX_CTRL: u16 = 0x0030;
const REG_GPIO_TIO_HV_STATUS: u16 = 0x0031;
const REG_PHASECAL_CONFIG_TIMEOUT_MACROP: u16 = 0x004B;
const REG_RANGE_CONFIG_TIMEOUT_MACROP_A: u16 = 0x005E;
const REG_RANGE_CONFIG_VCSEL_PERIOD_A: u16 = 0x0060;
const REG_RANGE_CONFIG_TIMEOUT_MACROP_B: u16 = 0x0061;
const REG_RANGE_CONFIG_VCSEL_PERIOD_B: u16 = 0x0063;
const REG_RANGE_CONFIG_VALID_PHASE_HIGH: u16 = 0x0069;
const REG_SD_CONFIG_WOI_SD0: u16 = 0x0078;
const REG_SD_CONFIG_INITIAL_PHASE_SD0: u16 = 0x007A;
const REG_SYSTEM_INTERRUPT_CLEAR: u16 = 0x0086;
const REG_SYSTEM_MODE_START: u16 = 0x0087;
const REG_RESULT_RANGE_STATUS: u16 = 0x0089;
const REG_RESULT_DISTANCE_MM: u16 = 0x0096;
const REG_MODEL_ID: u16 = 0x010F;

const MODEL_INFO: [u8; 3] = [0xEA, 0xCC, 0x10];
const MODE_START_CONTINUOUS: u8 = 0x40;
const MODE_STOP: u8 = 0x00;
const RANGE_STATUS_VALID: u8 = 0x09;

const DATA_READY_POLLS: u32 = 200;
const DATA_READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Registers 0x2D..=0x87.
const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x02, 0x08, // 0x2D
    0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, // 0x35
    0x00, 0xFF, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, // 0x3D
    0x00, 0x20, 0x0B, 0x00, 0x00, 0x02, 0x0A, 0x21, // 0x45
    0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, // 0x4D
    0x00, 0x00, 0x38, 0xFF, 0x01, 0x00, 0x08, 0x00, // 0x55
    0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1, 0x0D, 0x01, // 0x5D
    0x68, 0x00, 0x80, 0x08, 0xB8, 0x00, 0x00, 0x00, // 0x65
    0x00, 0x0F, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, // 0x6D
    0x00, 0x00, 0x01, 0x0F, 0x0D, 0x0E, 0x0E, 0x00, // 0x75
    0x00, 0x02, 0xC7, 0xFF, 0x9B, 0x00, 0x00, 0x00, // 0x7D
    0x01, 0x00, 0x00, // 0x85
];

pub struct Vl53l1x<R: RegisterIo> {
    io: R,
    /// GPIO level that signals a new sample, read back from the mux control.
    ready_level: u8,
}

impl<R: RegisterIo> Vl53l1x<R> {
    /// Identify, configure and start continuous ranging.
    pub fn open(io: R) -> Result<Self, SensorError> {
        let mut sensor = Self { io, ready_level: 1 };

        let mut model = [0u8; 3];
        sensor.read(REG_MODEL_ID, &mut model)?;
        if model != MODEL_INFO {
            return Err(SensorError::Identity {
                device: DEVICE,
                found: model.to_vec(),
            });
        }

        let mut block = [0u8; 2 + DEFAULT_CONFIGURATION.len()];
        block[..2].copy_from_slice(&REG_DEFAULT_CONFIG_START.to_be_bytes());
        block[2..].copy_from_slice(&DEFAULT_CONFIGURATION);
        sensor.io.write(&block)?;

        sensor.ready_level = sensor.read_ready_level()?;

        // VHV calibration: one throwaway measurement.
        sensor.write_u8(REG_SYSTEM_MODE_START, MODE_START_CONTINUOUS)?;
        sensor.wait_data_ready()?;
        sensor.clear_interrupt()?;
        sensor.write_u8(REG_SYSTEM_MODE_START, MODE_STOP)?;
        sensor.write_u8(REG_VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, 0x09)?;
        sensor.write_u8(REG_VHV_CONFIG_INIT, 0x00)?;

        sensor.configure_short_range()?;

        sensor.clear_interrupt()?;
        sensor.write_u8(REG_SYSTEM_MODE_START, MODE_START_CONTINUOUS)?;

        debug!("VL53L1X ranging started (ready level {})", sensor.ready_level);
        Ok(sensor)
    }

    pub fn into_inner(self) -> R {
        self.io
    }

    fn configure_short_range(&mut self) -> Result<(), SensorError> {
        self.write_u8(REG_PHASECAL_CONFIG_TIMEOUT_MACROP, 0x14)?;
        self.write_u8(REG_RANGE_CONFIG_VCSEL_PERIOD_A, 0x07)?;
        self.write_u8(REG_RANGE_CONFIG_VCSEL_PERIOD_B, 0x05)?;
        self.write_u8(REG_RANGE_CONFIG_VALID_PHASE_HIGH, 0x38)?;
        self.write_u16(REG_SD_CONFIG_WOI_SD0, 0x0705)?;
        self.write_u16(REG_SD_CONFIG_INITIAL_PHASE_SD0, 0x0606)?;
        // 100 ms timing budget
        self.write_u16(REG_RANGE_CONFIG_TIMEOUT_MACROP_A, 0x02E1)?;
        self.write_u16(REG_RANGE_CONFIG_TIMEOUT_MACROP_B, 0x0388)
    }

    fn read_ready_level(&mut self) -> Result<u8, SensorError> {
        let mux = self.read_u8(REG_GPIO_HV_MUX_CTRL)?;
        // Bit 4 set means active-low interrupt.
        Ok(if mux & 0x10 != 0 { 0 } else { 1 })
    }

    fn wait_data_ready(&mut self) -> Result<(), SensorError> {
        for _ in 0..DATA_READY_POLLS {
            if self.data_ready()? {
                return Ok(());
            }
            thread::sleep(DATA_READY_POLL_INTERVAL);
        }
        Err(SensorError::Timeout(DEVICE))
    }

    fn clear_interrupt(&mut self) -> Result<(), SensorError> {
        self.write_u8(REG_SYSTEM_INTERRUPT_CLEAR, 0x01)
    }

    fn read(&mut self, reg: u16, buf: &mut [u8]) -> Result<(), SensorError> {
        self.io.write_read(&reg.to_be_bytes(), buf)
    }

    fn read_u8(&mut self, reg: u16) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, reg: u16) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.read(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write_u8(&mut self, reg: u16, value: u8) -> Result<(), SensorError> {
        let [hi, lo] = reg.to_be_bytes();
        self.io.write(&[hi, lo, value])
    }

    fn write_u16(&mut self, reg: u16, value: u16) -> Result<(), SensorError> {
        let [rh, rl] = reg.to_be_bytes();
        let [vh, vl] = value.to_be_bytes();
        self.io.write(&[rh, rl, vh, vl])
    }
}

impl<R: RegisterIo> RangeSensor for Vl53l1x<R> {
    fn data_ready(&mut self) -> Result<bool, SensorError> {
        let status = self.read_u8(REG_GPIO_TIO_HV_STATUS)?;
        Ok(status & 0x01 == self.ready_level)
    }

    /// Reads the latest result and re-arms the interrupt, valid or not.
    fn read_distance_mm(&mut self) -> Result<u16, SensorError> {
        let status = self.read_u8(REG_RESULT_RANGE_STATUS)?;
        let distance = self.read_u16(REG_RESULT_DISTANCE_MM)?;
        self.clear_interrupt()?;

        if status != RANGE_STATUS_VALID {
            return Err(SensorError::InvalidMeasurement { device: DEVICE, status });
        }
        Ok(distance)
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        self.write_u8(REG_SYSTEM_MODE_START, MODE_STOP)
    }
}
