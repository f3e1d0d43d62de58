use super::{PowerSample, PowerSensor, RegisterIo, SensorError};
use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

pub const INA219_ADDR: u16 = 0x40;

const REG_CONFIG: u8 = 0x00;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_POWER: u8 = 0x03;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

/// 32 V bus range, /8 gain, 12-bit ADCs, shunt and bus continuous.
const CONFIG_32V_2A: u16 = 0x399F;
/// 0.1 mA current LSB with the 0.1 Ω shunt.
const CALIBRATION_32V_2A: u16 = 4096;
const CURRENT_LSB_MA: f32 = 0.1;
const POWER_LSB_MW: f32 = 2.0;
const BUS_VOLTAGE_LSB_MV: f32 = 4.0;

pub const DEFAULT_EMA_ALPHA: f32 = 0.25;
pub const MAX_TABLE_ROWS: usize = 16;

/// 2S Li-ion pack voltage to state of charge.
pub const DEFAULT_2S_TABLE: [(f32, u8); 10] = [
    (6.40, 0),
    (6.60, 5),
    (6.80, 10),
    (7.00, 20),
    (7.20, 35),
    (7.40, 50),
    (7.60, 65),
    (7.80, 80),
    (8.00, 92),
    (8.20, 100),
];

/// INA219 power monitor.
pub struct Ina219<R: RegisterIo> {
    io: R,
}

impl<R: RegisterIo> Ina219<R> {
    pub fn open(mut io: R) -> Result<Self, SensorError> {
        write_u16(&mut io, REG_CONFIG, CONFIG_32V_2A)?;
        write_u16(&mut io, REG_CALIBRATION, CALIBRATION_32V_2A)?;
        Ok(Self { io })
    }

    pub fn into_inner(self) -> R {
        self.io
    }
}

impl<R: RegisterIo> PowerSensor for Ina219<R> {
    fn read(&mut self) -> Result<PowerSample, SensorError> {
        let bus_raw = read_u16(&mut self.io, REG_BUS_VOLTAGE)? >> 3;
        let current_raw = read_u16(&mut self.io, REG_CURRENT)? as i16;
        let power_raw = read_u16(&mut self.io, REG_POWER)?;

        Ok(PowerSample {
            bus_voltage_v: f32::from(bus_raw) * BUS_VOLTAGE_LSB_MV / 1000.0,
            current_ma: f32::from(current_raw) * CURRENT_LSB_MA,
            power_mw: f32::from(power_raw) * POWER_LSB_MW,
        })
    }
}

fn write_u16<R: RegisterIo>(io: &mut R, reg: u8, value: u16) -> Result<(), SensorError> {
    let [hi, lo] = value.to_be_bytes();
    io.write(&[reg, hi, lo])
}

fn read_u16<R: RegisterIo>(io: &mut R, reg: u8) -> Result<u16, SensorError> {
    let mut buf = [0u8; 2];
    io.write_read(&[reg], &mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Exponential moving average over the bus voltage.
#[derive(Debug, Clone)]
pub struct VoltageFilter {
    alpha: f32,
    value: Option<f32>,
}

impl VoltageFilter {
    /// `alpha` is clamped to `[0, 1]`; higher follows the raw signal more closely.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_nan() { DEFAULT_EMA_ALPHA } else { alpha.clamp(0.0, 1.0) };
        Self { alpha, value: None }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// The first sample seeds the filter unchanged.
    pub fn update(&mut self, raw: f32) -> f32 {
        let next = match self.value {
            None => raw,
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

impl Default for VoltageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EMA_ALPHA)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("battery table is empty")]
    Empty,
    #[error("battery table has {0} rows, at most 16 are supported")]
    TooManyRows(usize),
    #[error("battery table row {0} is not strictly above the previous voltage")]
    NotAscending(usize),
    #[error("battery table row {0} has a percentage above 100")]
    PercentOutOfRange(usize),
}

/// Piecewise-linear voltage to percentage lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryTable {
    rows: HVec<(f32, u8), MAX_TABLE_ROWS>,
}

impl BatteryTable {
    pub fn new(rows: &[(f32, u8)]) -> Result<Self, TableError> {
        if rows.is_empty() {
            return Err(TableError::Empty);
        }
        if rows.len() > MAX_TABLE_ROWS {
            return Err(TableError::TooManyRows(rows.len()));
        }

        let mut table = HVec::new();
        for (i, &(volts, percent)) in rows.iter().enumerate() {
            if percent > 100 {
                return Err(TableError::PercentOutOfRange(i));
            }
            if let Some(&(prev, _)) = table.last() {
                if volts.partial_cmp(&prev) != Some(Ordering::Greater) {
                    return Err(TableError::NotAscending(i));
                }
            }
            table
                .push((volts, percent))
                .map_err(|_| TableError::TooManyRows(rows.len()))?;
        }

        Ok(Self { rows: table })
    }

    pub fn rows(&self) -> &[(f32, u8)] {
        &self.rows
    }

    pub fn percent(&self, volts: f32) -> u8 {
        let (first_v, first_p) = self.rows[0];
        let (last_v, last_p) = self.rows[self.rows.len() - 1];

        if volts.is_nan() || volts <= first_v {
            return first_p;
        }
        if volts >= last_v {
            return last_p;
        }

        for pair in self.rows.windows(2) {
            let (v0, p0) = pair[0];
            let (v1, p1) = pair[1];
            if volts <= v1 {
                let t = (volts - v0) / (v1 - v0);
                let pct = f32::from(p0) + t * (f32::from(p1) - f32::from(p0));
                return pct.clamp(0.0, 100.0).round() as u8;
            }
        }

        last_p
    }
}

impl Default for BatteryTable {
    fn default() -> Self {
        let mut rows = HVec::new();
        for row in DEFAULT_2S_TABLE {
            // 10 rows always fit
            let _ = rows.push(row);
        }
        Self { rows }
    }
}

/// One processed power-monitor sample as stored in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub bus_voltage_v_raw: f32,
    pub bus_voltage_v_filt: f32,
    pub current_ma: f32,
    pub power_mw: f32,
    pub battery_percent: u8,
}

impl PowerReading {
    pub fn from_sample(sample: PowerSample, filter: &mut VoltageFilter, table: &BatteryTable) -> Self {
        let filtered = filter.update(sample.bus_voltage_v);
        Self {
            bus_voltage_v_raw: sample.bus_voltage_v,
            bus_voltage_v_filt: filtered,
            current_ma: sample.current_ma,
            power_mw: sample.power_mw,
            battery_percent: table.percent(filtered),
        }
    }
}
