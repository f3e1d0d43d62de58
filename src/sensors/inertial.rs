use super::{InertialReading, InertialSensor, RegisterIo, SensorError};

pub const MPU6050_ADDR: u16 = 0x68;

const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

const WHO_AM_I: u8 = 0x68;

/// LSB per g at ±2 g.
const ACCEL_LSB_PER_G: f32 = 16384.0;
/// LSB per °/s at ±250 °/s.
const GYRO_LSB_PER_DPS: f32 = 131.0;
const STANDARD_GRAVITY: f32 = 9.80665;

/// MPU-6050 accelerometer and gyroscope.
pub struct Mpu6050<R: RegisterIo> {
    io: R,
}

impl<R: RegisterIo> Mpu6050<R> {
    pub fn open(mut io: R) -> Result<Self, SensorError> {
        let mut id = [0u8; 1];
        io.write_read(&[REG_WHO_AM_I], &mut id)?;
        if id[0] != WHO_AM_I {
            return Err(SensorError::Identity {
                device: "mpu6050",
                found: id.to_vec(),
            });
        }

        // Clear sleep, internal oscillator.
        io.write(&[REG_PWR_MGMT_1, 0x00])?;
        io.write(&[REG_ACCEL_CONFIG, 0x00])?;
        io.write(&[REG_GYRO_CONFIG, 0x00])?;

        Ok(Self { io })
    }

    pub fn into_inner(self) -> R {
        self.io
    }
}

impl<R: RegisterIo> InertialSensor for Mpu6050<R> {
    fn read(&mut self) -> Result<InertialReading, SensorError> {
        let mut raw = [0u8; 14];
        self.io.write_read(&[REG_ACCEL_XOUT_H], &mut raw)?;
        Ok(decode_burst(&raw))
    }
}

/// Accel XYZ, temperature, gyro XYZ; big-endian words.
pub fn decode_burst(raw: &[u8; 14]) -> InertialReading {
    let word = |i: usize| f32::from(i16::from_be_bytes([raw[i], raw[i + 1]]));

    let accel = |i: usize| word(i) / ACCEL_LSB_PER_G * STANDARD_GRAVITY;
    let gyro = |i: usize| (word(i) / GYRO_LSB_PER_DPS).to_radians();

    InertialReading {
        accel_m_s2: [accel(0), accel(2), accel(4)],
        gyro_rad_s: [gyro(8), gyro(10), gyro(12)],
        temp_c: word(6) / 340.0 + 36.53,
    }
}
