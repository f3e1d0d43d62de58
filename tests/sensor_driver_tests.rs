use quadlink::sensors::inertial::decode_burst;
use quadlink::sensors::{
    I2cBus, Ina219, InertialSensor, Mpu6050, PowerSensor, RangeSensor, RegisterIo, SensorError, Vl53l1x,
};
use std::collections::HashMap;

/// Canned replies keyed by the address bytes written before each read.
#[derive(Default)]
struct RegisterMap {
    replies: HashMap<Vec<u8>, Vec<u8>>,
    writes: Vec<Vec<u8>>,
}

impl RegisterMap {
    fn reply(mut self, addr: &[u8], bytes: &[u8]) -> Self {
        self.replies.insert(addr.to_vec(), bytes.to_vec());
        self
    }
}

impl RegisterIo for RegisterMap {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), SensorError> {
        buf.fill(0);
        if let Some(reply) = self.replies.get(bytes) {
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
        }
        Ok(())
    }
}

/// Every access fails, as with nothing answering on the address.
struct Nack;

impl RegisterIo for Nack {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), SensorError> {
        Err(SensorError::Bus {
            addr: 0x29,
            reason: "nack".into(),
        })
    }

    fn write_read(&mut self, _bytes: &[u8], _buf: &mut [u8]) -> Result<(), SensorError> {
        Err(SensorError::Bus {
            addr: 0x29,
            reason: "nack".into(),
        })
    }
}

fn vl53_map(range_status: u8, distance: u16) -> RegisterMap {
    RegisterMap::default()
        .reply(&[0x01, 0x0F], &[0xEA, 0xCC, 0x10])
        .reply(&[0x00, 0x30], &[0x01])
        .reply(&[0x00, 0x31], &[0x01])
        .reply(&[0x00, 0x89], &[range_status])
        .reply(&[0x00, 0x96], &distance.to_be_bytes())
}

#[test]
fn test_vl53l1x_bring_up_sequence() {
    let sensor = Vl53l1x::open(vl53_map(0x09, 0)).unwrap();
    let writes = sensor.into_inner().writes;

    let config_block = &writes[0];
    assert_eq!(&config_block[..2], &[0x00, 0x2D]);
    assert_eq!(config_block.len(), 2 + 91);

    // Calibration start, then continuous ranging last
    assert_eq!(writes[1], vec![0x00, 0x87, 0x40]);
    assert!(writes.contains(&vec![0x00, 0x08, 0x09]));
    assert!(writes.contains(&vec![0x00, 0x5E, 0x02, 0xE1]));
    assert!(writes.contains(&vec![0x00, 0x61, 0x03, 0x88]));
    assert_eq!(writes.last(), Some(&vec![0x00, 0x87, 0x40]));
}

#[test]
fn test_vl53l1x_distance_read() {
    let mut sensor = Vl53l1x::open(vl53_map(0x09, 300)).unwrap();

    assert!(sensor.data_ready().unwrap());
    assert_eq!(sensor.read_distance_mm().unwrap(), 300);

    let writes = sensor.into_inner().writes;
    assert_eq!(writes.last(), Some(&vec![0x00, 0x86, 0x01]));
}

#[test]
fn test_vl53l1x_invalid_range_status() {
    let mut sensor = Vl53l1x::open(vl53_map(0x04, 1234)).unwrap();

    match sensor.read_distance_mm() {
        Err(SensorError::InvalidMeasurement { status, .. }) => assert_eq!(status, 4),
        other => panic!("expected invalid measurement, got {:?}", other),
    }
    // Interrupt is cleared even for a rejected sample
    let writes = sensor.into_inner().writes;
    assert_eq!(writes.last(), Some(&vec![0x00, 0x86, 0x01]));
}

#[test]
fn test_vl53l1x_active_low_interrupt() {
    let map = vl53_map(0x09, 50)
        .reply(&[0x00, 0x30], &[0x11])
        .reply(&[0x00, 0x31], &[0x00]);
    let mut sensor = Vl53l1x::open(map).unwrap();
    assert!(sensor.data_ready().unwrap());
}

#[test]
fn test_vl53l1x_stop() {
    let mut sensor = Vl53l1x::open(vl53_map(0x09, 0)).unwrap();
    sensor.stop().unwrap();
    assert_eq!(sensor.into_inner().writes.last(), Some(&vec![0x00, 0x87, 0x00]));
}

#[test]
fn test_vl53l1x_wrong_identity() {
    let map = vl53_map(0x09, 0).reply(&[0x01, 0x0F], &[0xEE, 0xAA, 0x10]);
    match Vl53l1x::open(map) {
        Err(SensorError::Identity { found, .. }) => assert_eq!(found, vec![0xEE, 0xAA, 0x10]),
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("identity check passed"),
    }
}

#[test]
fn test_vl53l1x_missing_device() {
    assert!(matches!(Vl53l1x::open(Nack), Err(SensorError::Bus { .. })));
}

#[test]
fn test_mpu6050_open_and_read() {
    let mut burst = [0u8; 14];
    burst[0..2].copy_from_slice(&16384i16.to_be_bytes());
    burst[4..6].copy_from_slice(&(-16384i16).to_be_bytes());
    burst[8..10].copy_from_slice(&131i16.to_be_bytes());

    let map = RegisterMap::default()
        .reply(&[0x75], &[0x68])
        .reply(&[0x3B], &burst);
    let mut imu = Mpu6050::open(map).unwrap();

    let reading = imu.read().unwrap();
    assert!((reading.accel_m_s2[0] - 9.80665).abs() < 1e-4);
    assert_eq!(reading.accel_m_s2[1], 0.0);
    assert!((reading.accel_m_s2[2] + 9.80665).abs() < 1e-4);
    assert!((reading.gyro_rad_s[0] - 1f32.to_radians()).abs() < 1e-6);
    assert!((reading.temp_c - 36.53).abs() < 1e-4);

    let writes = imu.into_inner().writes;
    assert_eq!(writes[0], vec![0x6B, 0x00]);
}

#[test]
fn test_mpu6050_wrong_identity() {
    let map = RegisterMap::default().reply(&[0x75], &[0x70]);
    assert!(matches!(
        Mpu6050::open(map),
        Err(SensorError::Identity { device: "mpu6050", .. })
    ));
}

#[test]
fn test_decode_burst_temperature() {
    let mut burst = [0u8; 14];
    burst[6..8].copy_from_slice(&(-3400i16).to_be_bytes());
    let reading = decode_burst(&burst);
    assert!((reading.temp_c - 26.53).abs() < 1e-3);
}

#[test]
fn test_ina219_calibration_and_scaling() {
    // 7.4 V = 1850 * 4 mV, left-aligned by 3 bits
    let bus_raw: u16 = 1850 << 3;
    let map = RegisterMap::default()
        .reply(&[0x02], &bus_raw.to_be_bytes())
        .reply(&[0x04], &(-50i16).to_be_bytes())
        .reply(&[0x03], &100u16.to_be_bytes());

    let mut monitor = Ina219::open(map).unwrap();
    let sample = monitor.read().unwrap();

    assert!((sample.bus_voltage_v - 7.4).abs() < 1e-4);
    assert!((sample.current_ma + 5.0).abs() < 1e-4);
    assert!((sample.power_mw - 200.0).abs() < 1e-4);

    let writes = monitor.into_inner().writes;
    assert_eq!(writes[0], vec![0x00, 0x39, 0x9F]);
    assert_eq!(writes[1], vec![0x05, 0x10, 0x00]);
}

#[test]
fn test_missing_bus_node_fails_open() {
    let err = I2cBus::open("/dev/quadlink-no-such-i2c").err().unwrap();
    assert!(matches!(err, SensorError::Open { .. }));
    assert!(err.to_string().contains("/dev/quadlink-no-such-i2c"));
}
