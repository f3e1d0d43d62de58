use quadlink::sensors::power::{TableError, DEFAULT_2S_TABLE, DEFAULT_EMA_ALPHA};
use quadlink::sensors::{BatteryTable, PowerReading, VoltageFilter};
use quadlink::sensors::PowerSample;

#[test]
fn test_default_table_endpoints() {
    let table = BatteryTable::default();
    assert_eq!(table.rows(), &DEFAULT_2S_TABLE[..]);

    assert_eq!(table.percent(5.0), 0);
    assert_eq!(table.percent(6.4), 0);
    assert_eq!(table.percent(8.2), 100);
    assert_eq!(table.percent(9.0), 100);
    assert_eq!(table.percent(f32::NAN), 0);
}

#[test]
fn test_exact_at_table_rows() {
    let table = BatteryTable::default();
    for &(volts, percent) in DEFAULT_2S_TABLE.iter() {
        assert_eq!(table.percent(volts), percent, "row {} V", volts);
    }
}

#[test]
fn test_linear_interpolation() {
    let table = BatteryTable::new(&[(0.0, 0), (10.0, 100)]).unwrap();
    assert_eq!(table.percent(2.5), 25);
    assert_eq!(table.percent(7.0), 70);
}

#[test]
fn test_percent_monotonic_and_bounded() {
    let table = BatteryTable::default();
    let mut previous = 0;
    for step in 0..=300 {
        let volts = 6.0 + step as f32 * 0.01;
        let percent = table.percent(volts);
        assert!(percent <= 100);
        assert!(percent >= previous, "{} V dropped to {}%", volts, percent);
        previous = percent;
    }
}

#[test]
fn test_table_errors() {
    assert_eq!(BatteryTable::new(&[]), Err(TableError::Empty));
    assert_eq!(
        BatteryTable::new(&[(7.0, 0), (7.0, 10)]),
        Err(TableError::NotAscending(1))
    );
    assert_eq!(
        BatteryTable::new(&[(7.0, 0), (6.0, 10)]),
        Err(TableError::NotAscending(1))
    );
    assert_eq!(
        BatteryTable::new(&[(7.0, 101)]),
        Err(TableError::PercentOutOfRange(0))
    );

    let rows: Vec<(f32, u8)> = (0..17).map(|i| (i as f32, 0)).collect();
    assert_eq!(BatteryTable::new(&rows), Err(TableError::TooManyRows(17)));
}

#[test]
fn test_filter_seeded_by_first_sample() {
    let mut filter = VoltageFilter::default();
    assert_eq!(filter.alpha(), DEFAULT_EMA_ALPHA);
    assert_eq!(filter.value(), None);

    assert_eq!(filter.update(8.0), 8.0);
    assert!((filter.update(7.0) - 7.75).abs() < 1e-6);

    filter.reset();
    assert_eq!(filter.update(6.5), 6.5);
}

#[test]
fn test_filter_alpha_extremes() {
    let mut frozen = VoltageFilter::new(0.0);
    frozen.update(8.0);
    assert_eq!(frozen.update(6.0), 8.0);

    let mut passthrough = VoltageFilter::new(1.0);
    passthrough.update(8.0);
    assert_eq!(passthrough.update(6.0), 6.0);

    assert_eq!(VoltageFilter::new(3.0).alpha(), 1.0);
    assert_eq!(VoltageFilter::new(-1.0).alpha(), 0.0);
    assert_eq!(VoltageFilter::new(f32::NAN).alpha(), DEFAULT_EMA_ALPHA);
}

#[test]
fn test_power_reading_uses_filtered_voltage() {
    let mut filter = VoltageFilter::new(0.5);
    let table = BatteryTable::new(&[(6.0, 0), (8.0, 100)]).unwrap();

    let sample = |v: f32| PowerSample {
        bus_voltage_v: v,
        current_ma: 120.0,
        power_mw: 900.0,
    };

    let first = PowerReading::from_sample(sample(8.0), &mut filter, &table);
    assert_eq!(first.battery_percent, 100);

    let second = PowerReading::from_sample(sample(6.0), &mut filter, &table);
    assert_eq!(second.bus_voltage_v_raw, 6.0);
    assert_eq!(second.bus_voltage_v_filt, 7.0);
    assert_eq!(second.battery_percent, 50);
    assert_eq!(second.current_ma, 120.0);
}
