use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use quadlink::actuator::{AngleReport, ANGLE_CHANNELS, JOINTS_PER_LEG};
use quadlink::config::{Config, DEFAULT_CONFIG_PATH};
use quadlink::ipc::{IpcClient, IpcResponse};
use quadlink::protocol::{CommandCode, Mode, Response};
use quadlink::snapshot::Freshness;
use quadlink::transport::SpiConnector;
use quadlink::ActuatorBridge;
use std::path::Path;
use std::time::Duration;

const LEGS: u8 = (ANGLE_CHANNELS / JOINTS_PER_LEG) as u8;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let matches = App::new("quadlink")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🤖 Robot controller client: sensor snapshots and actuator commands")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .global(true),
        )
        .arg(
            Arg::with_name("socket")
                .short("s")
                .long("socket")
                .value_name("PATH")
                .help("Daemon IPC socket")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("spi")
                .long("spi")
                .value_name("DEVICE")
                .help("spidev node of the actuator microcontroller")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log bus traffic to stderr")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("📡 Query the latest sensor snapshot from the daemon"),
        )
        .subcommand(SubCommand::with_name("ping").about("🏓 Ping the microcontroller"))
        .subcommand(
            SubCommand::with_name("mode")
                .about("🔀 Select the drive mode")
                .arg(
                    Arg::with_name("mode")
                        .help("car, quad or a raw mode byte")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("motor")
                .about("⚙️  Set the drive motor speed")
                .setting(AppSettings::AllowNegativeNumbers)
                .arg(
                    Arg::with_name("speed")
                        .help("-255..=255")
                        .required(true)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("servo")
                .about("🦾 Move one servo channel")
                .arg(Arg::with_name("channel").help("Servo channel").required(true))
                .arg(Arg::with_name("angle").help("0..=180 degrees").required(true)),
        )
        .subcommand(
            SubCommand::with_name("leg")
                .about("🦵 Move the three joints of one leg")
                .arg(Arg::with_name("leg").help("Leg index").required(true))
                .arg(Arg::with_name("a0").required(true))
                .arg(Arg::with_name("a1").required(true))
                .arg(Arg::with_name("a2").required(true))
                .arg(delay_arg()),
        )
        .subcommand(
            SubCommand::with_name("pose")
                .about("🐾 Put every leg in the same joint pose")
                .arg(Arg::with_name("a0").required(true))
                .arg(Arg::with_name("a1").required(true))
                .arg(Arg::with_name("a2").required(true))
                .arg(delay_arg()),
        )
        .subcommand(SubCommand::with_name("status").about("📊 Request microcontroller status"))
        .subcommand(
            SubCommand::with_name("stop")
                .about("🛑 Stop the motor and centre the steering servo"),
        )
        .get_matches();

    let config_path = Path::new(matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH));
    let mut config = Config::load_or_default(config_path)?;
    if let Some(socket) = matches.value_of("socket") {
        config.ipc.socket_path = socket.into();
    }
    if let Some(spi) = matches.value_of("spi") {
        config.bus.path = spi.into();
    }

    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter("quadlink=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    match matches.subcommand() {
        ("get", _) => handle_get(&config, format).await,
        (name, Some(sub)) => handle_bus_command(name, sub, &config, format),
        _ => Ok(()),
    }
}

fn delay_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("delay-ms")
        .long("delay-ms")
        .value_name("MS")
        .help("Pause between joint frames")
        .takes_value(true)
}

async fn handle_get(config: &Config, format: &str) -> CliResult {
    let client = IpcClient::new(&config.ipc.socket_path).with_timeout(config.ipc.client_timeout());

    let response = match client.get().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!(
                "{} No answer from {}",
                "❌".red(),
                config.ipc.socket_path.display().to_string().bright_white()
            );
            eprintln!("{} Is quadlinkd running? {}", "💡".yellow(), e.to_string().dimmed());
            return Err(e.into());
        }
    };

    match format {
        "json" => println!("{}", serde_json::to_string(&response)?),
        "compact" => println!("{}", compact_snapshot(&response)),
        _ => print_snapshot_table(&response),
    }
    Ok(())
}

fn handle_bus_command(name: &str, sub: &ArgMatches<'_>, config: &Config, format: &str) -> CliResult {
    let bridge = ActuatorBridge::new(SpiConnector::new(config.bus.clone()))
        .with_leg_delay(leg_delay(sub, config)?);

    match name {
        "ping" => {
            let rx = bridge.ping()?;
            print_response("Ping", &rx, format);
        }
        "status" => {
            let rx = bridge.request_status()?;
            print_response("Status", &rx, format);
        }
        "mode" => {
            let mode = parse_mode(sub.value_of("mode").unwrap_or_default())?;
            let rx = bridge.set_mode(mode)?;
            print_response(&format!("Mode {}", mode_name(mode)), &rx, format);
        }
        "motor" => {
            let speed = parse_number::<i32>(sub, "speed")?;
            let rx = bridge.set_motor_speed(speed)?;
            print_response(&format!("Motor {speed}"), &rx, format);
        }
        "servo" => {
            let channel = parse_number::<u8>(sub, "channel")?;
            let angle = parse_number::<i32>(sub, "angle")?;
            let rx = bridge.set_servo(channel, angle)?;
            print_response(&format!("Servo {channel} -> {angle}°"), &rx, format);
        }
        "leg" => {
            let leg = parse_number::<u8>(sub, "leg")?;
            let [a0, a1, a2] = joint_angles(sub)?;
            let responses = bridge.set_leg(leg, a0, a1, a2)?;
            for (joint, rx) in responses.iter().enumerate() {
                print_response(&format!("Leg {leg} joint {joint}"), rx, format);
            }
        }
        "pose" => {
            let [a0, a1, a2] = joint_angles(sub)?;
            for leg in 0..LEGS {
                bridge.set_leg(leg, a0, a1, a2)?;
            }
            print_angles(&AngleReport::from(bridge.angles()), format)?;
        }
        "stop" => {
            bridge.release(config.actuator.neutral_angle)?;
            match format {
                "json" => println!("{}", serde_json::json!({ "stopped": true })),
                "compact" => println!("{}", "STOPPED".bright_green()),
                _ => println!(
                    "{} {}",
                    "🛑".red(),
                    format!("Motor stopped, servo 0 at {}°", config.actuator.neutral_angle).bright_green()
                ),
            }
        }
        other => {
            println!("{} Unknown command {}", "❓".yellow(), other.bright_white());
        }
    }

    bridge.close();
    Ok(())
}

fn leg_delay(sub: &ArgMatches<'_>, config: &Config) -> CliResult<Duration> {
    match sub.value_of("delay-ms") {
        Some(ms) => Ok(Duration::from_millis(
            ms.parse().map_err(|e| format!("invalid delay-ms: {e}"))?,
        )),
        None => Ok(config.actuator.leg_delay()),
    }
}

fn parse_number<T>(sub: &ArgMatches<'_>, name: &str) -> CliResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = sub.value_of(name).unwrap_or_default();
    raw.parse::<T>()
        .map_err(|e| format!("invalid {name} '{raw}': {e}").into())
}

fn joint_angles(sub: &ArgMatches<'_>) -> CliResult<[i32; 3]> {
    Ok([
        parse_number(sub, "a0")?,
        parse_number(sub, "a1")?,
        parse_number(sub, "a2")?,
    ])
}

fn parse_mode(raw: &str) -> CliResult<u8> {
    match raw.to_ascii_lowercase().as_str() {
        "car" => Ok(Mode::Car.into()),
        "quad" => Ok(Mode::Quad.into()),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("unknown mode '{raw}' (car, quad or 0-255)").into()),
    }
}

fn mode_name(mode: u8) -> String {
    match mode {
        0 => "CAR".into(),
        1 => "QUAD".into(),
        other => format!("0x{other:02X}"),
    }
}

fn print_response(action: &str, rx: &Response, format: &str) {
    match format {
        "json" => {
            let data = rx.data();
            let len = usize::from(rx.len()).min(data.len());
            println!(
                "{}",
                serde_json::json!({
                    "action": action,
                    "rx": rx.as_bytes(),
                    "valid": rx.is_valid(),
                    "cmd": rx.cmd(),
                    "data": &data[..len],
                })
            );
        }
        "compact" => {
            let tag = if rx.is_valid() { "OK".bright_green() } else { "??".yellow() };
            println!("{} {}", tag, rx.to_hex());
        }
        _ => {
            if rx.is_valid() {
                let code = CommandCode::from_byte(rx.cmd())
                    .map(|c| format!("{c:?}"))
                    .unwrap_or_else(|| format!("0x{:02X}", rx.cmd()));
                println!("{} {} {}", "✅".green(), action.bright_white(), format!("({code})").dimmed());
            } else {
                println!(
                    "{} {} {}",
                    "⚠️".yellow(),
                    action.bright_white(),
                    "sent, reply failed validation".yellow()
                );
            }
            println!("   {} {}", "RX:".dimmed(), rx.to_hex().bright_cyan());
        }
    }
}

fn print_angles(report: &AngleReport, format: &str) -> CliResult {
    let cell = |a: &Option<u8>| a.map_or_else(|| "--".to_string(), |v| v.to_string());

    match format {
        "json" => println!("{}", serde_json::to_string(report)?),
        "compact" => {
            let cells: Vec<String> = report.channels.iter().map(cell).collect();
            println!("{}", cells.join(","));
        }
        _ => {
            println!("{}", "Leg │ J0  │ J1  │ J2".bright_white().bold());
            println!("{}", "────┼─────┼─────┼─────".bright_white());
            for (leg, joints) in report.channels.chunks(JOINTS_PER_LEG).enumerate() {
                let row: Vec<String> = joints.iter().map(|a| format!("{:>3}", cell(a))).collect();
                println!(" {}  │ {}", leg, row.join(" │ ").bright_cyan());
            }
        }
    }
    Ok(())
}

fn freshness_label(state: Freshness) -> ColoredString {
    match state {
        Freshness::Fresh => "fresh".bright_green(),
        Freshness::Stale => "stale".yellow(),
        Freshness::Absent => "absent".dimmed(),
    }
}

fn print_snapshot_table(response: &IpcResponse) {
    println!("{}", "📡 Sensor Snapshot".bright_blue().bold());
    println!("{}", "══════════════════".bright_blue());
    println!("{} {:.3}", "Timestamp:".bright_white(), response.ts);

    let distance = response
        .distance_mm
        .map_or_else(|| "--".to_string(), |mm| format!("{mm} mm"));
    println!(
        "{} {} [{}]",
        "Distance: ".bright_white(),
        distance.bright_cyan(),
        freshness_label(response.state.distance)
    );

    let imu = &response.imu;
    let vec3 = |v: Option<[f32; 3]>| {
        v.map_or_else(
            || "--".to_string(),
            |[x, y, z]| format!("{x:>8.3} {y:>8.3} {z:>8.3}"),
        )
    };
    println!(
        "{} {} [{}]",
        "Accel m/s²:".bright_white(),
        vec3(imu.accel_m_s2).bright_cyan(),
        freshness_label(response.state.imu)
    );
    println!("{} {}", "Gyro rad/s:".bright_white(), vec3(imu.gyro_rad_s).bright_cyan());
    println!(
        "{} {}",
        "Temp °C:   ".bright_white(),
        imu.temp_c.map_or_else(|| "--".to_string(), |t| format!("{t:.2}")).bright_cyan()
    );

    if let Some(error) = &response.error {
        println!("{} {}", "❌".red(), error.bright_red());
    }
}

fn compact_snapshot(response: &IpcResponse) -> String {
    let distance = response
        .distance_mm
        .map_or_else(|| "--".to_string(), |mm| mm.to_string());
    let accel = response
        .imu
        .accel_m_s2
        .map_or_else(|| "--".to_string(), |[x, y, z]| format!("{x:.2},{y:.2},{z:.2}"));
    format!("ts={:.3} d={} a={}", response.ts, distance, accel)
}
