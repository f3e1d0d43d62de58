use clap::{App, Arg};
use quadlink::config::{Config, ConfigError, DEFAULT_CONFIG_PATH};
use quadlink::transport::SpiConnector;
use quadlink::{ActuatorBridge, Daemon, Devices};
use std::path::Path;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("quadlinkd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sensor sampling and IPC daemon for the robot controller")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::with_name("socket")
                .short("s")
                .long("socket")
                .value_name("PATH")
                .help("Override the IPC socket path")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("no-telemetry")
                .long("no-telemetry")
                .help("Do not write telemetry CSV files"),
        )
        .arg(
            Arg::with_name("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit"),
        )
        .get_matches();

    let config_path = Path::new(matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH));
    let config_found = config_path.exists();
    let mut config = Config::load_or_default(config_path)?;

    if let Some(socket) = matches.value_of("socket") {
        config.ipc.socket_path = socket.into();
    }
    if matches.is_present("no-telemetry") {
        config.telemetry.enabled = false;
    }

    if matches.is_present("print-config") {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if config_found {
        info!("Configuration: {}", config_path.display());
    } else {
        info!("No configuration at {}, using defaults", config_path.display());
    }

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("{}", problem);
        }
        return Err(ConfigError::Invalid(problems).into());
    }

    let devices = Devices::open(&config)?;

    let actuator = if config.actuator.enabled {
        info!("Command bus: {}", config.bus.path.display());
        Some(
            ActuatorBridge::new(SpiConnector::new(config.bus.clone()))
                .with_leg_delay(config.actuator.leg_delay()),
        )
    } else {
        None
    };

    let daemon = Daemon::start(&config, devices, actuator)?;
    info!("Serving snapshots on {}", daemon.socket_path().display());

    wait_for_shutdown_signal().await?;

    let report = daemon.shutdown().await;
    for (name, stats) in &report.loops {
        info!("{}: {} ticks, {} overruns", name, stats.ticks, stats.overruns);
    }
    info!(
        "ipc: {} requests, {} replies, {} rejected",
        report.ipc.requests, report.ipc.replies, report.ipc.rejected
    );

    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("SIGINT received");
        }
        _ = terminate.recv() => {
            info!("SIGTERM received");
        }
    }
    Ok(())
}
