//! # quadlink
//!
//! Runtime core for a small car / quadruped robot controller. The companion
//! computer owns the I2C sensor bus and the SPI command bus to the motor/servo
//! microcontroller, and shares sensor state with other local processes.
//!
//! ## Features
//!
//! - **Command codec**: fixed 6-byte checksummed frames to the microcontroller
//! - **Bus arbitration**: one in-flight SPI exchange, lazy open, reopen after failure
//! - **Actuator bridge**: typed motor, servo and leg commands with an angle cache
//! - **Sensor sampling**: independent fixed-rate loops for ranging, IMU, power and network
//! - **Snapshot IPC**: JSON over a Unix datagram socket
//! - **Telemetry**: daily CSV files with explicit not-connected / no-reading cells
//!
//! ## Quick Start
//!
//! ```rust
//! use quadlink::actuator::ActuatorBridge;
//! use quadlink::transport::mock::MockConnector;
//!
//! let bus = MockConnector::new();
//! let bridge = ActuatorBridge::new(bus.clone());
//!
//! bridge.set_leg(1, 10, 20, 30).unwrap();
//! assert_eq!(bridge.angles()[3..6], [Some(10), Some(20), Some(30)]);
//! assert_eq!(bus.sent().len(), 3);
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - frame encoding and validation
//! - [`transport`] - exclusive access to the command bus
//! - [`actuator`] - command API and last-commanded angles
//! - [`sensors`] - I2C drivers and the network probe
//! - [`sampler`] - periodic loops feeding the [`snapshot`]
//! - [`ipc`] - datagram server and client
//! - [`telemetry`] - CSV logger
//! - [`daemon`] - startup and orderly shutdown

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod actuator;
pub mod config;
pub mod daemon;
pub mod display;
pub mod ipc;
pub mod protocol;
pub mod sampler;
pub mod sensors;
pub mod shutdown;
pub mod snapshot;
pub mod telemetry;
pub mod transport;

// Re-export main public types for convenience
pub use actuator::{ActuatorBridge, AngleCache, BridgeError};
pub use config::Config;
pub use daemon::{Daemon, Devices};
pub use protocol::{CommandCode, Frame, Mode, Response};
pub use snapshot::{Reading, Snapshot, SnapshotCache};
pub use transport::{BusTransport, TransportError};
