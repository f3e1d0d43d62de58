pub mod angles;
pub mod bridge;

pub use angles::{AngleCache, AngleReport, AngleTable, ANGLE_CHANNELS, JOINTS_PER_LEG};
pub use bridge::{ActuatorBridge, BridgeError};
