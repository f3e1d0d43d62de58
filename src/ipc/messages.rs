use crate::snapshot::{Freshness, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcRequest {
    Get,
    /// Well-formed request naming a command this server does not know.
    Unknown(String),
    /// Not JSON, or JSON that is not an object.
    Malformed,
}

impl IpcRequest {
    /// An empty datagram, or an object without `cmd`, is a `get`.
    pub fn parse(data: &[u8]) -> Self {
        if data.is_empty() {
            return IpcRequest::Get;
        }

        let map = match serde_json::from_slice::<Value>(data) {
            Ok(Value::Object(map)) => map,
            _ => return IpcRequest::Malformed,
        };

        match map.get("cmd") {
            None => IpcRequest::Get,
            Some(Value::String(cmd)) if cmd == "get" => IpcRequest::Get,
            Some(Value::String(cmd)) => IpcRequest::Unknown(cmd.clone()),
            Some(other) => IpcRequest::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuView {
    pub accel_m_s2: Option<[f32; 3]>,
    pub gyro_rad_s: Option<[f32; 3]>,
    pub temp_c: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateView {
    pub distance: Freshness,
    pub imu: Freshness,
}

/// Reply datagram: the latest distance and IMU values, `null` unless fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub ts: f64,
    pub distance_mm: Option<u16>,
    pub imu: ImuView,
    pub state: StateView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let imu = snapshot.inertial.value();
        Self {
            ts: snapshot.timestamp,
            distance_mm: snapshot.distance.value().copied(),
            imu: ImuView {
                accel_m_s2: imu.map(|r| r.accel_m_s2),
                gyro_rad_s: imu.map(|r| r.gyro_rad_s),
                temp_c: imu.map(|r| r.temp_c),
            },
            state: StateView {
                distance: snapshot.distance.freshness(),
                imu: snapshot.inertial.freshness(),
            },
            error: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Build the reply for one request datagram.
pub fn handle_request(data: &[u8], snapshot: &Snapshot) -> IpcResponse {
    let mut response = IpcResponse::from_snapshot(snapshot);
    match IpcRequest::parse(data) {
        IpcRequest::Get => {}
        IpcRequest::Unknown(cmd) => response.error = Some(format!("unknown cmd: {cmd}")),
        IpcRequest::Malformed => response.error = Some("bad request".to_string()),
    }
    response
}
