use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// 4 legs x 3 joints.
pub const ANGLE_CHANNELS: usize = 12;
pub const JOINTS_PER_LEG: usize = 3;

pub type AngleTable = [Option<u8>; ANGLE_CHANNELS];

/// Serializable view of the angle table for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleReport {
    pub channels: Vec<Option<u8>>,
}

impl From<AngleTable> for AngleReport {
    fn from(table: AngleTable) -> Self {
        Self {
            channels: table.to_vec(),
        }
    }
}

/// Last commanded angle per servo channel.
///
/// Records the last *attempted* send: the bridge writes here before the frame
/// goes out, so a failed exchange still leaves its angle behind.
#[derive(Debug, Default)]
pub struct AngleCache {
    table: Mutex<AngleTable>,
}

impl AngleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels outside the cached range are ignored.
    pub fn record(&self, channel: u8, angle: u8) {
        let index = usize::from(channel);
        if index >= ANGLE_CHANNELS {
            return;
        }
        let mut table = self.lock();
        table[index] = Some(angle);
    }

    /// All three joints of a leg in one critical section.
    pub fn record_leg(&self, leg: u8, angles: [u8; JOINTS_PER_LEG]) {
        let base = usize::from(leg) * JOINTS_PER_LEG;
        let mut table = self.lock();
        for (offset, angle) in angles.iter().enumerate() {
            if let Some(slot) = table.get_mut(base + offset) {
                *slot = Some(*angle);
            }
        }
    }

    pub fn snapshot(&self) -> AngleTable {
        *self.lock()
    }

    pub fn get(&self, channel: u8) -> Option<u8> {
        self.lock().get(usize::from(channel)).copied().flatten()
    }

    pub fn reset(&self) {
        *self.lock() = [None; ANGLE_CHANNELS];
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AngleTable> {
        // Mutations are plain array stores; a poisoned table is still consistent.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
