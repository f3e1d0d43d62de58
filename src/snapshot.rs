//! Latest known sensor state, shared between samplers and readers.
//!
//! Each sampler owns one field group and replaces it whole under the lock;
//! readers clone the full snapshot. No I/O happens while the lock is held.

use crate::sensors::{InertialReading, NetworkStatus, PowerReading};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Wall-clock unix time in seconds.
pub fn unix_now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

/// A sensor value tagged with how much it can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Reading<T> {
    /// Sensor not installed or failed to initialise.
    #[default]
    Absent,
    /// Installed, but the last attempt produced nothing usable.
    Stale,
    Fresh { value: T, at: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Absent,
}

impl<T> Reading<T> {
    pub fn fresh(value: T) -> Self {
        Reading::Fresh {
            value,
            at: unix_now(),
        }
    }

    /// The value, only while fresh.
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Fresh { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn fresh_at(&self) -> Option<f64> {
        match self {
            Reading::Fresh { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Reading::Fresh { .. })
    }

    pub fn freshness(&self) -> Freshness {
        match self {
            Reading::Absent => Freshness::Absent,
            Reading::Stale => Freshness::Stale,
            Reading::Fresh { .. } => Freshness::Fresh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Unix seconds of the last fresh update to any group; 0.0 before the first.
    pub timestamp: f64,
    pub distance: Reading<u16>,
    pub inertial: Reading<InertialReading>,
    pub power: Reading<PowerReading>,
    pub network: NetworkStatus,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: Mutex<Snapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_distance(&self, reading: Reading<u16>) {
        let mut snap = self.lock();
        touch(&mut snap.timestamp, reading.fresh_at());
        snap.distance = reading;
    }

    pub fn set_inertial(&self, reading: Reading<InertialReading>) {
        let mut snap = self.lock();
        touch(&mut snap.timestamp, reading.fresh_at());
        snap.inertial = reading;
    }

    pub fn set_power(&self, reading: Reading<PowerReading>) {
        let mut snap = self.lock();
        touch(&mut snap.timestamp, reading.fresh_at());
        snap.power = reading;
    }

    pub fn set_network(&self, status: NetworkStatus) {
        let now = unix_now();
        let mut snap = self.lock();
        touch(&mut snap.timestamp, Some(now));
        snap.network = status;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        // Writers only assign whole fields, so a poisoned snapshot is still coherent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn touch(timestamp: &mut f64, at: Option<f64>) {
    if let Some(at) = at {
        if at > *timestamp {
            *timestamp = at;
        }
    }
}
