//! Three-line status text for a 128x32 panel (21 columns of the default font).
//!
//! Pixel output is left to whatever owns the panel; the daemon logs the lines
//! whenever they change.

use crate::sampler::PeriodicTask;
use crate::snapshot::{Snapshot, SnapshotCache};
use arrayvec::ArrayString;
use std::fmt::Write;
use std::time::Duration;
use tracing::debug;

pub const PANEL_COLUMNS: usize = 21;
const SSID_COLUMNS: usize = 16;

pub type PanelLine = ArrayString<PANEL_COLUMNS>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusLines {
    pub mode_battery: PanelLine,
    pub ssid: PanelLine,
    pub ip_distance: PanelLine,
}

impl StatusLines {
    pub fn render(snapshot: &Snapshot) -> Self {
        let battery = snapshot.power.value().map(|p| p.battery_percent);
        let distance = snapshot.distance.value().copied();
        let net = &snapshot.network;

        let mut scratch = String::with_capacity(32);

        let _ = write!(scratch, "{:<7} BAT:", net.mode.as_str());
        match battery {
            Some(pct) => {
                let _ = write!(scratch, "{pct:3}%");
            }
            None => scratch.push_str("--"),
        }
        let mode_battery = truncated(&scratch);

        scratch.clear();
        scratch.push_str("SSID:");
        if net.ssid.is_empty() {
            scratch.push_str("(no ssid)");
        } else {
            scratch.extend(net.ssid.chars().take(SSID_COLUMNS));
        }
        let ssid = truncated(&scratch);

        scratch.clear();
        let ip = if net.ip.is_empty() { "0.0.0.0" } else { net.ip.as_str() };
        let _ = write!(scratch, "IP:{ip} D:");
        match distance {
            Some(mm) => {
                let _ = write!(scratch, "{mm:4}");
            }
            None => scratch.push_str("----"),
        }
        let ip_distance = truncated(&scratch);

        Self {
            mode_battery,
            ssid,
            ip_distance,
        }
    }

    pub fn lines(&self) -> [&str; 3] {
        [
            self.mode_battery.as_str(),
            self.ssid.as_str(),
            self.ip_distance.as_str(),
        ]
    }
}

/// Longest prefix of `text` that fits the panel, cut on a char boundary.
fn truncated(text: &str) -> PanelLine {
    let mut line = PanelLine::new();
    for c in text.chars() {
        if line.try_push(c).is_err() {
            break;
        }
    }
    line
}

pub struct StatusPanel {
    period: Duration,
    last: Option<StatusLines>,
}

impl StatusPanel {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn current(&self) -> Option<&StatusLines> {
        self.last.as_ref()
    }
}

impl PeriodicTask for StatusPanel {
    fn name(&self) -> &str {
        "status-panel"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, cache: &SnapshotCache) {
        let lines = StatusLines::render(&cache.snapshot());
        if self.last.as_ref() != Some(&lines) {
            let [a, b, c] = lines.lines();
            debug!(target: "quadlink::panel", "{} | {} | {}", a, b, c);
            self.last = Some(lines);
        }
    }
}
