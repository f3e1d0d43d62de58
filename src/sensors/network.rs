//! Wi-Fi mode, SSID and IPv4 address, gathered from system tools.

use super::NetworkProbe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkMode {
    #[serde(rename = "STA")]
    Station,
    #[serde(rename = "AP")]
    AccessPoint,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl NetworkMode {
    /// An associated SSID means station mode; otherwise a running hostapd means AP.
    pub fn detect(ssid: &str, hostapd_active: bool) -> Self {
        if !ssid.is_empty() {
            NetworkMode::Station
        } else if hostapd_active {
            NetworkMode::AccessPoint
        } else {
            NetworkMode::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Station => "STA",
            NetworkMode::AccessPoint => "AP",
            NetworkMode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub mode: NetworkMode,
    pub ssid: String,
    pub ip: String,
}

/// Per-command wall-clock limits.
#[derive(Debug, Clone)]
pub struct ProbeTimeouts {
    pub ssid: Duration,
    pub nmcli: Duration,
    pub hostapd: Duration,
    pub ip: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            ssid: Duration::from_millis(800),
            nmcli: Duration::from_millis(1000),
            hostapd: Duration::from_millis(600),
            ip: Duration::from_millis(800),
        }
    }
}

pub struct SystemNetworkProbe {
    interfaces: Vec<String>,
    timeouts: ProbeTimeouts,
}

impl SystemNetworkProbe {
    pub fn new(interfaces: Vec<String>) -> Self {
        Self {
            interfaces,
            timeouts: ProbeTimeouts::default(),
        }
    }

    fn ssid(&self) -> String {
        if let Some(out) = run_command("iwgetid", &["-r"], self.timeouts.ssid) {
            if !out.is_empty() {
                return out;
            }
        }

        run_command(
            "nmcli",
            &["-t", "-f", "ACTIVE,SSID", "dev", "wifi"],
            self.timeouts.nmcli,
        )
        .and_then(|out| parse_nmcli_active_ssid(&out))
        .unwrap_or_default()
    }

    fn hostapd_active(&self) -> bool {
        run_command("systemctl", &["is-active", "hostapd"], self.timeouts.hostapd)
            .map(|out| out == "active")
            .unwrap_or(false)
    }

    fn ip(&self) -> String {
        self.interfaces
            .iter()
            .find_map(|ifname| {
                run_command("ip", &["-4", "addr", "show", ifname], self.timeouts.ip)
                    .and_then(|out| parse_inet_addr(&out))
            })
            .unwrap_or_default()
    }
}

impl Default for SystemNetworkProbe {
    fn default() -> Self {
        Self::new(vec!["wlan0".into(), "eth0".into()])
    }
}

impl NetworkProbe for SystemNetworkProbe {
    fn probe(&mut self) -> NetworkStatus {
        let ssid = self.ssid();
        // Only ask systemd when there is no station association.
        let mode = NetworkMode::detect(&ssid, ssid.is_empty() && self.hostapd_active());
        let ip = self.ip();
        NetworkStatus { mode, ssid, ip }
    }
}

/// Trimmed stdout of a successful run, `None` on failure, non-zero exit or timeout.
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    // Drain stdout while waiting so a chatty child never blocks on a full pipe.
    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut out = String::new();
        stdout.read_to_string(&mut out).map(|_| out)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
                trace!("{} timed out after {:?}", program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
        }
    };

    // On failure the reader is left to finish once the pipe closes.
    if !status?.success() {
        return None;
    }

    let out = reader.join().ok()?.ok()?;
    Some(out.trim().to_string())
}

/// `nmcli -t -f ACTIVE,SSID dev wifi` prints `yes:<ssid>` for the associated network.
pub fn parse_nmcli_active_ssid(out: &str) -> Option<String> {
    out.lines()
        .find_map(|line| line.strip_prefix("yes:"))
        .map(|ssid| ssid.trim().to_string())
        .filter(|ssid| !ssid.is_empty())
}

/// First `inet a.b.c.d/nn` address from `ip -4 addr show`.
pub fn parse_inet_addr(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("inet "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|cidr| cidr.split('/').next())
        .find(|addr| !addr.is_empty())
        .map(str::to_string)
}
