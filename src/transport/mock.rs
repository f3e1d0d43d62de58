//! In-memory command bus for tests and dry runs.

use super::{Connector, Link, TransportError};
use crate::protocol::{checksum, RawFrame, HEADER};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shared state behind every link handed out by one [`MockConnector`].
#[derive(Debug, Default)]
struct MockBus {
    sent: Mutex<Vec<RawFrame>>,
    opens: AtomicUsize,
    fail_open: AtomicBool,
    fail_transfers: AtomicUsize,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    exchange_delay_us: AtomicUsize,
}

/// Replies with an acknowledgement frame `[0xAA, cmd, 0, 0, 0, cmd]` by default.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    bus: Arc<MockBus>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transmitted frame, oldest first.
    pub fn sent(&self) -> Vec<RawFrame> {
        self.bus.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.bus.opens.load(Ordering::SeqCst)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.bus.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` exchanges.
    pub fn fail_next_transfers(&self, count: usize) {
        self.bus.fail_transfers.store(count, Ordering::SeqCst);
    }

    /// Hold each exchange open for a while so overlapping callers would be visible.
    pub fn set_exchange_delay(&self, delay: Duration) {
        self.bus
            .exchange_delay_us
            .store(delay.as_micros() as usize, Ordering::SeqCst);
    }

    /// Number of exchanges that started while another one was still running.
    pub fn overlaps(&self) -> usize {
        self.bus.overlaps.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn connect(&self) -> Result<MockLink, TransportError> {
        if self.bus.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                path: PathBuf::from("mock://bus"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock bus unavailable"),
            });
        }
        self.bus.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockLink {
            bus: Arc::clone(&self.bus),
        })
    }

    fn describe(&self) -> String {
        "mock://bus".into()
    }
}

pub struct MockLink {
    bus: Arc<MockBus>,
}

impl Link for MockLink {
    fn exchange(&mut self, tx: &RawFrame) -> Result<RawFrame, TransportError> {
        if self.bus.in_flight.swap(true, Ordering::SeqCst) {
            self.bus.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let delay = self.bus.exchange_delay_us.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay as u64));
        }

        let failing = self
            .bus
            .fail_transfers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let result = if failing {
            Err(TransportError::Transfer("mock transfer failure".into()))
        } else {
            if let Ok(mut sent) = self.bus.sent.lock() {
                sent.push(*tx);
            }
            let cmd = tx[1];
            Ok([HEADER, cmd, 0, 0, 0, checksum(cmd, 0, 0, 0)])
        };

        self.bus.in_flight.store(false, Ordering::SeqCst);
        result
    }
}
