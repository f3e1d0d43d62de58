//! Exclusive access to the half-duplex command bus.
//!
//! Every transaction is one 6-byte exchange. A single mutex covers opening the
//! device, configuring it and the exchange itself, so at most one frame is in
//! flight per [`BusTransport`].

pub mod mock;
mod spi;

pub use spi::{SpiConfig, SpiConnector, SpiLink};

use crate::protocol::{Frame, RawFrame, Response};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot open bus device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot configure bus device: {0}")]
    Configure(String),
    #[error("bus transfer failed: {0}")]
    Transfer(String),
    #[error("bus lock poisoned by a panicking caller")]
    LockPoisoned,
}

/// One opened, configured physical link.
pub trait Link: Send {
    /// Clock `tx` out and return the bytes clocked in during the same exchange.
    fn exchange(&mut self, tx: &RawFrame) -> Result<RawFrame, TransportError>;
}

/// Opens and configures a [`Link`]. Called lazily on first use and after a failure.
pub trait Connector: Send + Sync {
    type Link: Link;

    fn connect(&self) -> Result<Self::Link, TransportError>;

    fn describe(&self) -> String;
}

pub struct BusTransport<C: Connector> {
    connector: C,
    link: Mutex<Option<C::Link>>,
}

impl<C: Connector> BusTransport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: Mutex::new(None),
        }
    }

    pub fn transact(&self, frame: &Frame) -> Result<Response, TransportError> {
        let mut guard = self.link.lock().map_err(|_| TransportError::LockPoisoned)?;

        if guard.is_none() {
            let link = self.connector.connect()?;
            debug!("Command bus opened: {}", self.connector.describe());
            *guard = Some(link);
        }

        let result = match guard.as_mut() {
            Some(link) => link.exchange(frame.as_bytes()),
            None => return Err(TransportError::Transfer("link unavailable".into())),
        };

        match result {
            Ok(rx) => {
                debug!(
                    "TX {:02X?} RX {:02X?}",
                    frame.as_bytes(),
                    rx
                );
                Ok(Response::from_bytes(rx))
            }
            Err(e) => {
                // Drop the link so the next call reopens the device.
                warn!("Command bus exchange failed, closing link: {}", e);
                *guard = None;
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn close(&self) {
        if let Ok(mut guard) = self.link.lock() {
            if guard.take().is_some() {
                debug!("Command bus closed: {}", self.connector.describe());
            }
        }
    }
}
