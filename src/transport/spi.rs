//! Linux spidev link.

use super::{Connector, Link, TransportError};
use crate::protocol::{RawFrame, FRAME_LEN};
use serde::{Deserialize, Serialize};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// spidev node, e.g. `/dev/spidev0.0` for bus 0 / CE0.
    pub path: PathBuf,
    pub max_speed_hz: u32,
    /// SPI mode 0..=3 (CPOL/CPHA).
    pub mode: u8,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/spidev0.0"),
            max_speed_hz: 500_000,
            mode: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpiConnector {
    config: SpiConfig,
}

impl SpiConnector {
    pub fn new(config: SpiConfig) -> Self {
        Self { config }
    }
}

impl Connector for SpiConnector {
    type Link = SpiLink;

    fn connect(&self) -> Result<SpiLink, TransportError> {
        let mut spi = Spidev::open(&self.config.path).map_err(|source| TransportError::Open {
            path: self.config.path.clone(),
            source,
        })?;

        let mode = match self.config.mode {
            0 => SpiModeFlags::SPI_MODE_0,
            1 => SpiModeFlags::SPI_MODE_1,
            2 => SpiModeFlags::SPI_MODE_2,
            3 => SpiModeFlags::SPI_MODE_3,
            other => {
                return Err(TransportError::Configure(format!(
                    "unsupported SPI mode {other}"
                )))
            }
        };

        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(self.config.max_speed_hz)
            .mode(mode)
            .build();

        spi.configure(&options)
            .map_err(|e| TransportError::Configure(e.to_string()))?;

        info!(
            "Opened SPI device {} (mode {}, {} Hz)",
            self.config.path.display(),
            self.config.mode,
            self.config.max_speed_hz
        );

        Ok(SpiLink { spi })
    }

    fn describe(&self) -> String {
        format!("{} @ {} Hz", self.config.path.display(), self.config.max_speed_hz)
    }
}

pub struct SpiLink {
    spi: Spidev,
}

impl Link for SpiLink {
    fn exchange(&mut self, tx: &RawFrame) -> Result<RawFrame, TransportError> {
        let mut rx: RawFrame = [0; FRAME_LEN];
        let mut transfer = SpidevTransfer::read_write(tx, &mut rx);

        self.spi
            .transfer(&mut transfer)
            .map_err(|e| TransportError::Transfer(e.to_string()))?;

        Ok(rx)
    }
}
