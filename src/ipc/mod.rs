//! Snapshot queries over a Unix datagram socket.
//!
//! One JSON request per datagram, one JSON reply sent back to the sender's
//! bound address.

pub mod client;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use messages::{handle_request, ImuView, IpcRequest, IpcResponse, StateView};
pub use server::IpcServer;

use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_SOCKET_PATH: &str = "/run/quadlink/sensors.sock";
pub const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("cannot prepare socket {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no reply within {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed reply: {0}")]
    Decode(#[from] serde_json::Error),
}
