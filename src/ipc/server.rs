use super::{handle_request, IpcError, MAX_DATAGRAM};
use crate::shutdown::StopSignal;
use crate::snapshot::SnapshotCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub requests: u64,
    pub replies: u64,
    pub rejected: u64,
}

/// Serves snapshot projections; removes its socket file when dropped.
pub struct IpcServer {
    socket: UnixDatagram,
    path: PathBuf,
    cache: Arc<SnapshotCache>,
    recv_timeout: Duration,
}

impl IpcServer {
    /// Create the parent directory, replace any stale socket file, bind and open
    /// the socket to every local user. Needs a running tokio runtime.
    pub fn bind(path: impl AsRef<Path>, cache: Arc<SnapshotCache>) -> Result<Self, IpcError> {
        let path = path.as_ref().to_path_buf();
        let setup = |source: std::io::Error| IpcError::Setup {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(setup)?;
            }
        }

        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(setup(e)),
        }

        let socket = UnixDatagram::bind(&path).map_err(setup)?;

        if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o666)) {
            warn!("Cannot open {} to other users: {}", path.display(), e);
        }

        info!("IPC server listening on {}", path.display());

        Ok(Self {
            socket,
            path,
            cache,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        })
    }

    /// Upper bound on each receive, i.e. how long a stop can go unnoticed.
    pub fn with_recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn run(&self, stop: StopSignal) -> ServerStats {
        let mut stats = ServerStats::default();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        while !stop.is_stopped() {
            let (len, peer) = match timeout(self.recv_timeout, self.socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!("IPC receive failed: {}", e);
                    continue;
                }
                Ok(Ok(received)) => received,
            };
            stats.requests += 1;

            let response = handle_request(&buf[..len], &self.cache.snapshot());
            if response.error.is_some() {
                stats.rejected += 1;
            }

            let Some(peer_path) = peer.as_pathname() else {
                debug!("IPC request from an unbound peer, no reply possible");
                continue;
            };

            let bytes = match response.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Cannot encode IPC reply: {}", e);
                    continue;
                }
            };

            match self.socket.send_to(&bytes, peer_path).await {
                Ok(_) => stats.replies += 1,
                Err(e) => debug!("IPC reply to {} failed: {}", peer_path.display(), e),
            }
        }

        info!(
            "IPC server stopped ({} requests, {} replies)",
            stats.requests, stats.replies
        );
        stats
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot remove socket {}: {}", self.path.display(), e);
            }
        }
    }
}
