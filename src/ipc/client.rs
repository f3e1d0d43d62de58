use super::{IpcError, IpcResponse, MAX_DATAGRAM};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::time::timeout;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(250);

static NONCE: AtomicU32 = AtomicU32::new(0);

/// One-shot snapshot query against a running daemon.
pub struct IpcClient {
    server: PathBuf,
    timeout: Duration,
}

impl IpcClient {
    pub fn new(server: impl Into<PathBuf>) -> Self {
        Self {
            server: server.into(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get(&self) -> Result<IpcResponse, IpcError> {
        let raw = self.request(br#"{"cmd":"get"}"#).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Send `payload` verbatim and return the raw reply.
    pub async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, IpcError> {
        // The server replies to our address, so the client has to bind one.
        let local = ClientSocketPath::new();
        let socket = UnixDatagram::bind(local.path()).map_err(|source| IpcError::Setup {
            path: local.path().to_path_buf(),
            source,
        })?;

        socket.send_to(payload, &self.server).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| IpcError::Timeout(self.timeout))??;
        buf.truncate(len);
        Ok(buf)
    }
}

/// Unique temporary socket path, unlinked on drop.
struct ClientSocketPath(PathBuf);

impl ClientSocketPath {
    fn new() -> Self {
        let nonce = NONCE.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "quadlink_client_{}_{}_{}.sock",
            std::process::id(),
            nonce,
            chrono::Utc::now().timestamp_subsec_nanos()
        );
        Self(std::env::temp_dir().join(name))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ClientSocketPath {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}
