//! Unix socket accept loop

use super::connection::handle_connection;
use crate::error::SetupError;
use nfinflux_shared::MetricRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub max_connections: usize,
    pub read_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: 64,
            read_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerSummary {
    pub connections: u64,
}

/// Listening endpoint for collector connections.
pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
    options: ServerOptions,
}

impl SocketServer {
    /// Bind `path`, replacing a stale socket file left by an earlier run.
    pub fn bind(path: impl AsRef<Path>, options: ServerOptions) -> Result<Self, SetupError> {
        let path = path.as_ref().to_path_buf();
        let bind_error = |source| SetupError::Bind {
            path: path.clone(),
            source,
        };

        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_error(e)),
        }
        let listener = UnixListener::bind(&path).map_err(bind_error)?;
        info!(path = %path.display(), "Listening for collector connections");

        Ok(Self {
            listener,
            path,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept until `token` is cancelled. Each connection gets its own task and
    /// its own sender clone; the listener and this function's sender are
    /// dropped on return, so the queue closes once the last handler finishes.
    pub async fn run(self, tx: mpsc::Sender<MetricRecord>, token: CancellationToken) -> ServerSummary {
        let permits = Arc::new(Semaphore::new(self.options.max_connections.max(1)));
        let read_timeout = self.options.read_timeout;
        let mut connections = 0u64;

        loop {
            // Wait for a free slot before accepting, so excess collectors
            // queue in the kernel backlog.
            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _addr)) => {
                    connections += 1;
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, tx, read_timeout).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!(connections, "Stopped accepting collector connections");
        ServerSummary { connections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nfsen.sock");
        std::fs::write(&path, b"stale").unwrap();

        let server = SocketServer::bind(&path, ServerOptions::default()).unwrap();
        assert_eq!(server.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_bind_failure_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nfsen.sock");
        let err = SocketServer::bind(&path, ServerOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_closes_queue() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            SocketServer::bind(dir.path().join("nfsen.sock"), ServerOptions::default()).unwrap();
        let (tx, mut rx) = mpsc::channel::<MetricRecord>(1);
        let token = CancellationToken::new();

        let handle = tokio::spawn(server.run(tx, token.clone()));
        token.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.connections, 0);
        assert!(rx.recv().await.is_none());
    }
}
