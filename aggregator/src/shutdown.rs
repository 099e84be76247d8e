//! Shutdown coordination
//!
//! One [`Shutdown`] handle is shared (behind an `Arc`) by the signal listener,
//! the producers and the pipeline. It moves `Running -> Stopping -> Stopped`
//! and never back. The first transition cancels the token producers watch and
//! removes the socket path; both happen once however many callers trigger.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    Stopped,
}

impl ShutdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Stopping => "stopping",
            ShutdownState::Stopped => "stopped",
        }
    }
}

pub struct Shutdown {
    state: watch::Sender<ShutdownState>,
    token: CancellationToken,
    socket_path: Option<PathBuf>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            token: CancellationToken::new(),
            socket_path: None,
        }
    }

    /// Remove `path` when shutdown is triggered.
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Token cancelled on the `Running -> Stopping` transition.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Begin shutting down. Returns `true` for the caller that performed the
    /// transition, `false` if shutdown was already under way.
    pub fn trigger(&self, reason: &str) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Stopping;
                true
            } else {
                false
            }
        });
        if !changed {
            debug!(reason, "Shutdown already in progress");
            return false;
        }

        info!(reason, "Shutting down");
        self.token.cancel();
        if let Some(path) = &self.socket_path {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed socket file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Failed to remove socket file: {}", e),
            }
        }
        true
    }

    /// Record that the forwarder has finished. Triggers first if nobody has.
    pub fn mark_stopped(&self) {
        self.trigger("pipeline finished");
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Stopping {
                *state = ShutdownState::Stopped;
                true
            } else {
                false
            }
        });
    }

    /// Wait until the coordinator reaches `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == ShutdownState::Stopped).await;
    }

    /// Trigger on SIGINT or SIGTERM. The task exits on its own once shutdown
    /// has started for any other reason.
    pub fn spawn_signal_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let shutdown = Arc::clone(self);
        tokio::spawn(async move {
            let token = shutdown.token();
            tokio::select! {
                reason = wait_for_signal() => {
                    shutdown.trigger(reason);
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

/// Resolve on the first SIGINT or SIGTERM, naming the signal.
pub async fn wait_for_signal() -> &'static str {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
