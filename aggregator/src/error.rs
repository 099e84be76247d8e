//! Error types for the ingestion service
//!
//! Per-connection and per-file errors are logged and counted where they
//! happen; only [`SetupError`] ends the process.

use crate::sink::SinkError;
use nfinflux_shared::protocol::wire::DecodeError;
use std::path::PathBuf;
use std::time::Duration;

/// Failure while serving one collector connection. The connection is dropped,
/// nothing already decoded from it is pushed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("socket read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("no data received within {0:?}")]
    ReadTimeout(Duration),

    #[error("peer closed the connection without sending data")]
    EmptyRead,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("metric queue closed")]
    QueueClosed,
}

impl IngestError {
    /// Label used for the frames metric.
    pub fn status(&self) -> &'static str {
        match self {
            IngestError::Read(_) | IngestError::ReadTimeout(_) | IngestError::EmptyRead => {
                "read_error"
            }
            IngestError::Decode(e) => e.kind().as_str(),
            IngestError::QueueClosed => "queue_closed",
        }
    }
}

/// Startup failure. Nothing downstream is started and the process exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to bind metric socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("InfluxDB bucket verification failed: {0}")]
    Bucket(#[source] SinkError),
}
