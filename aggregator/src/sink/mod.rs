//! Time-series sink
//!
//! The forwarder owns exactly one [`WriteSession`] for the lifetime of a run.
//! Inserts do not wait for the store to acknowledge a point; failures surface
//! asynchronously and are counted into the [`SessionSummary`] returned by
//! [`WriteSession::end`], which consumes the session so it can only be ended
//! once.

pub mod influx;
pub mod line_protocol;
pub mod memory;

use async_trait::async_trait;
use nfinflux_shared::{ExporterId, MetricRecord, Proto, TimestampMillis};

/// Errors talking to the InfluxDB API.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("organisation '{0}' not found")]
    OrgNotFound(String),

    #[error("bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("API token contains characters not allowed in a header")]
    InvalidToken,

    #[error("write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One point: the counters of one protocol class of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatPoint {
    pub ident: String,
    pub exporter_id: ExporterId,
    pub proto: Proto,
    pub flows: u64,
    pub bytes: u64,
    pub packets: u64,
    pub timestamp_ms: TimestampMillis,
}

impl StatPoint {
    /// Split a record into its per-protocol points (tcp, udp, icmp, other).
    pub fn from_record(record: &MetricRecord) -> impl Iterator<Item = StatPoint> + '_ {
        Proto::ALL.into_iter().map(move |proto| StatPoint {
            ident: record.ident.clone(),
            exporter_id: record.exporter_id,
            proto,
            flows: record.stat.flows.get(proto),
            bytes: record.stat.bytes.get(proto),
            packets: record.stat.packets.get(proto),
            timestamp_ms: record.timestamp_ms,
        })
    }
}

/// Outcome of a write session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Points accepted by `insert`
    pub points: u64,
    /// Write requests the store rejected or that never reached it
    pub write_errors: u64,
}

/// An open write session on one bucket.
#[async_trait]
pub trait WriteSession: Send + Sized {
    /// Queue one point. May wait for buffer space but never for the store
    /// to acknowledge this point.
    async fn insert(&mut self, point: StatPoint);

    /// Hand everything buffered so far to the store and wait for the
    /// outstanding writes to settle.
    async fn flush(&mut self);

    /// Flush and close the session.
    async fn end(self) -> SessionSummary;
}
