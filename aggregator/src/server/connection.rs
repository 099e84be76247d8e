//! One collector connection: one read, one frame, then close.

use crate::error::IngestError;
use crate::metrics;
use nfinflux_shared::protocol::wire::{decode_frame, MAX_FRAME_SIZE};
use nfinflux_shared::MetricRecord;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receive buffer, large enough for the biggest frame a collector can announce.
pub const READ_BUFFER_SIZE: usize = MAX_FRAME_SIZE + 1;

/// Serve one connection. Errors are logged and counted, never returned.
pub async fn handle_connection<S>(
    mut stream: S,
    tx: mpsc::Sender<MetricRecord>,
    read_timeout: Duration,
) where
    S: AsyncRead + Unpin,
{
    metrics::CONNECTIONS_ACTIVE.inc();
    let result = process_stat(&mut stream, &tx, read_timeout).await;
    metrics::CONNECTIONS_ACTIVE.dec();

    match result {
        Ok(count) => {
            metrics::FRAMES_TOTAL.with_label_values(&["ok"]).inc();
            debug!(records = count, "Frame forwarded");
        }
        Err(e) => {
            metrics::FRAMES_TOTAL.with_label_values(&[e.status()]).inc();
            warn!("Dropping collector message: {}", e);
        }
    }
}

/// Read one frame and push its records, in wire order.
///
/// The frame is decoded completely before anything is pushed, so a rejected
/// frame contributes no records.
pub async fn process_stat<S>(
    stream: &mut S,
    tx: &mpsc::Sender<MetricRecord>,
    read_timeout: Duration,
) -> Result<usize, IngestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let n = tokio::time::timeout(read_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| IngestError::ReadTimeout(read_timeout))??;
    if n == 0 {
        return Err(IngestError::EmptyRead);
    }

    let frame = decode_frame(&buf[..n])?;
    debug!(
        ident = %frame.header.ident,
        records = frame.records.len(),
        interval = frame.header.interval_secs,
        "Decoded frame"
    );

    let mut count = 0;
    for record in frame.into_metric_records() {
        tx.send(record)
            .await
            .map_err(|_| IngestError::QueueClosed)?;
        metrics::RECORDS_ENQUEUED.inc();
        count += 1;
    }
    Ok(count)
}
