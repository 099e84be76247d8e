//! Producer → queue → forwarder wiring

use crate::forwarder::{ForwardSummary, Forwarder};
use crate::scanner::DirectoryScanner;
use crate::server::SocketServer;
use crate::shutdown::Shutdown;
use crate::sink::WriteSession;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Where metric records come from. Exactly one producer runs per pipeline.
pub enum Producer {
    Socket(SocketServer),
    Scan(DirectoryScanner),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub queue_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            flush_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub connections: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub forward: ForwardSummary,
}

/// Run `producer` into `session` until the producer finishes or shutdown is
/// triggered, then drain the queue, end the session and mark the
/// coordinator stopped.
///
/// A scan ends on its own once every file is read; the socket producer runs
/// until shutdown.
pub async fn run_pipeline<W>(
    producer: Producer,
    session: W,
    shutdown: Arc<Shutdown>,
    opts: PipelineOptions,
) -> Result<RunSummary>
where
    W: WriteSession + 'static,
{
    let (tx, rx) = mpsc::channel(opts.queue_capacity.max(1));
    let forwarder = tokio::spawn(Forwarder::new(session, opts.flush_interval).run(rx));

    let mut summary = RunSummary::default();
    let produced = match producer {
        Producer::Socket(server) => {
            let served = server.run(tx, shutdown.token()).await;
            summary.connections = served.connections;
            Ok(())
        }
        Producer::Scan(scanner) => scanner.run(tx, shutdown.token()).await.map(|scanned| {
            summary.files_processed = scanned.files_processed;
            summary.files_skipped = scanned.files_skipped;
        }),
    };

    // Every sender is gone once the producer and its handlers are done.
    let forwarded = forwarder.await.context("Forwarder task failed");
    shutdown.mark_stopped();

    produced?;
    summary.forward = forwarded?;
    info!(
        records = summary.forward.records,
        points = summary.forward.points,
        write_errors = summary.forward.write_errors,
        "Pipeline stopped"
    );
    Ok(summary)
}
