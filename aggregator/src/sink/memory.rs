//! In-process sink used for dry runs and tests

use super::{line_protocol, SessionSummary, StatPoint, WriteSession};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::info;

/// What a [`MemorySession`] saw, delivered when it ends.
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub points: Vec<StatPoint>,
    pub flushes: usize,
}

/// Keeps every point in memory, optionally logging each one as line protocol.
pub struct MemorySession {
    points: Vec<StatPoint>,
    inserted: u64,
    flushes: usize,
    log_points: bool,
    report: Option<oneshot::Sender<MemoryReport>>,
}

impl MemorySession {
    /// A session whose contents are sent to the returned receiver on `end`.
    pub fn new() -> (Self, oneshot::Receiver<MemoryReport>) {
        let (tx, rx) = oneshot::channel();
        let session = Self {
            points: Vec::new(),
            inserted: 0,
            flushes: 0,
            log_points: false,
            report: Some(tx),
        };
        (session, rx)
    }

    /// Dry-run session: logs each point and keeps nothing.
    pub fn logging() -> Self {
        Self {
            points: Vec::new(),
            inserted: 0,
            flushes: 0,
            log_points: true,
            report: None,
        }
    }
}

#[async_trait]
impl WriteSession for MemorySession {
    async fn insert(&mut self, point: StatPoint) {
        if self.log_points {
            let mut line = String::new();
            line_protocol::write_point(&mut line, &point);
            info!("dry run: {}", line.trim_end());
        }
        self.inserted += 1;
        // Dry runs have nobody to read the points back.
        if self.report.is_some() {
            self.points.push(point);
        }
    }

    async fn flush(&mut self) {
        self.flushes += 1;
    }

    async fn end(self) -> SessionSummary {
        let summary = SessionSummary {
            points: self.inserted,
            write_errors: 0,
        };
        if let Some(tx) = self.report {
            let _ = tx.send(MemoryReport {
                points: self.points,
                flushes: self.flushes,
            });
        }
        summary
    }
}
