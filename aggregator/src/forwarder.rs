//! Single consumer of the metric queue
//!
//! Drains records into the write session until every producer has dropped its
//! sender, flushing on a timer in between. Ending the session is the last
//! thing the forwarder does.

use crate::sink::{StatPoint, WriteSession};
use nfinflux_shared::MetricRecord;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// What the forwarder moved during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardSummary {
    pub records: u64,
    pub points: u64,
    pub write_errors: u64,
}

/// Shortest flush period; a zero interval would make the ticker panic.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

pub struct Forwarder<W: WriteSession> {
    session: W,
    flush_interval: Duration,
}

impl<W: WriteSession> Forwarder<W> {
    pub fn new(session: W, flush_interval: Duration) -> Self {
        Self {
            session,
            flush_interval: flush_interval.max(MIN_FLUSH_INTERVAL),
        }
    }

    /// Run until the queue is closed and drained, then end the session.
    pub async fn run(mut self, mut rx: mpsc::Receiver<MetricRecord>) -> ForwardSummary {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut records = 0u64;
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(record) = maybe else { break };
                    records += 1;
                    for point in StatPoint::from_record(&record) {
                        self.session.insert(point).await;
                    }
                }
                _ = ticker.tick() => {
                    debug!(records, "Periodic flush");
                    self.session.flush().await;
                }
            }
        }

        info!(records, "Metric queue closed, ending write session");
        let summary = self.session.end().await;
        ForwardSummary {
            records,
            points: summary.points,
            write_errors: summary.write_errors,
        }
    }
}
