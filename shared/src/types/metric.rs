//! Records handed from producers to the forwarder

use super::stat::StatRecord;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Exporter id as sent by the collector (exporter_id:16 engineType:8 engineID:8).
pub type ExporterId = u64;

/// Milliseconds since the Unix epoch
pub type TimestampMillis = u64;

/// One statistics sample for one exporter of one collector.
///
/// Produced once per decoded wire record or once per scanned capture file and
/// moved through the queue to the forwarder unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub exporter_id: ExporterId,

    /// Source identifier of the collector (nfcapd `-I` ident)
    pub ident: String,

    pub timestamp_ms: TimestampMillis,

    pub stat: StatRecord,
}

impl MetricRecord {
    pub fn new(
        exporter_id: ExporterId,
        ident: impl Into<String>,
        timestamp_ms: TimestampMillis,
        stat: StatRecord,
    ) -> Self {
        Self {
            exporter_id,
            ident: ident.into(),
            timestamp_ms,
            stat,
        }
    }

    /// Record timestamp as a UTC date. Out-of-range values clamp to the epoch.
    pub fn timestamp(&self) -> DateTime<Utc> {
        i64::try_from(self.timestamp_ms)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}
