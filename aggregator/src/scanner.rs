//! Directory scanner
//!
//! Walks the configured roots for `nfcapd.<YYYYMMDDhhmm>` capture files and
//! turns the statistics summary of each into one per-second
//! [`MetricRecord`]. Files are handled one at a time on the blocking pool.

use crate::capture::{CaptureError, CaptureReader};
use crate::metrics;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nfinflux_shared::utils::time::parse_capture_stamp;
use nfinflux_shared::{MetricRecord, RateError};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File name prefix written by nfcapd.
pub const CAPTURE_PREFIX: &str = "nfcapd.";

/// Exporter id used for file statistics, which cover all exporters.
pub const FILE_EXPORTER_ID: u64 = 0;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{name}: cannot parse capture time: {source}")]
    Timestamp {
        name: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("rate conversion failed: {0}")]
    Rate(#[from] RateError),
}

/// A capture file and the time slot encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFileReference {
    pub path: PathBuf,
    pub time_slot: DateTime<Utc>,
}

/// Classify `path` by file name. `None` for anything that is not an
/// nfcapd capture file.
pub fn capture_reference(path: &Path) -> Option<Result<CaptureFileReference, ScanError>> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(CAPTURE_PREFIX)?;
    Some(
        parse_capture_stamp(stamp)
            .map(|time_slot| CaptureFileReference {
                path: path.to_path_buf(),
                time_slot,
            })
            .map_err(|source| ScanError::Timestamp {
                name: name.to_string(),
                source,
            }),
    )
}

/// All regular files below `roots`, depth first, sorted within each directory.
/// Symlinks are not followed. Unreadable directories are logged and skipped.
pub fn enumerate_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        match std::fs::symlink_metadata(root) {
            Ok(meta) if meta.is_file() => files.push(root.clone()),
            Ok(meta) if meta.is_dir() => walk(root, &mut files),
            Ok(_) => {}
            Err(e) => warn!(path = %root.display(), "Cannot scan: {}", e),
        }
    }
    files
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "Cannot read directory: {}", e);
            return;
        }
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&entry.path(), files);
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_processed: u64,
    pub files_skipped: u64,
}

/// Producer that feeds capture-file statistics to the queue.
pub struct DirectoryScanner {
    roots: Vec<PathBuf>,
    interval_secs: u64,
    reader: Box<dyn CaptureReader + Send>,
}

impl DirectoryScanner {
    pub fn new(
        roots: Vec<PathBuf>,
        interval_secs: u64,
        reader: Box<dyn CaptureReader + Send>,
    ) -> Self {
        Self {
            roots,
            interval_secs,
            reader,
        }
    }

    /// Scan every root once. Stops early when `token` is cancelled or the
    /// queue has gone away.
    pub async fn run(
        self,
        tx: mpsc::Sender<MetricRecord>,
        token: CancellationToken,
    ) -> Result<ScanSummary> {
        tokio::task::spawn_blocking(move || self.scan(&tx, &token))
            .await
            .context("Directory scan task failed")
    }

    fn scan(mut self, tx: &mpsc::Sender<MetricRecord>, token: &CancellationToken) -> ScanSummary {
        let mut summary = ScanSummary::default();
        info!(roots = ?self.roots, interval = self.interval_secs, "Scanning for capture files");

        for path in enumerate_files(&self.roots) {
            if token.is_cancelled() {
                info!("Scan interrupted by shutdown");
                break;
            }
            let reference = match capture_reference(&path) {
                None => continue,
                Some(Ok(reference)) => reference,
                Some(Err(e)) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    metrics::FILES_SCANNED.with_label_values(&["bad_name"]).inc();
                    summary.files_skipped += 1;
                    continue;
                }
            };

            let record = match self.read_record(&reference) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    metrics::FILES_SCANNED.with_label_values(&["error"]).inc();
                    summary.files_skipped += 1;
                    continue;
                }
            };

            debug!(path = %path.display(), time_slot = %reference.time_slot, "Read capture file");
            if tx.blocking_send(record).is_err() {
                warn!("Metric queue closed, stopping scan");
                break;
            }
            metrics::FILES_SCANNED.with_label_values(&["ok"]).inc();
            metrics::RECORDS_ENQUEUED.inc();
            summary.files_processed += 1;
        }

        info!(
            processed = summary.files_processed,
            skipped = summary.files_skipped,
            "Scan finished"
        );
        summary
    }

    fn read_record(&mut self, reference: &CaptureFileReference) -> Result<MetricRecord, ScanError> {
        self.reader.open(&reference.path)?;
        let result = self
            .reader
            .stat()
            .map_err(ScanError::from)
            .and_then(|stat| Ok(stat.normalized(self.interval_secs)?))
            .map(|stat| {
                MetricRecord::new(
                    FILE_EXPORTER_ID,
                    self.reader.ident(),
                    u64::try_from(reference.time_slot.timestamp_millis()).unwrap_or(0),
                    stat,
                )
            });
        self.reader.close();
        result
    }
}
