//! Capture-file access
//!
//! The scanner only needs the aggregate statistics and source ident stored
//! in a capture file; [`CaptureReader`] hides how they are read.

pub mod nffile;

pub use nffile::NfFileReader;

use nfinflux_shared::StatRecord;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: unsupported file layout (magic {magic:#06x}, version {version})")]
    UnsupportedLayout {
        path: PathBuf,
        magic: u16,
        version: u16,
    },

    #[error("no capture file is open")]
    NotOpen,
}

/// Reads the statistics summary of one capture file at a time.
pub trait CaptureReader {
    /// Open `path`, closing any file opened before.
    fn open(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Aggregate counters of the open file.
    fn stat(&self) -> Result<StatRecord, CaptureError>;

    /// Source identifier of the open file.
    fn ident(&self) -> &str;

    fn close(&mut self);
}
