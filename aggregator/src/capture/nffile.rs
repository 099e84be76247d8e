//! nfdump capture files, layout 1
//!
//! ```text
//! file header (140 bytes, little endian)
//!   magic u16 = 0xA50C | version u16 = 1 | flags u32 | num_blocks u32 | ident [128]
//! stat record (136 bytes)
//!   flows, bytes, packets totals (u64 each)
//!   flows tcp/udp/icmp/other, bytes tcp/udp/icmp/other, packets tcp/udp/icmp/other (u64 each)
//!   first_seen u32 | last_seen u32 | msec_first u16 | msec_last u16 | sequence_failure u32
//! ```
//!
//! Only the headers are read; data blocks are never touched.

use super::{CaptureError, CaptureReader};
use bytes::Buf;
use nfinflux_shared::{ProtoCounters, StatRecord};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const NF_MAGIC: u16 = 0xA50C;
pub const LAYOUT_VERSION: u16 = 1;
pub const IDENT_LEN: usize = 128;
pub const FILE_HEADER_SIZE: usize = 12 + IDENT_LEN;
pub const STAT_RECORD_SIZE: usize = 15 * 8 + 16;

#[derive(Debug)]
struct OpenFile {
    ident: String,
    stat: StatRecord,
}

/// [`CaptureReader`] for nfdump layout 1 files.
#[derive(Debug, Default)]
pub struct NfFileReader {
    current: Option<OpenFile>,
}

impl NfFileReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureReader for NfFileReader {
    fn open(&mut self, path: &Path) -> Result<(), CaptureError> {
        self.close();
        let io_error = |source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_error)?;
        let mut raw = [0u8; FILE_HEADER_SIZE + STAT_RECORD_SIZE];
        file.read_exact(&mut raw).map_err(io_error)?;

        self.current = Some(parse_headers(path, &raw)?);
        Ok(())
    }

    fn stat(&self) -> Result<StatRecord, CaptureError> {
        self.current
            .as_ref()
            .map(|f| f.stat)
            .ok_or(CaptureError::NotOpen)
    }

    fn ident(&self) -> &str {
        self.current.as_ref().map(|f| f.ident.as_str()).unwrap_or("")
    }

    fn close(&mut self) {
        self.current = None;
    }
}

fn parse_headers(path: &Path, raw: &[u8]) -> Result<OpenFile, CaptureError> {
    let mut buf = raw;
    let magic = buf.get_u16_le();
    let version = buf.get_u16_le();
    if magic != NF_MAGIC || version != LAYOUT_VERSION {
        return Err(CaptureError::UnsupportedLayout {
            path: PathBuf::from(path),
            magic,
            version,
        });
    }
    let _flags = buf.get_u32_le();
    let _num_blocks = buf.get_u32_le();

    let ident_field = &buf[..IDENT_LEN];
    let end = ident_field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(IDENT_LEN);
    let ident = String::from_utf8_lossy(&ident_field[..end]).into_owned();
    buf.advance(IDENT_LEN);

    // Totals are the sum of the per-protocol counters.
    buf.advance(3 * 8);
    let mut counters = || {
        ProtoCounters::new(
            buf.get_u64_le(),
            buf.get_u64_le(),
            buf.get_u64_le(),
            buf.get_u64_le(),
        )
    };
    let flows = counters();
    let bytes = counters();
    let packets = counters();

    Ok(OpenFile {
        ident,
        stat: StatRecord::new(flows, bytes, packets),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::BufMut;
    use std::io::Write;

    /// Header and stat record of a layout 1 file, followed by a fake block.
    pub(crate) fn capture_bytes(
        ident: &str,
        flows: [u64; 4],
        bytes: [u64; 4],
        packets: [u64; 4],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16_le(NF_MAGIC);
        out.put_u16_le(LAYOUT_VERSION);
        out.put_u32_le(0);
        out.put_u32_le(1);
        out.put_slice(ident.as_bytes());
        out.put_bytes(0, IDENT_LEN - ident.len());

        let sum = |v: [u64; 4]| v.iter().sum::<u64>();
        out.put_u64_le(sum(flows));
        out.put_u64_le(sum(bytes));
        out.put_u64_le(sum(packets));
        for group in [flows, bytes, packets] {
            for v in group {
                out.put_u64_le(v);
            }
        }
        out.put_u32_le(1_672_531_200);
        out.put_u32_le(1_672_531_500);
        out.put_u16_le(0);
        out.put_u16_le(999);
        out.put_u32_le(0);
        assert_eq!(out.len(), FILE_HEADER_SIZE + STAT_RECORD_SIZE);
        out.put_bytes(0xEE, 32);
        out
    }

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_read_layout1_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "nfcapd.202301010000",
            &capture_bytes("upstream", [3000, 600, 30, 0], [1, 2, 3, 4], [5, 6, 7, 8]),
        );

        let mut reader = NfFileReader::new();
        reader.open(&path).unwrap();
        assert_eq!(reader.ident(), "upstream");
        let stat = reader.stat().unwrap();
        assert_eq!(stat.flows, ProtoCounters::new(3000, 600, 30, 0));
        assert_eq!(stat.bytes, ProtoCounters::new(1, 2, 3, 4));
        assert_eq!(stat.packets, ProtoCounters::new(5, 6, 7, 8));

        reader.close();
        assert!(matches!(reader.stat(), Err(CaptureError::NotOpen)));
        assert_eq!(reader.ident(), "");
    }

    #[test]
    fn test_unsupported_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = capture_bytes("x", [0; 4], [0; 4], [0; 4]);
        content[2] = 2;
        let path = write_file(dir.path(), "nfcapd.202301010000", &content);

        let err = NfFileReader::new().open(&path).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::UnsupportedLayout { magic: NF_MAGIC, version: 2, .. }
        ));
    }

    #[test]
    fn test_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "nfcapd.202301010000", &[0x0C, 0xA5, 1, 0]);
        let err = NfFileReader::new().open(&path).unwrap_err();
        assert!(matches!(err, CaptureError::Io { .. }));
    }

    #[test]
    fn test_failed_open_closes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(
            dir.path(),
            "nfcapd.202301010000",
            &capture_bytes("a", [1; 4], [1; 4], [1; 4]),
        );
        let mut reader = NfFileReader::new();
        reader.open(&good).unwrap();
        assert!(reader.open(&dir.path().join("missing")).is_err());
        assert!(reader.stat().is_err());
    }
}
