//! Collector push protocol codec.
//!
//! A frame is a fixed 152 byte header followed by `num_metrics` fixed 104 byte
//! metric records. All integers are little-endian. The layout is decoded field
//! by field at explicit offsets, never by overlaying a native struct, so the
//! codec does not depend on any compiler's padding rules.
//!
//! ```text
//! offset size field
//!      0    1 prefix          '@'
//!      1    1 version         1
//!      2    2 declared_size   total frame length announced by the sender
//!      4    2 num_metrics     records following the header
//!      6    2 interval_secs   collector reporting interval
//!      8    8 timestamp_ms    epoch milliseconds
//!     16    8 uptime_ms       collector uptime
//!     24  128 ident           NUL terminated source identifier
//!    152      records: exporter_id, flows[4], bytes[4], packets[4] (13 x u64)
//! ```
//!
//! The collector declares the header as a C struct. Its fields end at byte 152,
//! which is already a multiple of the struct's 8 byte alignment, so no trailing
//! padding is added and `HEADER_SIZE` matches `sizeof(message_header_t)`.

use crate::types::metric::{ExporterId, MetricRecord, TimestampMillis};
use crate::types::stat::{ProtoCounters, StatRecord};
use bytes::{Buf, BufMut};
use serde::Serialize;

/// Sentinel byte every frame starts with.
pub const FRAME_PREFIX: u8 = b'@';

/// The only protocol version accepted.
pub const PROTOCOL_VERSION: u8 = 1;

/// Offset of the ident field within the header.
pub const IDENT_OFFSET: usize = 24;

/// Width of the ident field, including its NUL terminator.
pub const IDENT_LEN: usize = 128;

/// Fixed header length.
pub const HEADER_SIZE: usize = IDENT_OFFSET + IDENT_LEN;

/// Number of u64 fields in one metric record.
const RECORD_FIELDS: usize = 13;

/// Fixed metric record length.
pub const RECORD_SIZE: usize = RECORD_FIELDS * 8;

/// Largest frame a sender can describe with the 16 bit size field.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Broad class of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Bad prefix, version or declared size.
    Framing,
    /// Fewer bytes than the header or a declared record needs.
    Truncation,
}

impl DecodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeErrorKind::Framing => "framing",
            DecodeErrorKind::Truncation => "truncation",
        }
    }
}

/// Why a received buffer could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame too short: received {len} bytes, header needs {}", HEADER_SIZE)]
    Truncated { len: usize },

    #[error("bad frame prefix 0x{0:02x}")]
    BadPrefix(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("declared size {declared} exceeds received {received} bytes")]
    DeclaredSizeExceeded { declared: usize, received: usize },

    #[error("record {index} truncated: {available} bytes left, {} needed", RECORD_SIZE)]
    TruncatedRecord { index: usize, available: usize },
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::Truncated { .. } | DecodeError::TruncatedRecord { .. } => {
                DecodeErrorKind::Truncation
            }
            DecodeError::BadPrefix(_)
            | DecodeError::UnsupportedVersion(_)
            | DecodeError::DeclaredSizeExceeded { .. } => DecodeErrorKind::Framing,
        }
    }
}

/// Why a frame could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("ident is {0} bytes, at most {} fit", IDENT_LEN - 1)]
    IdentTooLong(usize),

    #[error("{0} records do not fit in a single frame")]
    TooManyRecords(usize),
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub prefix: u8,
    pub version: u8,
    pub declared_size: u16,
    pub num_metrics: u16,
    pub interval_secs: u16,
    pub timestamp_ms: TimestampMillis,
    pub uptime_ms: u64,
    pub ident: String,
}

/// One metric record as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    pub exporter_id: ExporterId,
    pub stat: StatRecord,
}

/// A complete frame: header plus records in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub header: FrameHeader,
    pub records: Vec<WireRecord>,
}

impl Frame {
    /// Start an empty frame for `ident` at `timestamp_ms`.
    pub fn new(ident: impl Into<String>, timestamp_ms: TimestampMillis) -> Self {
        Self {
            header: FrameHeader {
                prefix: FRAME_PREFIX,
                version: PROTOCOL_VERSION,
                declared_size: HEADER_SIZE as u16,
                num_metrics: 0,
                interval_secs: 0,
                timestamp_ms,
                uptime_ms: 0,
                ident: ident.into(),
            },
            records: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval_secs: u16) -> Self {
        self.header.interval_secs = interval_secs;
        self
    }

    pub fn with_uptime(mut self, uptime_ms: u64) -> Self {
        self.header.uptime_ms = uptime_ms;
        self
    }

    pub fn with_record(mut self, exporter_id: ExporterId, stat: StatRecord) -> Self {
        self.records.push(WireRecord { exporter_id, stat });
        self
    }

    /// Split the frame into queue records, stamped with the header timestamp and ident.
    pub fn into_metric_records(self) -> impl Iterator<Item = MetricRecord> {
        let FrameHeader {
            timestamp_ms,
            ident,
            ..
        } = self.header;
        self.records
            .into_iter()
            .map(move |r| MetricRecord::new(r.exporter_id, ident.clone(), timestamp_ms, r.stat))
    }

    /// Encode the frame. `declared_size` and `num_metrics` are derived from the
    /// records, whatever the header currently says.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let ident = self.header.ident.as_bytes();
        if ident.len() >= IDENT_LEN {
            return Err(EncodeError::IdentTooLong(ident.len()));
        }
        let total = HEADER_SIZE + self.records.len() * RECORD_SIZE;
        if total > MAX_FRAME_SIZE {
            return Err(EncodeError::TooManyRecords(self.records.len()));
        }

        let mut out = Vec::with_capacity(total);
        out.put_u8(self.header.prefix);
        out.put_u8(self.header.version);
        out.put_u16_le(total as u16);
        out.put_u16_le(self.records.len() as u16);
        out.put_u16_le(self.header.interval_secs);
        out.put_u64_le(self.header.timestamp_ms);
        out.put_u64_le(self.header.uptime_ms);
        out.put_slice(ident);
        out.put_bytes(0, IDENT_LEN - ident.len());

        for record in &self.records {
            out.put_u64_le(record.exporter_id);
            for counters in [&record.stat.flows, &record.stat.bytes, &record.stat.packets] {
                out.put_u64_le(counters.tcp);
                out.put_u64_le(counters.udp);
                out.put_u64_le(counters.icmp);
                out.put_u64_le(counters.other);
            }
        }
        Ok(out)
    }
}

/// Decode one received buffer.
///
/// Either every announced record is returned, in wire order, or an error is;
/// a malformed frame never yields a partial record list.
pub fn decode_frame(buf: &[u8]) -> Result<Frame, DecodeError> {
    let received = buf.len();
    if received < HEADER_SIZE {
        return Err(DecodeError::Truncated { len: received });
    }

    let mut header = &buf[..IDENT_OFFSET];
    let prefix = header.get_u8();
    if prefix != FRAME_PREFIX {
        return Err(DecodeError::BadPrefix(prefix));
    }
    let version = header.get_u8();
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let declared_size = header.get_u16_le();
    if usize::from(declared_size) > received {
        return Err(DecodeError::DeclaredSizeExceeded {
            declared: declared_size.into(),
            received,
        });
    }
    let num_metrics = header.get_u16_le();
    let interval_secs = header.get_u16_le();
    let timestamp_ms = header.get_u64_le();
    let uptime_ms = header.get_u64_le();

    let ident = decode_ident(&buf[IDENT_OFFSET..HEADER_SIZE]);

    let mut body = &buf[HEADER_SIZE..];
    let mut records = Vec::with_capacity(record_capacity(num_metrics, body.len()));
    for index in 0..usize::from(num_metrics) {
        if body.remaining() < RECORD_SIZE {
            return Err(DecodeError::TruncatedRecord {
                index,
                available: body.remaining(),
            });
        }
        records.push(decode_record(&mut body));
    }

    Ok(Frame {
        header: FrameHeader {
            prefix,
            version,
            declared_size,
            num_metrics,
            interval_secs,
            timestamp_ms,
            uptime_ms,
            ident,
        },
        records,
    })
}

/// Records the body can actually hold, never more than announced.
fn record_capacity(num_metrics: u16, body_len: usize) -> usize {
    usize::from(num_metrics).min(body_len / RECORD_SIZE)
}

/// Bytes up to the first NUL, never past the field.
fn decode_ident(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn decode_counters(buf: &mut &[u8]) -> ProtoCounters {
    ProtoCounters {
        tcp: buf.get_u64_le(),
        udp: buf.get_u64_le(),
        icmp: buf.get_u64_le(),
        other: buf.get_u64_le(),
    }
}

// Caller guarantees RECORD_SIZE bytes remain.
fn decode_record(buf: &mut &[u8]) -> WireRecord {
    let exporter_id = buf.get_u64_le();
    let flows = decode_counters(buf);
    let bytes = decode_counters(buf);
    let packets = decode_counters(buf);
    WireRecord {
        exporter_id,
        stat: StatRecord::new(flows, bytes, packets),
    }
}
