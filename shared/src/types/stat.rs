//! Per-protocol traffic counters
//!
//! A [`StatRecord`] holds flows, bytes and packets split by transport class
//! (tcp, udp, icmp, other): twelve counters in total. Records read from capture
//! files are cumulative over the capture interval and must be converted to
//! per-second rates before they are forwarded; records pushed by a collector
//! are forwarded as reported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol class used to break down the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Proto {
    /// All classes, in the order they appear on the wire.
    pub const ALL: [Proto; 4] = [Proto::Tcp, Proto::Udp, Proto::Icmp, Proto::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Proto::Tcp => "tcp",
            Proto::Udp => "udp",
            Proto::Icmp => "icmp",
            Proto::Other => "other",
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter per protocol class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoCounters {
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub other: u64,
}

impl ProtoCounters {
    pub fn new(tcp: u64, udp: u64, icmp: u64, other: u64) -> Self {
        Self {
            tcp,
            udp,
            icmp,
            other,
        }
    }

    /// Counter for a single protocol class.
    pub fn get(&self, proto: Proto) -> u64 {
        match proto {
            Proto::Tcp => self.tcp,
            Proto::Udp => self.udp,
            Proto::Icmp => self.icmp,
            Proto::Other => self.other,
        }
    }

    /// Sum over all classes.
    pub fn total(&self) -> u64 {
        self.tcp
            .saturating_add(self.udp)
            .saturating_add(self.icmp)
            .saturating_add(self.other)
    }

    fn per_window(&self, window_secs: u64) -> Self {
        Self {
            tcp: self.tcp / window_secs,
            udp: self.udp / window_secs,
            icmp: self.icmp / window_secs,
            other: self.other / window_secs,
        }
    }
}

/// Unit of the counters in a [`StatRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatUnit {
    /// Raw counts as read or reported.
    #[default]
    Count,
    /// Counts divided by the observation window.
    PerSecond,
}

/// Errors from [`StatRecord::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("rate window must be greater than zero seconds")]
    ZeroWindow,

    #[error("stat record is already normalized to per-second values")]
    AlreadyNormalized,
}

/// Flows, bytes and packets per protocol class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub flows: ProtoCounters,
    pub bytes: ProtoCounters,
    pub packets: ProtoCounters,

    #[serde(default)]
    unit: StatUnit,
}

impl StatRecord {
    /// Build a record of raw counts.
    pub fn new(flows: ProtoCounters, bytes: ProtoCounters, packets: ProtoCounters) -> Self {
        Self {
            flows,
            bytes,
            packets,
            unit: StatUnit::Count,
        }
    }

    pub fn unit(&self) -> StatUnit {
        self.unit
    }

    /// Convert cumulative counters into per-second rates over `window_secs`.
    ///
    /// Every counter is divided with integer truncation, so 3000 flows over a
    /// 300 second window becomes 10 flows/s and 299 bytes over the same window
    /// becomes 0. A zero window is rejected before any division takes place,
    /// and a record that is already per-second cannot be divided again.
    pub fn normalized(&self, window_secs: u64) -> Result<StatRecord, RateError> {
        if window_secs == 0 {
            return Err(RateError::ZeroWindow);
        }
        if self.unit == StatUnit::PerSecond {
            return Err(RateError::AlreadyNormalized);
        }

        Ok(StatRecord {
            flows: self.flows.per_window(window_secs),
            bytes: self.bytes.per_window(window_secs),
            packets: self.packets.per_window(window_secs),
            unit: StatUnit::PerSecond,
        })
    }
}
