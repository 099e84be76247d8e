//! Shared types and utilities for nfinflux
//!
//! This crate contains the statistics types exchanged between the collector
//! push protocol, the capture-file scanner and the InfluxDB forwarder, plus the
//! codec for the collector wire protocol.

pub mod types;
pub mod utils;

#[cfg(feature = "wire-protocol")]
pub mod protocol;

// Re-export commonly used types
pub use types::{metric::*, stat::*};
