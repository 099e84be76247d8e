//! Ingestion service library
//!
//! Collector statistics arrive either over the local metric socket or from
//! capture files on disk, pass through one bounded queue and are written to
//! InfluxDB by a single forwarder.

pub mod capture;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scanner;
pub mod server;
pub mod shutdown;
pub mod sink;
