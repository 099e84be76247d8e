//! Collector-facing socket server and admin HTTP endpoint

pub mod connection;
pub mod http;
pub mod socket;

pub use socket::{ServerOptions, ServerSummary, SocketServer};
