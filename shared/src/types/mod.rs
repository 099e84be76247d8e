//! Statistics types carried through the ingestion pipeline

pub mod metric;
pub mod stat;
