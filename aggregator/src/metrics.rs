//! Prometheus metrics for the ingestion service

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Socket metrics ───────────────────────────────────────────────────────────

pub static FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nfinflux_frames_total",
        "Collector frames received, by decode status",
        &["status"]
    )
    .expect("register nfinflux_frames_total")
});

pub static CONNECTIONS_ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "nfinflux_connections_active",
        "Collector connections currently being served"
    )
    .expect("register nfinflux_connections_active")
});

pub static RECORDS_ENQUEUED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "nfinflux_records_enqueued_total",
        "Metric records handed to the forwarder queue"
    )
    .expect("register nfinflux_records_enqueued_total")
});

// ── Scanner metrics ──────────────────────────────────────────────────────────

pub static FILES_SCANNED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nfinflux_files_scanned_total",
        "Capture files visited by the directory scanner",
        &["status"]
    )
    .expect("register nfinflux_files_scanned_total")
});

// ── Sink metrics ─────────────────────────────────────────────────────────────

pub static POINTS_WRITTEN: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "nfinflux_points_written_total",
        "Points handed to the InfluxDB writer"
    )
    .expect("register nfinflux_points_written_total")
});

pub static SINK_WRITE_ERRORS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "nfinflux_sink_write_errors_total",
        "Failed InfluxDB write requests"
    )
    .expect("register nfinflux_sink_write_errors_total")
});

pub static SINK_WRITE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "nfinflux_sink_write_duration_seconds",
        "InfluxDB write request latency",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("register nfinflux_sink_write_duration_seconds")
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
