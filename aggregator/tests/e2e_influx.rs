//! E2E test: bucket verification and writes against a live InfluxDB v2.
//!
//! Needs a reachable server and an all-access token:
//!   NFINFLUX_E2E_URL=http://127.0.0.1:8086 NFINFLUX_E2E_TOKEN=... \
//!     cargo test --test e2e_influx -- --ignored --nocapture

use nfinflux_aggregator::config::SinkConfig;
use nfinflux_aggregator::sink::influx::InfluxClient;
use nfinflux_aggregator::sink::{StatPoint, WriteSession};
use nfinflux_shared::utils::time::system_time_millis;
use nfinflux_shared::{MetricRecord, ProtoCounters, StatRecord};

fn sink_config() -> SinkConfig {
    SinkConfig {
        url: std::env::var("NFINFLUX_E2E_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8086".to_string()),
        token: std::env::var("NFINFLUX_E2E_TOKEN").unwrap_or_default(),
        org: std::env::var("NFINFLUX_E2E_ORG").unwrap_or_else(|_| "Netflow".to_string()),
        bucket: "nfinflux-e2e".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore] // Run explicitly via: cargo test --test e2e_influx -- --ignored --nocapture
async fn e2e_recreate_bucket_and_write() {
    let config = sink_config();
    let client = InfluxClient::new(&config).expect("build client");

    let bucket = client
        .verify_bucket(&config.bucket, true, true)
        .await
        .expect("recreate bucket");
    assert_eq!(bucket.name, config.bucket);

    let record = MetricRecord::new(
        1,
        "e2e",
        system_time_millis(),
        StatRecord::new(
            ProtoCounters::new(10, 5, 1, 0),
            ProtoCounters::new(10_000, 500, 84, 0),
            ProtoCounters::new(100, 20, 1, 0),
        ),
    );
    let mut session = client.start_write(&config.bucket, 2);
    for point in StatPoint::from_record(&record) {
        session.insert(point).await;
    }
    let summary = session.end().await;
    assert_eq!(summary.points, 4);
    assert_eq!(summary.write_errors, 0, "writes should be accepted");

    // Without create, an existing bucket is simply found.
    let again = client
        .verify_bucket(&config.bucket, false, false)
        .await
        .expect("bucket exists");
    assert_eq!(again.id, bucket.id);
}

#[tokio::test]
#[ignore]
async fn e2e_missing_bucket_without_create_fails() {
    let config = sink_config();
    let client = InfluxClient::new(&config).expect("build client");
    let result = client
        .verify_bucket("nfinflux-e2e-does-not-exist", false, false)
        .await;
    assert!(result.is_err());
}
