//! End-to-end pipeline tests over a real Unix socket
//!
//! Frames are sent by test clients the way a collector would; points are
//! captured by an in-memory write session.

use nfinflux_aggregator::capture::{CaptureError, CaptureReader};
use nfinflux_aggregator::forwarder::ForwardSummary;
use nfinflux_aggregator::pipeline::{run_pipeline, PipelineOptions, Producer, RunSummary};
use nfinflux_aggregator::scanner::DirectoryScanner;
use nfinflux_aggregator::server::{ServerOptions, SocketServer};
use nfinflux_aggregator::shutdown::{Shutdown, ShutdownState};
use nfinflux_aggregator::sink::memory::{MemoryReport, MemorySession};
use nfinflux_shared::protocol::wire::Frame;
use nfinflux_shared::{Proto, ProtoCounters, StatRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Harness {
    _dir: tempfile::TempDir,
    path: PathBuf,
    shutdown: Arc<Shutdown>,
    pipeline: JoinHandle<anyhow::Result<RunSummary>>,
    report: oneshot::Receiver<MemoryReport>,
}

fn start() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nfsen.sock");
    let server = SocketServer::bind(
        &path,
        ServerOptions {
            max_connections: 4,
            read_timeout: Duration::from_secs(2),
        },
    )
    .unwrap();
    let shutdown = Arc::new(Shutdown::new().with_socket_path(&path));
    let (session, report) = MemorySession::new();
    let pipeline = tokio::spawn(run_pipeline(
        Producer::Socket(server),
        session,
        shutdown.clone(),
        PipelineOptions {
            queue_capacity: 2,
            flush_interval: Duration::from_secs(60),
        },
    ));
    Harness {
        _dir: dir,
        path,
        shutdown,
        pipeline,
        report,
    }
}

fn stat(seed: u64) -> StatRecord {
    StatRecord::new(
        ProtoCounters::new(seed, seed + 1, seed + 2, seed + 3),
        ProtoCounters::new(seed * 100, seed * 100 + 1, seed * 100 + 2, seed * 100 + 3),
        ProtoCounters::new(seed * 10, seed * 10 + 1, seed * 10 + 2, seed * 10 + 3),
    )
}

/// Send one message and wait until the server has finished with it.
async fn send(path: &Path, bytes: &[u8]) {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    // The handler drops the connection once its records are queued.
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
}

#[tokio::test]
async fn concurrent_connections_each_yield_their_record() {
    let h = start();

    let a = Frame::new("collector-a", 1_000)
        .with_record(11, stat(1))
        .encode()
        .unwrap();
    let b = Frame::new("collector-b", 2_000)
        .with_record(22, stat(2))
        .encode()
        .unwrap();
    tokio::join!(send(&h.path, &a), send(&h.path, &b));

    assert!(h.shutdown.trigger("test"));
    let summary = h.pipeline.await.unwrap().unwrap();
    assert_eq!(summary.connections, 2);
    assert_eq!(summary.forward.records, 2);

    let report = h.report.await.unwrap();
    assert_eq!(report.points.len(), 8);
    for point in &report.points {
        let (ident, ts, seed) = match point.exporter_id {
            11 => ("collector-a", 1_000, 1),
            22 => ("collector-b", 2_000, 2),
            other => panic!("unexpected exporter {}", other),
        };
        assert_eq!(point.ident, ident);
        assert_eq!(point.timestamp_ms, ts);
        let expected = stat(seed);
        assert_eq!(point.flows, expected.flows.get(point.proto));
        assert_eq!(point.bytes, expected.bytes.get(point.proto));
        assert_eq!(point.packets, expected.packets.get(point.proto));
    }
    // Each record's points stay together in protocol order.
    let protos: Vec<Proto> = report.points[..4].iter().map(|p| p.proto).collect();
    assert_eq!(protos, Proto::ALL.to_vec());
}

#[tokio::test]
async fn bad_frame_does_not_affect_other_connections() {
    let h = start();

    let mut bad = Frame::new("bad", 1)
        .with_record(1, stat(1))
        .encode()
        .unwrap();
    bad[0] = b'!';
    let mut short = Frame::new("short", 1)
        .with_record(2, stat(2))
        .with_record(3, stat(3))
        .encode()
        .unwrap();
    short.pop();
    let good = Frame::new("good", 5).with_record(4, stat(4)).encode().unwrap();

    tokio::join!(
        send(&h.path, &bad),
        send(&h.path, &short),
        send(&h.path, &good)
    );

    h.shutdown.trigger("test");
    let summary = h.pipeline.await.unwrap().unwrap();
    assert_eq!(summary.connections, 3);
    assert_eq!(summary.forward.records, 1);

    let report = h.report.await.unwrap();
    assert!(report.points.iter().all(|p| p.ident == "good" && p.exporter_id == 4));
}

#[tokio::test]
async fn records_before_shutdown_are_delivered_once() {
    let h = start();

    // More records than the queue holds, so producers wait on the forwarder.
    let mut frame = Frame::new("burst", 9);
    for id in 0..10 {
        frame = frame.with_record(id, stat(id));
    }
    send(&h.path, &frame.encode().unwrap()).await;

    h.shutdown.trigger("test");
    let summary = h.pipeline.await.unwrap().unwrap();
    assert_eq!(
        summary.forward,
        ForwardSummary {
            records: 10,
            points: 40,
            write_errors: 0
        }
    );
    assert_eq!(h.shutdown.state(), ShutdownState::Stopped);
    assert!(!h.path.exists());

    let report = h.report.await.unwrap();
    let mut ids: Vec<u64> = report.points.iter().map(|p| p.exporter_id).collect();
    ids.dedup();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn connections_after_shutdown_are_refused() {
    let h = start();
    h.shutdown.trigger("test");
    h.pipeline.await.unwrap().unwrap();
    assert!(UnixStream::connect(&h.path).await.is_err());
}

struct StaticReader;

impl CaptureReader for StaticReader {
    fn open(&mut self, _path: &Path) -> Result<(), CaptureError> {
        Ok(())
    }

    fn stat(&self) -> Result<StatRecord, CaptureError> {
        Ok(stat(300))
    }

    fn ident(&self) -> &str {
        "archive"
    }

    fn close(&mut self) {}
}

#[tokio::test]
async fn scan_pipeline_finishes_on_its_own() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("nfcapd.202301010000"), b"").unwrap();
    std::fs::write(dir.path().join("nfcapd.202301010005"), b"").unwrap();

    let shutdown = Arc::new(Shutdown::new());
    let (session, report) = MemorySession::new();
    let scanner = DirectoryScanner::new(vec![dir.path().to_path_buf()], 300, Box::new(StaticReader));

    let summary = run_pipeline(
        Producer::Scan(scanner),
        session,
        shutdown.clone(),
        PipelineOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.forward.records, 2);
    assert_eq!(shutdown.state(), ShutdownState::Stopped);

    let report = report.await.unwrap();
    assert_eq!(report.points.len(), 8);
    // 300 flows over 300 seconds
    assert_eq!(report.points[0].flows, 1);
    assert!(report.points.iter().all(|p| p.ident == "archive" && p.exporter_id == 0));
}
