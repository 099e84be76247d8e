//! nfinflux
//!
//! Forwards nfcapd collector statistics to InfluxDB, either live from the
//! collectors' metric socket or by scanning existing capture files.

use anyhow::{Context, Result};
use clap::Parser;
use nfinflux_aggregator::{
    capture::NfFileReader,
    config::{AggregatorConfig, Mode},
    error::SetupError,
    pipeline::{run_pipeline, PipelineOptions, Producer, RunSummary},
    scanner::DirectoryScanner,
    server::{http, ServerOptions, SocketServer},
    shutdown::Shutdown,
    sink::{influx::InfluxClient, memory::MemorySession},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "nfinflux")]
#[command(about = "Forward nfcapd statistics to InfluxDB", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "NFINFLUX_CONFIG")]
    config: Option<PathBuf>,

    /// Metric socket path collectors connect to
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Scan this directory for capture files instead of listening (repeatable)
    #[arg(short = 'M', long = "dir")]
    dirs: Vec<PathBuf>,

    /// InfluxDB URL
    #[arg(long)]
    url: Option<String>,

    /// InfluxDB API token
    #[arg(long, env = "NFINFLUX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// InfluxDB organisation
    #[arg(long)]
    org: Option<String>,

    /// InfluxDB bucket
    #[arg(short, long)]
    bucket: Option<String>,

    /// Capture interval in seconds
    #[arg(short = 't', long)]
    interval: Option<u64>,

    /// Create the bucket if it does not exist
    #[arg(long)]
    create_bucket: bool,

    /// Delete and recreate the bucket before writing
    #[arg(long)]
    delete_bucket: bool,

    /// Log points instead of writing them to InfluxDB
    #[arg(long)]
    dry_run: bool,

    /// Admin HTTP address serving /healthz, /readyz and /metrics
    #[arg(long)]
    admin_addr: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(self, config: &mut AggregatorConfig) {
        if let Some(socket) = self.socket {
            config.socket_path = Some(socket);
        }
        if !self.dirs.is_empty() {
            config.scan_dirs = self.dirs;
        }
        if let Some(url) = self.url {
            config.sink.url = url;
        }
        if let Some(token) = self.token {
            config.sink.token = token;
        }
        if let Some(org) = self.org {
            config.sink.org = org;
        }
        if let Some(bucket) = self.bucket {
            config.sink.bucket = bucket;
        }
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(addr) = self.admin_addr {
            config.admin_addr = Some(addr);
        }
        config.sink.create_bucket |= self.create_bucket;
        config.sink.delete_bucket |= self.delete_bucket;
        config.sink.dry_run |= self.dry_run;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);

    let mut config =
        AggregatorConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    let summary = run(config).await?;
    info!(
        connections = summary.connections,
        files_processed = summary.files_processed,
        files_skipped = summary.files_skipped,
        records = summary.forward.records,
        points = summary.forward.points,
        write_errors = summary.forward.write_errors,
        "nfinflux stopped"
    );
    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn run(config: AggregatorConfig) -> Result<RunSummary> {
    let mode = config.mode()?;
    let opts = PipelineOptions {
        queue_capacity: config.queue_capacity,
        flush_interval: config.flush_interval()?,
    };
    let admin_addr = config
        .admin_addr
        .as_deref()
        .map(|addr| {
            addr.parse::<SocketAddr>().map_err(|e| {
                SetupError::Config(format!("invalid admin address '{}': {}", addr, e))
            })
        })
        .transpose()?;

    // The bucket has to be usable before the socket accepts anything.
    let client = if config.sink.dry_run {
        info!("Dry run, points are logged instead of written");
        None
    } else {
        let client = InfluxClient::new(&config.sink).map_err(SetupError::Bucket)?;
        client
            .verify_bucket(
                &config.sink.bucket,
                config.sink.create_bucket,
                config.sink.delete_bucket,
            )
            .await
            .map_err(SetupError::Bucket)?;
        info!(url = %config.sink.url, bucket = %config.sink.bucket, "InfluxDB bucket ready");
        Some(client)
    };

    let (producer, shutdown) = match mode {
        Mode::Socket(path) => {
            let server = SocketServer::bind(
                &path,
                ServerOptions {
                    max_connections: config.max_connections,
                    read_timeout: config.read_timeout()?,
                },
            )?;
            let shutdown = Shutdown::new().with_socket_path(path);
            (Producer::Socket(server), Arc::new(shutdown))
        }
        Mode::Scan(roots) => {
            let scanner =
                DirectoryScanner::new(roots, config.interval_secs, Box::new(NfFileReader::new()));
            (Producer::Scan(scanner), Arc::new(Shutdown::new()))
        }
    };

    let signals = shutdown.spawn_signal_listener();

    if let Some(addr) = admin_addr {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = http::serve_admin(addr, shutdown).await {
                error!("Admin HTTP server failed: {}", e);
            }
        });
    }

    let summary = match client {
        Some(client) => {
            let session = client.start_write(&config.sink.bucket, config.sink.batch_size);
            run_pipeline(producer, session, shutdown.clone(), opts).await
        }
        None => run_pipeline(producer, MemorySession::logging(), shutdown.clone(), opts).await,
    };

    // Ends on its own once the pipeline has marked shutdown.
    let _ = signals.await;
    summary
}
