//! Aggregator configuration
//!
//! Loaded from an optional TOML file and `NFINFLUX_*` environment variables
//! (nested keys use `__`, e.g. `NFINFLUX_SINK__TOKEN`), then overridden by
//! command line flags in `main`.

use crate::error::SetupError;
use anyhow::{Context, Result};
use nfinflux_shared::utils::parse_duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Socket path used when neither a socket nor scan directories are configured.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/nfsen.sock";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Unix socket collectors push their metrics to
    pub socket_path: Option<PathBuf>,

    /// Directories to scan for capture files (mutually exclusive with the socket)
    pub scan_dirs: Vec<PathBuf>,

    /// Capture interval in seconds, used to turn file counters into rates
    pub interval_secs: u64,

    /// Pending records between connection handlers and the forwarder
    pub queue_capacity: usize,

    /// Collector connections served concurrently
    pub max_connections: usize,

    /// How long a connection may take to deliver its frame
    pub read_timeout: String,

    /// How often buffered points are sent when traffic is light
    pub flush_interval: String,

    /// Optional admin HTTP listen address (health checks + metrics)
    pub admin_addr: Option<String>,

    /// Sink configuration
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// InfluxDB base URL
    pub url: String,

    /// API token
    pub token: String,

    /// Organisation name
    pub org: String,

    /// Destination bucket
    pub bucket: String,

    /// Create the bucket when it does not exist
    pub create_bucket: bool,

    /// Delete and recreate the bucket before writing
    pub delete_bucket: bool,

    /// Points per write request
    pub batch_size: usize,

    /// Log points instead of writing them
    pub dry_run: bool,
}

/// Which producer feeds the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Socket(PathBuf),
    Scan(Vec<PathBuf>),
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            scan_dirs: Vec::new(),
            interval_secs: 300,
            queue_capacity: 128,
            max_connections: 64,
            read_timeout: "10s".to_string(),
            flush_interval: "5s".to_string(),
            admin_addr: None,
            sink: SinkConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8086".to_string(),
            token: String::new(),
            org: "Netflow".to_string(),
            bucket: "NfSen".to_string(),
            create_bucket: false,
            delete_bucket: false,
            batch_size: 500,
            dry_run: false,
        }
    }
}

impl AggregatorConfig {
    /// Load defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("NFINFLUX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Resolve the producer mode.
    pub fn mode(&self) -> Result<Mode, SetupError> {
        match (&self.socket_path, self.scan_dirs.is_empty()) {
            (Some(_), false) => Err(SetupError::Config(
                "socket and scan directories are mutually exclusive".to_string(),
            )),
            (Some(path), true) => Ok(Mode::Socket(path.clone())),
            (None, false) => Ok(Mode::Scan(self.scan_dirs.clone())),
            (None, true) => Ok(Mode::Socket(PathBuf::from(DEFAULT_SOCKET_PATH))),
        }
    }

    pub fn read_timeout(&self) -> Result<Duration, SetupError> {
        parse_positive_duration("read_timeout", &self.read_timeout)
    }

    pub fn flush_interval(&self) -> Result<Duration, SetupError> {
        parse_positive_duration("flush_interval", &self.flush_interval)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SetupError> {
        self.mode()?;
        self.read_timeout()?;
        self.flush_interval()?;

        if self.interval_secs == 0 {
            return Err(SetupError::Config(
                "interval must be greater than 0 seconds".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SetupError::Config(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(SetupError::Config(
                "max connections must be greater than 0".to_string(),
            ));
        }
        if self.sink.batch_size == 0 {
            return Err(SetupError::Config(
                "sink batch size must be greater than 0".to_string(),
            ));
        }
        if !self.sink.dry_run {
            if self.sink.bucket.is_empty() || self.sink.org.is_empty() {
                return Err(SetupError::Config(
                    "sink bucket and organisation are required".to_string(),
                ));
            }
            if self.sink.url.is_empty() {
                return Err(SetupError::Config("sink url is required".to_string()));
            }
        }
        Ok(())
    }
}

fn parse_positive_duration(name: &str, value: &str) -> Result<Duration, SetupError> {
    match parse_duration(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        Ok(_) => Err(SetupError::Config(format!("{} must be greater than 0", name))),
        Err(e) => Err(SetupError::Config(format!(
            "{} '{}' is not a duration: {}",
            name, value, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_socket_mode() {
        let config = AggregatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.mode().unwrap(),
            Mode::Socket(PathBuf::from(DEFAULT_SOCKET_PATH))
        );
        assert_eq!(config.flush_interval().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_scan_mode() {
        let config = AggregatorConfig {
            scan_dirs: vec![PathBuf::from("/var/nfdump")],
            ..Default::default()
        };
        assert_eq!(
            config.mode().unwrap(),
            Mode::Scan(vec![PathBuf::from("/var/nfdump")])
        );
    }

    #[test]
    fn test_socket_and_scan_are_exclusive() {
        let config = AggregatorConfig {
            socket_path: Some(PathBuf::from("/tmp/x.sock")),
            scan_dirs: vec![PathBuf::from("/var/nfdump")],
            ..Default::default()
        };
        assert!(config.mode().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let zero_interval = AggregatorConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let zero_queue = AggregatorConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());

        let zero_flush = AggregatorConfig {
            flush_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(zero_flush.validate().is_err());

        let bad_timeout = AggregatorConfig {
            read_timeout: "soon".to_string(),
            ..Default::default()
        };
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn test_dry_run_needs_no_bucket() {
        let mut config = AggregatorConfig::default();
        config.sink.bucket.clear();
        assert!(config.validate().is_err());

        config.sink.dry_run = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
interval_secs = 60
scan_dirs = ["/data/flows"]

[sink]
bucket = "flows"
batch_size = 50
"#
        )
        .unwrap();

        let config = AggregatorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.scan_dirs, vec![PathBuf::from("/data/flows")]);
        assert_eq!(config.sink.bucket, "flows");
        assert_eq!(config.sink.batch_size, 50);
        // untouched keys keep their defaults
        assert_eq!(config.sink.org, "Netflow");
        assert_eq!(config.queue_capacity, 128);
    }
}
