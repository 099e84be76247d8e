//! Send command implementation

use crate::output;
use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use nfinflux_shared::protocol::wire::Frame;
use nfinflux_shared::utils::{parse_duration, time::system_time_millis};
use nfinflux_shared::{ProtoCounters, StatRecord};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Metric socket to connect to
    #[arg(short, long, default_value = "/tmp/nfsen.sock")]
    pub socket: PathBuf,

    /// Collector ident
    #[arg(short, long, default_value = "live")]
    pub ident: String,

    /// Exporter ids, one record each
    #[arg(short, long, value_delimiter = ',', default_value = "1")]
    pub exporter: Vec<u64>,

    /// Flows per protocol: tcp,udp,icmp,other
    #[arg(long, value_delimiter = ',', default_value = "0,0,0,0")]
    pub flows: Vec<u64>,

    /// Bytes per protocol: tcp,udp,icmp,other
    #[arg(long, value_delimiter = ',', default_value = "0,0,0,0")]
    pub bytes: Vec<u64>,

    /// Packets per protocol: tcp,udp,icmp,other
    #[arg(long, value_delimiter = ',', default_value = "0,0,0,0")]
    pub packets: Vec<u64>,

    /// Reporting interval announced in the header (seconds)
    #[arg(long, default_value = "300")]
    pub interval: u16,

    /// Frame timestamp in epoch milliseconds (default: now)
    #[arg(long)]
    pub timestamp: Option<u64>,

    /// Number of frames to send
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u64,

    /// Pause between frames (e.g. "500ms", "5s")
    #[arg(long, default_value = "1s")]
    pub every: String,

    /// Write the encoded frame to this file instead of sending it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn counters(name: &str, values: &[u64]) -> Result<ProtoCounters> {
    match values {
        [tcp, udp, icmp, other] => Ok(ProtoCounters::new(*tcp, *udp, *icmp, *other)),
        _ => bail!(
            "--{} takes four values (tcp,udp,icmp,other), got {}",
            name,
            values.len()
        ),
    }
}

/// Build the frame described by `args`.
pub fn build_frame(args: &SendArgs, timestamp_ms: u64) -> Result<Frame> {
    let stat = StatRecord::new(
        counters("flows", &args.flows)?,
        counters("bytes", &args.bytes)?,
        counters("packets", &args.packets)?,
    );
    let frame = args
        .exporter
        .iter()
        .fold(Frame::new(args.ident.clone(), timestamp_ms), |frame, id| {
            frame.with_record(*id, stat)
        })
        .with_interval(args.interval);
    Ok(frame)
}

pub async fn run(args: SendArgs) -> Result<()> {
    let every = parse_duration(&args.every).context("Invalid --every")?;

    if let Some(path) = &args.output {
        let bytes = build_frame(&args, args.timestamp.unwrap_or_else(system_time_millis))?
            .encode()
            .context("Failed to encode frame")?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        output::success(&format!("Wrote {} bytes to {}", bytes.len(), path.display()));
        return Ok(());
    }

    let progress = ProgressBar::new(args.count);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} frames {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for n in 0..args.count {
        if n > 0 {
            tokio::time::sleep(every).await;
        }
        let timestamp = args.timestamp.unwrap_or_else(system_time_millis);
        let bytes = build_frame(&args, timestamp)?
            .encode()
            .context("Failed to encode frame")?;

        let sent = send_frame(&args.socket, &bytes).await;
        if let Err(e) = sent {
            progress.abandon();
            output::error(&format!("{:#}", e));
            return Err(e);
        }
        tracing::debug!(bytes = bytes.len(), timestamp, "Frame sent");
        progress.inc(1);
    }
    progress.finish_and_clear();

    output::success(&format!(
        "Sent {} frame(s) to {}",
        args.count,
        args.socket.display()
    ));
    Ok(())
}

/// One connection per frame, as the collector does.
async fn send_frame(socket: &Path, bytes: &[u8]) -> Result<()> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("Failed to connect to {}", socket.display()))?;
    stream.write_all(bytes).await.context("Failed to send frame")?;
    stream.shutdown().await.context("Failed to close connection")?;
    Ok(())
}
