//! Decode command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use nfinflux_shared::protocol::wire::{decode_frame, Frame, HEADER_SIZE, RECORD_SIZE};
use nfinflux_shared::utils::bytes_to_hex;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding one raw frame, as read from the socket
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: Format,
}

pub fn run(args: DecodeArgs) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let frame = match decode_frame(&bytes) {
        Ok(frame) => frame,
        Err(e) => {
            let head = &bytes[..bytes.len().min(16)];
            output::error(&format!(
                "{} ({} bytes, starting {})",
                e,
                bytes.len(),
                bytes_to_hex(head)
            ));
            return Err(e.into());
        }
    };

    match args.format {
        Format::Text => {
            print!("{}", output::render_frame(&frame));
            let trailing = trailing_bytes(&frame, bytes.len());
            if trailing > 0 {
                println!("{} trailing byte(s) after the last record", trailing);
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&frame)?),
    }
    Ok(())
}

/// Bytes received beyond the header and the announced records.
fn trailing_bytes(frame: &Frame, received: usize) -> usize {
    received.saturating_sub(HEADER_SIZE + frame.records.len() * RECORD_SIZE)
}
