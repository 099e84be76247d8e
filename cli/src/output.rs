//! Output formatting utilities for CLI commands

use colored::Colorize;
use nfinflux_shared::protocol::wire::{Frame, WireRecord};
use nfinflux_shared::Proto;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Human readable dump of a decoded frame.
pub fn render_frame(frame: &Frame) -> String {
    let h = &frame.header;
    let mut out = format!(
        "{} ident={:?} version={} size={} records={} interval={}s timestamp={} uptime={}ms\n",
        "frame".bold(),
        h.ident,
        h.version,
        h.declared_size,
        h.num_metrics,
        h.interval_secs,
        h.timestamp_ms,
        h.uptime_ms
    );
    for record in &frame.records {
        out.push_str(&render_record(record));
    }
    out
}

fn render_record(record: &WireRecord) -> String {
    let mut out = format!("  exporter {}\n", record.exporter_id.to_string().cyan());
    out.push_str(&format!(
        "    {:>6} {:>14} {:>18} {:>16}\n",
        "PROTO", "FLOWS", "BYTES", "PACKETS"
    ));
    for proto in Proto::ALL {
        out.push_str(&format!(
            "    {:>6} {:>14} {:>18} {:>16}\n",
            proto.as_str(),
            record.stat.flows.get(proto),
            record.stat.bytes.get(proto),
            record.stat.packets.get(proto)
        ));
    }
    out
}
