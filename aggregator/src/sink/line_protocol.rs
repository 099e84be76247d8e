//! InfluxDB line protocol rendering
//!
//! ```text
//! stat,channel=<ident>,exporter=<id>,proto=<tcp|udp|icmp|other> flows=<n>u,packets=<n>u,bytes=<n>u <epoch ms>
//! ```

use super::StatPoint;
use std::fmt::Write;

/// Measurement every point is written to.
pub const MEASUREMENT: &str = "stat";

/// Append one point, newline terminated.
pub fn write_point(out: &mut String, point: &StatPoint) {
    out.push_str(MEASUREMENT);
    // Empty tag values are not valid line protocol, drop the tag instead.
    if !point.ident.is_empty() {
        out.push_str(",channel=");
        escape_tag(out, &point.ident);
    }
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        ",exporter={},proto={} flows={}u,packets={}u,bytes={}u {}",
        point.exporter_id,
        point.proto,
        point.flows,
        point.packets,
        point.bytes,
        point.timestamp_ms
    );
}

/// Tag keys and values escape backslashes, commas, equals signs and spaces.
fn escape_tag(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' | ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfinflux_shared::Proto;

    fn point(ident: &str) -> StatPoint {
        StatPoint {
            ident: ident.to_string(),
            exporter_id: 3,
            proto: Proto::Udp,
            flows: 10,
            bytes: 2000,
            packets: 30,
            timestamp_ms: 1_672_531_200_000,
        }
    }

    #[test]
    fn test_render_point() {
        let mut out = String::new();
        write_point(&mut out, &point("live"));
        assert_eq!(
            out,
            "stat,channel=live,exporter=3,proto=udp flows=10u,packets=30u,bytes=2000u 1672531200000\n"
        );
    }

    #[test]
    fn test_escape_tag_value() {
        let mut out = String::new();
        write_point(&mut out, &point("edge router,a=b"));
        assert!(out.starts_with("stat,channel=edge\\ router\\,a\\=b,exporter=3,"));
    }

    #[test]
    fn test_trailing_backslash_keeps_exporter_tag() {
        let mut out = String::new();
        write_point(&mut out, &point("edge\\"));
        assert!(out.starts_with("stat,channel=edge\\\\,exporter=3,proto=udp "));
        assert!(!out.contains("edge\\,exporter"));
    }

    #[test]
    fn test_escape_backslash_and_control_chars() {
        let mut out = String::new();
        write_point(&mut out, &point("a\\b\tc\rd"));
        assert!(out.starts_with("stat,channel=a\\\\b\\tc\\rd,exporter=3,"));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_empty_ident_drops_tag() {
        let mut out = String::new();
        write_point(&mut out, &point(""));
        assert!(out.starts_with("stat,exporter=3,proto=udp "));
    }

    #[test]
    fn test_points_are_appended() {
        let mut out = String::new();
        write_point(&mut out, &point("a"));
        write_point(&mut out, &point("b"));
        assert_eq!(out.lines().count(), 2);
    }
}
