//! InfluxDB line protocol encoding.
//!
//! `measurement,tag=v,tag=v value=<n>i <unix seconds>`

use crate::domain::metric_point::MetricPoint;

fn escape_measurement(raw: &str, out: &mut String) {
    for c in raw.chars() {
        if matches!(c, ',' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_tag(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            ',' | '=' | ' ' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

/// Encode one point. Tags with empty keys or values are left out.
pub fn encode_point(point: &MetricPoint, out: &mut String) {
    escape_measurement(point.measurement(), out);
    for (key, value) in point.tags() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        out.push(',');
        escape_tag(key, out);
        out.push('=');
        escape_tag(value, out);
    }
    out.push_str(" value=");
    out.push_str(&point.value().to_string());
    out.push_str("i ");
    out.push_str(&point.timestamp().timestamp().to_string());
}

/// Encode a batch, one line per point.
pub fn encode_batch(points: &[MetricPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 128);
    for point in points {
        encode_point(point, &mut out);
        out.push('\n');
    }
    out
}
