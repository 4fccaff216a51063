//! InfluxDB line protocol encoding.
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp_ns`

use crate::types::Point;

/// Encode a point as one line (no trailing newline), nanosecond precision.
pub fn encode(point: &Point) -> String {
    let mut line = escape(point.measurement(), &[',', ' ']);

    for (key, value) in point.tags() {
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    line.push(' ');
    let fields: Vec<String> = point
        .fields()
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), value))
        .collect();
    line.push_str(&fields.join(","));

    line.push(' ');
    line.push_str(&point.timestamp_ns().to_string());
    line
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn point(measurement: &str, tenant: &str, value: f64) -> Point {
        Point::new(
            measurement,
            BTreeMap::from([("tenant_id".to_string(), tenant.to_string())]),
            BTreeMap::from([("field1".to_string(), value)]),
            Utc.timestamp_opt(1_700_000_000, 123).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_simple() {
        assert_eq!(
            encode(&point("cpu", "user1", 42.5)),
            "cpu,tenant_id=user1 field1=42.5 1700000000000000123"
        );
    }

    #[test]
    fn test_integral_float_has_no_suffix() {
        // Without an `i` suffix the engine stores the field as a float.
        let line = encode(&point("cpu", "user1", 42.0));
        assert!(line.contains(" field1=42 "));
        assert!(!line.contains("42i"));
    }

    #[test]
    fn test_escaping() {
        let line = encode(&point("cpu load", "acme, inc=1", 1.0));
        assert_eq!(
            line,
            "cpu\\ load,tenant_id=acme\\,\\ inc\\=1 field1=1 1700000000000000123"
        );
    }
}
