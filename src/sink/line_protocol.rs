//! InfluxDB line protocol
//!
//! `measurement,tag=v field=1i,other="s" 1700000000000000000`
use std::fmt::Write;

use crate::point::{FieldValue, Point};

fn escape_measurement(s: &str, out: &mut String) {
    for c in s.chars() {
        if matches!(c, ',' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Tag keys, tag values and field keys
fn escape_key(s: &str, out: &mut String) {
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_string_value(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_value(value: &FieldValue, out: &mut String) -> bool {
    match value {
        FieldValue::Integer(v) => {
            let _ = write!(out, "{}i", v);
        }
        FieldValue::Float(v) => {
            if !v.is_finite() {
                return false;
            }
            let _ = write!(out, "{}", v);
        }
        FieldValue::String(v) => escape_string_value(v, out),
    }
    true
}

/// Encode a point as one line, or `None` when it has no writable field
pub fn encode(point: &Point) -> Option<String> {
    let mut line = String::with_capacity(128);
    escape_measurement(&point.measurement, &mut line);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_key(key, &mut line);
        line.push('=');
        escape_key(value, &mut line);
    }

    let mut fields = String::new();
    for (key, value) in &point.fields {
        let mark = fields.len();
        if !fields.is_empty() {
            fields.push(',');
        }
        escape_key(key, &mut fields);
        fields.push('=');
        if !write_value(value, &mut fields) {
            fields.truncate(mark);
        }
    }
    if fields.is_empty() {
        return None;
    }

    line.push(' ');
    line.push_str(&fields);

    if let Some(ns) = point.timestamp.timestamp_nanos_opt() {
        let _ = write!(line, " {}", ns);
    }

    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point() -> Point {
        let mut p = Point::new("system_resource").tag("router_host", "10.0.0.1");
        p.timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        p
    }

    #[test]
    fn test_encode_typed_fields() {
        let p = point()
            .field("cpu_load", FieldValue::Integer(37))
            .field("ratio", FieldValue::Float(0.5))
            .field("version", FieldValue::String("7.12".to_string()));

        assert_eq!(
            encode(&p).unwrap(),
            "system_resource,router_host=10.0.0.1 cpu_load=37i,ratio=0.5,version=\"7.12\" 1700000000000000000"
        );
    }

    #[test]
    fn test_escaping() {
        let p = Point::new("my meas,x")
            .tag("interface name", "ether 1,a=b")
            .field("comment", FieldValue::String("say \"hi\" \\o/".to_string()));
        let line = encode(&p).unwrap();

        assert!(line.starts_with("my\\ meas\\,x,interface\\ name=ether\\ 1\\,a\\=b "));
        assert!(line.contains("comment=\"say \\\"hi\\\" \\\\o/\""));
    }

    #[test]
    fn test_non_finite_floats_skipped() {
        let p = point()
            .field("a", FieldValue::Float(f64::NAN))
            .field("b", FieldValue::Integer(1));
        let line = encode(&p).unwrap();
        assert!(line.contains(" b=1i "));
        assert!(!line.contains("a="));

        let only_nan = point().field("a", FieldValue::Float(f64::INFINITY));
        assert!(encode(&only_nan).is_none());
    }

    #[test]
    fn test_no_fields_no_line() {
        assert!(encode(&point()).is_none());
    }

    #[test]
    fn test_empty_tag_values_skipped() {
        let p = point().tag("user", "").field("a", FieldValue::Integer(1));
        assert!(!encode(&p).unwrap().contains("user="));
    }
}
