//! Turns raw device rows into points and hands them to the sink
use log::{debug, error};
use std::sync::Arc;

use super::RawRecord;
use super::classifier::{FieldClassifier, raw_text, sanitize_key};
use crate::point::Point;
use crate::sink::Sink;

/// Tag present on every point
pub const HOST_TAG: &str = "router_host";

/// Builds points from raw records and submits them to a sink
pub struct PointBuilder {
    classifier: FieldClassifier,
    sink: Arc<dyn Sink>,
}

impl PointBuilder {
    pub fn new(classifier: FieldClassifier, sink: Arc<dyn Sink>) -> Self {
        Self { classifier, sink }
    }

    pub fn classifier(&self) -> &FieldClassifier {
        &self.classifier
    }

    /// Build a point without submitting it
    pub fn build(
        &self,
        kind: &str,
        record: &RawRecord,
        extra_tags: &RawRecord,
        host: Option<&str>,
    ) -> Point {
        let measurement = kind.to_ascii_lowercase();
        let host = host.filter(|h| !h.is_empty()).unwrap_or("unknown");
        let mut point = Point::new(measurement.as_str()).tag(HOST_TAG, host);

        for (key, value) in extra_tags {
            let key = sanitize_key(key);
            if key.is_empty() || key == HOST_TAG {
                continue;
            }
            match raw_text(value) {
                Some(text) if !text.is_empty() => {
                    point.tags.insert(key, text);
                }
                _ => {}
            }
        }

        for (key, value) in record {
            for (field, field_value) in self.classifier.classify(&measurement, key, value) {
                point.fields.insert(field, field_value);
            }
        }

        point
    }

    /// Build a point and write it to the sink
    ///
    /// Returns whether the point was accepted. Points without fields are
    /// not written; write failures are logged and swallowed.
    pub fn emit(
        &self,
        kind: &str,
        record: &RawRecord,
        extra_tags: &RawRecord,
        host: Option<&str>,
    ) -> bool {
        let point = self.build(kind, record, extra_tags, host);

        if !point.has_fields() {
            debug!(
                "Skipping {} point for {} with no fields",
                point.measurement,
                host.unwrap_or("unknown")
            );
            return false;
        }

        let measurement = point.measurement.clone();
        match self.sink.write_point(point) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write {} point to {}: {}", measurement, self.sink.name(), e);
                false
            }
        }
    }
}

/// A tag set with a single entry
pub fn single_tag(key: &str, value: impl Into<String>) -> RawRecord {
    let mut tags = RawRecord::new();
    tags.insert(key.to_string(), serde_json::Value::String(value.into()));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownFieldPolicy;
    use crate::point::FieldValue;
    use crate::sink::MemorySink;
    use crate::transform::ClassificationTables;
    use serde_json::{Value, json};

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {:?}", other),
        }
    }

    fn builder(sink: Arc<MemorySink>) -> PointBuilder {
        let classifier = FieldClassifier::new(
            Arc::new(ClassificationTables::builtin()),
            UnknownFieldPolicy::Infer,
        );
        PointBuilder::new(classifier, sink)
    }

    #[test]
    fn test_host_tag_always_present() {
        let b = builder(Arc::new(MemorySink::new("test")));
        let empty = RawRecord::new();

        let point = b.build("system_clock", &record(json!({"time": "10:00:00"})), &empty, Some("10.0.0.1"));
        assert_eq!(point.get_tag(HOST_TAG), Some("10.0.0.1"));

        let point = b.build("system_clock", &empty, &empty, None);
        assert_eq!(point.get_tag(HOST_TAG), Some("unknown"));
    }

    #[test]
    fn test_extra_tags_sanitized_and_empty_skipped() {
        let b = builder(Arc::new(MemorySink::new("test")));
        let tags = record(json!({
            "Interface-Name": "ether1",
            "empty": "",
            "missing": null,
            "router_host": "spoofed",
            "vlan": 10,
        }));

        let point = b.build("interface_stats", &RawRecord::new(), &tags, Some("r1"));
        assert_eq!(point.get_tag("interface_name"), Some("ether1"));
        assert_eq!(point.get_tag("vlan"), Some("10"));
        assert_eq!(point.get_tag("empty"), None);
        assert_eq!(point.get_tag("missing"), None);
        assert_eq!(point.get_tag(HOST_TAG), Some("r1"));
    }

    #[test]
    fn test_uptime_replaced_by_seconds() {
        let b = builder(Arc::new(MemorySink::new("test")));
        let point = b.build(
            "system_resource",
            &record(json!({"uptime": "1d", "cpu-load": "37%", "version": "7.12"})),
            &RawRecord::new(),
            Some("r1"),
        );

        assert_eq!(point.get_field("uptime_seconds"), Some(&FieldValue::Integer(86_400)));
        assert!(point.get_field("uptime").is_none());
        assert_eq!(point.get_field("cpu_load"), Some(&FieldValue::Integer(37)));
        assert_eq!(
            point.get_field("version"),
            Some(&FieldValue::String("7.12".to_string()))
        );
    }

    #[test]
    fn test_null_fields_skipped() {
        let b = builder(Arc::new(MemorySink::new("test")));
        let point = b.build(
            "user",
            &record(json!({"name": "admin", "comment": null})),
            &RawRecord::new(),
            Some("r1"),
        );
        assert!(point.get_field("comment").is_none());
        assert_eq!(point.fields.len(), 1);
    }

    #[test]
    fn test_emit_writes_to_sink() {
        let sink = Arc::new(MemorySink::new("test"));
        let b = builder(sink.clone());

        assert!(b.emit("ip_arp", &record(json!({"address": "10.0.0.9"})), &RawRecord::new(), Some("r1")));
        assert_eq!(sink.points().len(), 1);
        assert_eq!(sink.points()[0].measurement, "ip_arp");
    }

    #[test]
    fn test_emit_skips_fieldless_points() {
        let sink = Arc::new(MemorySink::new("test"));
        let b = builder(sink.clone());

        assert!(!b.emit("ip_arp", &record(json!({".id": "*1"})), &RawRecord::new(), Some("r1")));
        assert!(sink.points().is_empty());
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let sink = Arc::new(MemorySink::new("test"));
        sink.fail_writes(true);
        let b = builder(sink.clone());
        let row = record(json!({"address": "10.0.0.9"}));

        assert!(!b.emit("ip_arp", &row, &RawRecord::new(), Some("r1")));

        sink.fail_writes(false);
        assert!(b.emit("ip_arp", &row, &RawRecord::new(), Some("r1")));
        assert_eq!(sink.points().len(), 1);
    }
}
