//! Decides how each raw field is written, keeping one value type per key
use log::{trace, warn};
use serde_json::Value;
use std::sync::Arc;

use super::duration::parse_duration_value;
use super::tables::{ClassificationTables, Disposition, MeasurementTable, NumericKind};
use crate::config::UnknownFieldPolicy;
use crate::point::FieldValue;

/// Key suffixes holding elapsed-time strings
const DURATION_SUFFIXES: &[&str] = &[
    "uptime",
    "age",
    "expires_after",
    "last_seen",
    "time_left",
    "idle_time",
    "keepalive_timeout",
    "last_activity",
];

/// Lower-case a key, map everything outside `[a-z0-9_]` to `_` and trim
/// leading and trailing underscores
pub fn sanitize_key(key: &str) -> String {
    let mapped: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Whether `text` is `[+-]digits[.digits][(e|E)[+-]digits]`
pub fn is_numeric(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;

    let digits = |i: &mut usize| {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > start
    };

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    if !digits(&mut i) {
        return false;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        if !digits(&mut i) {
            return false;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return false;
        }
    }
    i == bytes.len()
}

fn is_float_shaped(text: &str) -> bool {
    text.contains(['.', 'e', 'E'])
}

/// Textual form of a raw value; `None` for null
pub fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

/// Field rewrites that run before any table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialTransform {
    /// `<key>` elapsed time becomes integer `<key>_seconds`
    Duration,
    /// `-55dBm@6Mbps` becomes integer `<key>_dbm`
    SignalStrength,
    /// `<tx>/<rx>` becomes integers `tx_<key>` and `rx_<key>`
    Paired,
}

fn is_duration_key(key: &str) -> bool {
    DURATION_SUFFIXES.iter().any(|suffix| {
        key == *suffix
            || key
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.ends_with('_'))
    })
}

/// Leading `[+-]digits` of a string
fn leading_integer(text: &str) -> Option<i64> {
    let sign_len = usize::from(text.starts_with(['+', '-']));
    let digit_len = text[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digit_len == 0 {
        return None;
    }
    text[..sign_len + digit_len].parse().ok()
}

/// Parse text as a number of a fixed kind
///
/// A trailing `%` is ignored. Integer fields truncate float text toward
/// zero, float fields widen integer text.
pub fn coerce_numeric(text: &str, kind: NumericKind) -> Option<FieldValue> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if !is_numeric(trimmed) {
        return None;
    }

    match kind {
        NumericKind::Integer => {
            if is_float_shaped(trimmed) {
                let f: f64 = trimmed.parse().ok()?;
                if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(FieldValue::Integer(f.trunc() as i64))
                } else {
                    None
                }
            } else {
                trimmed.parse().ok().map(FieldValue::Integer)
            }
        }
        NumericKind::Float => {
            let f: f64 = trimmed.parse().ok()?;
            f.is_finite().then_some(FieldValue::Float(f))
        }
    }
}

/// Guess a type from the value's shape
pub fn infer_value(text: &str) -> FieldValue {
    if is_numeric(text) {
        if is_float_shaped(text) {
            if let Ok(f) = text.parse::<f64>() {
                if f.is_finite() {
                    return FieldValue::Float(f);
                }
            }
        } else if let Ok(i) = text.parse::<i64>() {
            return FieldValue::Integer(i);
        }
    }
    FieldValue::String(text.to_string())
}

/// Classifies raw fields using immutable tables
#[derive(Debug, Clone)]
pub struct FieldClassifier {
    tables: Arc<ClassificationTables>,
    unknown_fields: UnknownFieldPolicy,
}

impl FieldClassifier {
    pub fn new(tables: Arc<ClassificationTables>, unknown_fields: UnknownFieldPolicy) -> Self {
        Self {
            tables,
            unknown_fields,
        }
    }

    pub fn tables(&self) -> &ClassificationTables {
        &self.tables
    }

    pub fn unknown_fields(&self) -> UnknownFieldPolicy {
        self.unknown_fields
    }

    /// Special transform for a sanitised key, if any
    pub fn special_transform(&self, kind: &str, key: &str) -> Option<SpecialTransform> {
        if is_duration_key(key) {
            Some(SpecialTransform::Duration)
        } else if key.contains("signal_strength") {
            Some(SpecialTransform::SignalStrength)
        } else if self.tables.table(kind).is_paired(key) {
            Some(SpecialTransform::Paired)
        } else {
            None
        }
    }

    /// Classify one raw field into zero or more output fields
    ///
    /// Precedence: special transforms, then the ignore, forced-string and
    /// forced-numeric tables, then inference. Null values produce nothing.
    pub fn classify(&self, kind: &str, raw_key: &str, value: &Value) -> Vec<(String, FieldValue)> {
        let key = sanitize_key(raw_key);
        if key.is_empty() {
            return Vec::new();
        }
        let Some(text) = raw_text(value) else {
            return Vec::new();
        };
        let table = self.tables.table(kind);

        if let Some(transform) = self.special_transform(kind, &key) {
            return apply_transform(transform, kind, key, value, &text);
        }

        match table.disposition(&key) {
            Disposition::Ignore => Vec::new(),
            Disposition::ForceString => vec![(key, FieldValue::String(text))],
            Disposition::ForceNumeric(numeric) => match coerce_numeric(&text, numeric) {
                Some(v) => vec![(key, v)],
                None => {
                    warn!(
                        "Dropping non-numeric value for numeric field {}.{}: {:?}",
                        kind, key, text
                    );
                    Vec::new()
                }
            },
            Disposition::Infer => self.infer(table, kind, key, &text),
        }
    }

    fn infer(
        &self,
        table: &MeasurementTable,
        kind: &str,
        key: String,
        text: &str,
    ) -> Vec<(String, FieldValue)> {
        match self.unknown_fields {
            UnknownFieldPolicy::Drop if !table.is_registered(&key) => {
                trace!("Dropping unclassified field {}.{}", kind, key);
                Vec::new()
            }
            _ => vec![(key, infer_value(text))],
        }
    }
}

fn apply_transform(
    transform: SpecialTransform,
    kind: &str,
    key: String,
    value: &Value,
    text: &str,
) -> Vec<(String, FieldValue)> {
    match transform {
        SpecialTransform::Duration => {
            let seconds = i64::try_from(parse_duration_value(value)).unwrap_or(i64::MAX);
            vec![(format!("{}_seconds", key), FieldValue::Integer(seconds))]
        }
        SpecialTransform::SignalStrength => {
            let out_key = if key.ends_with("_dbm") {
                key
            } else {
                format!("{}_dbm", key)
            };
            match leading_integer(text) {
                Some(dbm) => vec![(out_key, FieldValue::Integer(dbm))],
                None => {
                    warn!("Dropping unparseable signal strength {}.{}: {:?}", kind, out_key, text);
                    Vec::new()
                }
            }
        }
        SpecialTransform::Paired => {
            let parts: Vec<&str> = text.split(['/', ',']).map(str::trim).collect();
            let pair = match parts.as_slice() {
                [tx, rx] => tx.parse::<i64>().ok().zip(rx.parse::<i64>().ok()),
                _ => None,
            };
            match pair {
                Some((tx, rx)) => vec![
                    (format!("tx_{}", key), FieldValue::Integer(tx)),
                    (format!("rx_{}", key), FieldValue::Integer(rx)),
                ],
                None => {
                    warn!("Dropping malformed pair {}.{}: {:?}", kind, key, text);
                    Vec::new()
                }
            }
        }
    }
}
