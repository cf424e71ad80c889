//! Elapsed-time strings such as `1w2d3h4m5s`
use serde_json::Value;

const WEEK: u64 = 604_800;
const DAY: u64 = 86_400;
const HOUR: u64 = 3_600;
const MINUTE: u64 = 60;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Unit {
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl Unit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "w" => Some(Unit::Week),
            "d" => Some(Unit::Day),
            "h" => Some(Unit::Hour),
            "m" => Some(Unit::Minute),
            "s" => Some(Unit::Second),
            "ms" => Some(Unit::Millisecond),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn seconds(self, n: u64) -> u64 {
        match self {
            Unit::Week => n.saturating_mul(WEEK),
            Unit::Day => n.saturating_mul(DAY),
            Unit::Hour => n.saturating_mul(HOUR),
            Unit::Minute => n.saturating_mul(MINUTE),
            Unit::Second => n,
            Unit::Millisecond => n / 1000,
        }
    }
}

/// Total seconds in a `<N>w<N>d<N>h<N>m<N>s` string
///
/// Segments are picked up independently of their order; when a unit
/// appears twice only the first occurrence counts. Input without any
/// recognisable segment yields `0`.
pub fn parse_duration(input: &str) -> u64 {
    let mut seen = [false; 6];
    let mut total: u64 = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !c.is_ascii_digit() {
            continue;
        }

        let mut end = start + c.len_utf8();
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + d.len_utf8();
            chars.next();
        }
        let digits = &input[start..end];

        let unit_start = end;
        let mut unit_end = end;
        while let Some(&(i, u)) = chars.peek() {
            if !u.is_ascii_alphabetic() {
                break;
            }
            unit_end = i + u.len_utf8();
            chars.next();
        }

        let Some(unit) = Unit::from_suffix(&input[unit_start..unit_end]) else {
            continue;
        };
        if seen[unit.index()] {
            continue;
        }
        seen[unit.index()] = true;

        let n = digits.parse::<u64>().unwrap_or(u64::MAX);
        total = total.saturating_add(unit.seconds(n));
    }

    total
}

/// Like [`parse_duration`], for a raw record value; anything that is not a
/// string yields `0`
pub fn parse_duration_value(value: &Value) -> u64 {
    match value {
        Value::String(s) => parse_duration(s),
        _ => 0,
    }
}
