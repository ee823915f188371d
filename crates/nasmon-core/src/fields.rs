// ── Field helpers ──
//
// Upstream payloads are loosely typed: numbers arrive as strings with
// units glued on, plugin versions rename fields, and "no reading" is
// spelled several ways. These helpers keep that mess out of `parse()`.

use serde_json::{Map, Value};

/// Placeholder strings that mean "no reading".
const INVALID_READINGS: &[&str] = &["N/A", "n/a", "Unknown", "unknown", "-", ""];

/// Unit suffixes stripped before numeric parsing. Longest first.
const UNIT_SUFFIXES: &[&str] = &["°C", "MHz", "MiB", "GiB", "%", "W", "C"];

/// First alias present in `record` whose value is a real reading.
pub fn lookup<'a>(record: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| record.get(*alias))
        .find(|v| is_valid_reading(v))
}

/// `false` for null, placeholders like `"N/A"`, and blank strings.
pub fn is_valid_reading(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !INVALID_READINGS.contains(&s.trim()),
        _ => true,
    }
}

/// Numeric value of a reading, tolerating `"42 %"`, `"61°C"`, `"120.5W"`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let mut s = s.trim();
            if INVALID_READINGS.contains(&s) {
                return None;
            }
            for suffix in UNIT_SUFFIXES {
                if let Some(stripped) = s.strip_suffix(suffix) {
                    s = stripped.trim_end();
                    break;
                }
            }
            s.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric reading under the first matching alias.
pub fn number(record: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    lookup(record, aliases).and_then(parse_number)
}

/// String field, if present and non-empty.
pub fn text<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Drop the fractional part, as the plugin dashboards do.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn whole(v: f64) -> i64 {
    v.trunc() as i64
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

pub fn bytes_to_gib(bytes: f64) -> f64 {
    round_to(bytes / 1024f64.powi(3), 2)
}
