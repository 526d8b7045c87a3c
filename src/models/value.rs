//! Cell value parsing and coercion
//!
//! Cells are carried as `serde_json::Value` from pull to insert. Coercion maps
//! a raw cell onto the JSON shape a [`ColumnSpec`] expects; a value that cannot
//! be coerced becomes `Null` rather than an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::column::{ColumnSpec, ColumnType};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%Y/%m/%d"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a date from the formats the reporting APIs and workbooks emit
///
/// Accepts ISO dates, US dates, compact `YYYYMMDD` dates and the date part of
/// timestamps.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return Some(date);
        }
    }
    parse_timestamp_text(&text).map(|ts| ts.date())
}

fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Parse a timestamp; a bare date is taken as midnight
pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    parse_timestamp_text(text).or_else(|| {
        DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

fn parse_number_text(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_text(s),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Value {
    if let Value::Number(n) = value
        && let Some(i) = n.as_i64()
    {
        return Value::from(i);
    }
    match as_f64(value) {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
        _ => Value::Null,
    }
}

fn coerce_flag(value: &Value) -> Value {
    match as_f64(value) {
        Some(f) if f == 0.0 => Value::from(0),
        Some(f) if f == 1.0 => Value::from(1),
        _ => Value::Null,
    }
}

fn coerce_text(value: &Value, length: Option<u32>) -> Value {
    let text = match value {
        Value::Null => return Value::Null,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        return Value::Null;
    }
    match length {
        Some(max) if text.chars().count() > max as usize => {
            Value::String(text.chars().take(max as usize).collect())
        }
        _ => Value::String(text),
    }
}

/// Coerce a raw cell onto the type declared by `column`
///
/// * varchar: stringified, empty becomes NULL, truncated to `length` characters
/// * bigint: integral numbers only; `flag` columns accept only 0 and 1
/// * double: numbers, thousands separators stripped
/// * date/timestamp: normalised to ISO text
pub fn coerce_value(value: &Value, column: &ColumnSpec) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match column.column_type {
        ColumnType::Varchar => coerce_text(value, column.length),
        ColumnType::Bigint if column.flag => coerce_flag(value),
        ColumnType::Bigint => coerce_integer(value),
        ColumnType::Double => as_f64(value)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnType::Date => parse_date(value)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ColumnType::Timestamp | ColumnType::Timestamptz => parse_timestamp(value)
            .map(|ts| Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
    }
}
