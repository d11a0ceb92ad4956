//! Raw query-string values and their coercion into typed JSON scalars.

use crate::error::{GrammarError, GrammarResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

/// Calendar formats accepted with the `@` suffix, besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// A value exactly as it appeared in a query clause.
///
/// A key given once carries a single value; a repeated key carries every
/// value in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// The key appeared once.
    Single(String),
    /// The key appeared several times.
    Many(Vec<String>),
}

impl RawValue {
    /// Returns true for a single empty value (`key=` or a bare `key`).
    pub fn is_empty_single(&self) -> bool {
        matches!(self, RawValue::Single(v) if v.is_empty())
    }

    /// Returns the last value given for the key.
    pub fn last(&self) -> &str {
        match self {
            RawValue::Single(v) => v,
            RawValue::Many(values) => values.last().map(String::as_str).unwrap_or(""),
        }
    }

    /// Adds another occurrence of the key.
    pub fn push(&mut self, value: String) {
        match self {
            RawValue::Single(first) => {
                let first = std::mem::take(first);
                *self = RawValue::Many(vec![first, value]);
            }
            RawValue::Many(values) => values.push(value),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(values: Vec<&str>) -> Self {
        RawValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// How a raw value is converted into a typed scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    /// Booleans and numbers are recognised, everything else stays a string.
    #[default]
    Default,
    /// The value is kept verbatim as a string (`key:=value`).
    String,
    /// The value is read as epoch milliseconds (`key@=value`).
    Date,
}

/// A coerced value, single or element-wise.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// From a single raw value.
    Single(Value),
    /// From a repeated key.
    Many(Vec<Value>),
}

/// Coerces a raw value according to `format`.
///
/// # Errors
///
/// Returns [`GrammarError::InvalidDate`] when a date-formatted value is
/// neither an integer nor a recognised calendar date.
pub fn coerce(raw: &RawValue, format: ValueFormat) -> GrammarResult<Coerced> {
    match raw {
        RawValue::Single(value) => coerce_one(value, format).map(Coerced::Single),
        RawValue::Many(values) => values
            .iter()
            .map(|value| coerce_one(value, format))
            .collect::<GrammarResult<Vec<_>>>()
            .map(Coerced::Many),
    }
}

fn coerce_one(raw: &str, format: ValueFormat) -> GrammarResult<Value> {
    match format {
        ValueFormat::Default => Ok(coerce_scalar(raw)),
        ValueFormat::String => Ok(Value::String(raw.to_string())),
        ValueFormat::Date => parse_date(raw),
    }
}

/// Default scalar coercion.
///
/// Empty strings stay empty, `true`/`false` in any letter case become
/// booleans, integer and finite decimal literals become numbers.
pub fn coerce_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string()))
}

fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::Number(Number::from(int)));
    }
    // f64::from_str also accepts "inf" and "NaN"; those stay strings.
    let float = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(float).map(Value::Number)
}

/// Parses a date-formatted value into epoch milliseconds.
///
/// An integer is taken as epoch milliseconds; a negative integer is an
/// offset from the current time. Calendar strings are read as UTC.
///
/// # Errors
///
/// Returns [`GrammarError::InvalidDate`] if nothing matches.
pub fn parse_date(raw: &str) -> GrammarResult<Value> {
    let trimmed = raw.trim();
    if let Ok(millis) = trimmed.parse::<i64>() {
        let millis = if millis < 0 {
            Utc::now().timestamp_millis().saturating_add(millis)
        } else {
            millis
        };
        return Ok(Value::from(millis));
    }
    parse_calendar_date(trimmed)
        .map(Value::from)
        .ok_or(GrammarError::InvalidDate)
}

fn parse_calendar_date(raw: &str) -> Option<i64> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.timestamp_millis());
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|datetime| datetime.and_utc().timestamp_millis());
        }
    }
    None
}
