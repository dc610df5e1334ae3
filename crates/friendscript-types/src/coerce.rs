//! Loose conversions from script values to host scalar shapes.
//!
//! Command parameters are declared with concrete Rust types; these helpers
//! decide which script values are acceptable for each of them.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::value::Value;

/// A value could not be converted to the requested shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoerceError {
    #[error("expected {expected}, got {got}")]
    Mismatch { expected: &'static str, got: &'static str },
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Text form of any value. `null` becomes the empty string.
pub fn to_string(value: &Value) -> Result<String, CoerceError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(CoerceError::Mismatch {
            expected: "string",
            got: value.type_name(),
        }),
        other => Ok(other.as_text()),
    }
}

/// Integer view: ints, integral floats, numeric strings and booleans.
pub fn to_i64(value: &Value) -> Result<i64, CoerceError> {
    let mismatch = || CoerceError::Mismatch {
        expected: "int",
        got: value.type_name(),
    };
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => s.trim().parse().map_err(|_| mismatch()),
        _ => Err(mismatch()),
    }
}

/// Float view: any number or numeric string.
pub fn to_f64(value: &Value) -> Result<f64, CoerceError> {
    let mismatch = || CoerceError::Mismatch {
        expected: "float",
        got: value.type_name(),
    };
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::String(s) => s.trim().parse().map_err(|_| mismatch()),
        _ => Err(mismatch()),
    }
}

/// Boolean view: bools, `true`/`false`/`yes`/`no`/`1`/`0` strings, numbers.
pub fn to_bool(value: &Value) -> Result<bool, CoerceError> {
    let mismatch = || CoerceError::Mismatch {
        expected: "bool",
        got: value.type_name(),
    };
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        Value::Float(f) => Ok(*f != 0.0),
        Value::String(s) => match s.as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

/// Duration view: numbers are seconds, strings use [`parse_duration`].
pub fn to_duration(value: &Value) -> Result<Duration, CoerceError> {
    match value {
        Value::Int(i) if *i >= 0 => Ok(Duration::from_secs(*i as u64)),
        Value::Float(f) if *f >= 0.0 && f.is_finite() => {
            Duration::try_from_secs_f64(*f).map_err(|_| CoerceError::InvalidDuration(value.as_text()))
        }
        Value::String(s) => parse_duration(s),
        Value::Int(_) | Value::Float(_) => Err(CoerceError::InvalidDuration(value.as_text())),
        _ => Err(CoerceError::Mismatch {
            expected: "duration",
            got: value.type_name(),
        }),
    }
}

/// Parse a duration string with an optional unit suffix.
///
/// Accepts `ms`, `s`, `m`, `h` and `d`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, CoerceError> {
    let s = s.trim();
    let invalid = || CoerceError::InvalidDuration(s.to_string());
    if s.is_empty() {
        return Err(invalid());
    }

    // (digits, multiplier, divisor) so milliseconds stay exact
    let (number, multiplier, divisor) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1.0, 1000.0)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1.0, 1.0)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60.0, 1.0)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600.0, 1.0)
    } else if let Some(rest) = s.strip_suffix('d') {
        (rest, 86400.0, 1.0)
    } else {
        (s, 1.0, 1.0)
    };

    let seconds = number.trim().parse::<f64>().map_err(|_| invalid())? * multiplier / divisor;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Serde adapter for `Duration` option fields: `#[serde(deserialize_with = "...")]`.
///
/// Accepts the same inputs as [`to_duration`].
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let json = serde_json::Value::deserialize(deserializer)?;
    to_duration(&Value::from(json)).map_err(serde::de::Error::custom)
}
