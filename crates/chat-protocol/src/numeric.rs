//! Defensive numeric coercion for fields that cross the binary/text codec
//! boundary. JSON has no integer type distinct from float, so a `u64` that
//! round-trips through the JSON fallback path can arrive as a
//! [`serde_json::Value::Number`] carrying a float representation. These
//! helpers pull a best-effort integer or float out of a `Value` without
//! panicking on the mismatch.

use serde_json::Value;

/// Coerce a dynamic value to `i64`, accepting either an integer or a float
/// (truncated toward zero). Returns 0 for anything else, including `None`.
pub fn as_i64(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        _ => 0,
    }
}

/// Coerce a dynamic value to `u64`. Negative or non-numeric input becomes 0.
pub fn as_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .unwrap_or_else(|| n.as_f64().filter(|f| *f >= 0.0).unwrap_or(0.0) as u64),
        _ => 0,
    }
}

/// Coerce a dynamic value to `f64`. Non-numeric input becomes 0.0.
pub fn as_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}
