//! Typed comparators for metric rules.

use regex::Regex;
use serde_json::Value;

use depgate_core::trust::epoch_ms_from_iso8601;

/// Why a comparison could not be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// The operator name is not in the registry.
    UnknownComparator(String),
    /// The operands cannot be compared that way.
    Failure(String),
}

/// Format a JSON value the way violation messages expect: strings bare,
/// numbers and booleans in their literal form, null as `None`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn numeric_pair(actual: &Value, expected: &Value) -> Result<(f64, f64), CompareError> {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(CompareError::Failure(format!(
            "cannot numerically compare {} with {}",
            format_value(actual),
            format_value(expected)
        ))),
    }
}

fn timestamp_ms(value: &Value) -> Result<i64, CompareError> {
    if let Some(ms) = value.as_i64() {
        return Ok(ms);
    }
    if let Some(text) = value.as_str() {
        if let Some(ms) = epoch_ms_from_iso8601(Some(text)) {
            return Ok(ms);
        }
    }
    Err(CompareError::Failure(format!(
        "not an ISO-8601 timestamp: {}",
        format_value(value)
    )))
}

/// Run the named comparator. `min`/`max` alias `gte`/`lte`.
pub fn compare(op: &str, actual: &Value, expected: &Value) -> Result<bool, CompareError> {
    match op {
        "eq" => Ok(values_equal(actual, expected)),
        "ne" => Ok(!values_equal(actual, expected)),
        "gt" => numeric_pair(actual, expected).map(|(a, b)| a > b),
        "gte" | "min" => numeric_pair(actual, expected).map(|(a, b)| a >= b),
        "lt" => numeric_pair(actual, expected).map(|(a, b)| a < b),
        "lte" | "max" => numeric_pair(actual, expected).map(|(a, b)| a <= b),
        "in" => match expected.as_array() {
            Some(items) => Ok(items.iter().any(|item| values_equal(actual, item))),
            None => Err(CompareError::Failure(
                "'in' expects a list operand".to_string(),
            )),
        },
        "not_in" => match expected.as_array() {
            Some(items) => Ok(!items.iter().any(|item| values_equal(actual, item))),
            None => Err(CompareError::Failure(
                "'not_in' expects a list operand".to_string(),
            )),
        },
        "contains" => match actual {
            Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, expected))),
            Value::String(text) => match expected.as_str() {
                Some(needle) => Ok(text.contains(needle)),
                None => Err(CompareError::Failure(
                    "'contains' on a string expects a string operand".to_string(),
                )),
            },
            other => Err(CompareError::Failure(format!(
                "'contains' expects a list or string, got {}",
                format_value(other)
            ))),
        },
        "regex" => {
            let pattern = expected.as_str().ok_or_else(|| {
                CompareError::Failure("'regex' expects a pattern string".to_string())
            })?;
            let compiled = Regex::new(pattern)
                .map_err(|e| CompareError::Failure(format!("invalid regex: {e}")))?;
            Ok(compiled.is_match(&format_value(actual)))
        }
        "before" => Ok(timestamp_ms(actual)? < timestamp_ms(expected)?),
        "after" => Ok(timestamp_ms(actual)? > timestamp_ms(expected)?),
        other => Err(CompareError::UnknownComparator(other.to_string())),
    }
}
