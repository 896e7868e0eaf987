//! Supply-chain trust signal scoring and regression arithmetic.
//!
//! Signals are tri-state: `Some(true)` (present), `Some(false)` (absent),
//! `None` (the registry could not tell us either way). The score is the
//! mean of the non-null signals.

use chrono::{DateTime, NaiveDateTime, Utc};

const MS_PER_DAY: i64 = 86_400_000;

/// Parse an ISO-8601 string into epoch milliseconds.
///
/// Accepts RFC 3339 (`2023-01-01T00:00:00Z`, with or without fractional
/// seconds) and zone-less timestamps, which are treated as UTC.
pub fn epoch_ms_from_iso8601(value: Option<&str>) -> Option<i64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Package age in full days for an epoch-millis timestamp, clamped at zero.
pub fn age_days_from_epoch_ms(timestamp_ms: Option<i64>, now_ms: i64) -> Option<i64> {
    let ts = timestamp_ms?;
    Some((now_ms - ts).max(0) / MS_PER_DAY)
}

/// Mean of the non-null boolean signals, in `[0, 1]`.
///
/// `None` when every input is null.
pub fn score_from_boolean_signals(signals: &[Option<bool>]) -> Option<f64> {
    let values: Vec<f64> = signals
        .iter()
        .filter_map(|signal| signal.map(|v| if v { 1.0 } else { 0.0 }))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// True when the previous release carried the signal and the current one
/// does not. Null unless both sides are known.
pub fn regressed(current: Option<bool>, previous: Option<bool>) -> Option<bool> {
    match (current, previous) {
        (Some(cur), Some(prev)) => Some(prev && !cur),
        _ => None,
    }
}

/// `(delta, decreased)` for a score comparison.
///
/// `decreased` is true when the delta drops below `-threshold`.
pub fn score_delta(
    current: Option<f64>,
    previous: Option<f64>,
    threshold: f64,
) -> (Option<f64>, Option<bool>) {
    match (current, previous) {
        (Some(cur), Some(prev)) => {
            let delta = cur - prev;
            (Some(delta), Some(delta < -threshold.abs()))
        }
        _ => (None, None),
    }
}
