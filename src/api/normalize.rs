//! Shared parsing helpers for exchange wire formats.
//!
//! Exchanges encode quantities as strings to keep precision and send
//! timestamps either as integer milliseconds or as fractional seconds.
//! Every helper here fails with a [`FieldDecodeError`] instead of falling
//! back to a default value.

use chrono::{DateTime, Utc};
use serde_json::Number;

use super::error::FieldDecodeError;

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MILLI: i128 = 1_000_000;

/// Parse a string-encoded decimal quantity.
///
/// Accepts plain and exponent notation (`"0.001"`, `"-2.5"`, `"1e-8"`).
/// Rejects empty strings, surrounding whitespace, `NaN` and infinities.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, FieldDecodeError> {
    if raw.is_empty() {
        return Err(FieldDecodeError::new(field, raw, "empty value"));
    }

    let well_formed = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if !well_formed {
        return Err(FieldDecodeError::new(field, raw, "not a decimal number"));
    }

    let value = raw
        .parse::<f64>()
        .map_err(|e| FieldDecodeError::new(field, raw, e.to_string()))?;

    if !value.is_finite() {
        return Err(FieldDecodeError::new(field, raw, "value is not finite"));
    }

    Ok(value)
}

/// Parse an optional string-encoded decimal, where absence is legitimate.
pub fn parse_optional_decimal(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, FieldDecodeError> {
    raw.map(|value| parse_decimal(field, value)).transpose()
}

/// Convert fractional seconds since the epoch (e.g. `1609459200.5`) to an instant.
pub fn timestamp_from_epoch_seconds(
    field: &'static str,
    value: &Number,
) -> Result<DateTime<Utc>, FieldDecodeError> {
    let nanos = epoch_nanos(field, value, NANOS_PER_SECOND, 9)?;
    instant_from_nanos(field, value, nanos)
}

/// Convert milliseconds since the epoch, integer or fractional, to an instant.
pub fn timestamp_from_epoch_millis(
    field: &'static str,
    value: &Number,
) -> Result<DateTime<Utc>, FieldDecodeError> {
    let nanos = epoch_nanos(field, value, NANOS_PER_MILLI, 6)?;
    instant_from_nanos(field, value, nanos)
}

/// Total nanoseconds for `value` expressed in units of `unit_nanos`.
///
/// Decimal text is split at the point into whole units and a fraction so no
/// precision is lost in a float round-trip. Exponent notation falls back to
/// float arithmetic.
fn epoch_nanos(
    field: &'static str,
    value: &Number,
    unit_nanos: i128,
    fraction_digits: usize,
) -> Result<i128, FieldDecodeError> {
    if let Some(whole) = value.as_i64() {
        return Ok(whole as i128 * unit_nanos);
    }
    if let Some(whole) = value.as_u64() {
        return Ok(whole as i128 * unit_nanos);
    }

    let text = value.to_string();
    if text.contains(['e', 'E']) {
        let float = value
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| FieldDecodeError::new(field, text.as_str(), "not a finite number"))?;
        return Ok((float * unit_nanos as f64).round() as i128);
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let whole: i128 = whole
        .parse()
        .map_err(|_| FieldDecodeError::new(field, text.as_str(), "invalid integer part"))?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(FieldDecodeError::new(field, text.as_str(), "invalid fractional part"));
    }

    // Right-pad or cut the fraction to nanosecond resolution.
    let mut padded: String = fraction.chars().take(fraction_digits).collect();
    while padded.len() < fraction_digits {
        padded.push('0');
    }
    let fraction: i128 = padded
        .parse()
        .map_err(|_| FieldDecodeError::new(field, text.as_str(), "invalid fractional part"))?;
    let scale = unit_nanos / 10_i128.pow(fraction_digits as u32);

    let magnitude = whole * unit_nanos + fraction * scale;
    Ok(if negative { -magnitude } else { magnitude })
}

fn instant_from_nanos(
    field: &'static str,
    value: &Number,
    nanos: i128,
) -> Result<DateTime<Utc>, FieldDecodeError> {
    let seconds = i64::try_from(nanos.div_euclid(NANOS_PER_SECOND))
        .map_err(|_| FieldDecodeError::new(field, value.to_string(), "timestamp out of range"))?;
    let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as u32;

    DateTime::from_timestamp(seconds, subsec)
        .ok_or_else(|| FieldDecodeError::new(field, value.to_string(), "timestamp out of range"))
}
