//! Raw Sensor Input Sanitization
//!
//! ## Overview
//!
//! Entity states arrive from the host as free-form strings and may be
//! `"unavailable"`, `"unknown"`, empty, non-numeric or wildly out of range
//! when a sensor drops off the network. This module normalizes all of that
//! into safe `Option<f32>` values before anything touches the learners.
//!
//! The contract is strict: **sanitization never errors and never panics**.
//! A value is either usable or it is `None`. Rejection reasons are not
//! reported; a missing sensor is an everyday condition, not a fault.
//!
//! ## Magnitude Guard
//!
//! Any value with `|x| > 10000` is rejected regardless of field. That bound
//! is far outside every physical quantity this engine consumes (degrees
//! Celsius, percent relative humidity, watts) and catches integer-encoded
//! error sentinels some devices report (e.g. -32768).

use crate::time::Timestamp;

/// Absolute magnitude beyond which any numeric input is rejected
pub const MAX_MAGNITUDE: f32 = 10_000.0;

/// Temperature bounds in Celsius accepted from any sensor
///
/// Matches reliable sensor operating limits; readings outside are
/// electrical faults, not weather.
pub const TEMP_MIN_C: f32 = -80.0;
/// Upper temperature bound in Celsius
pub const TEMP_MAX_C: f32 = 125.0;

/// Parse a raw entity state string into a finite float
///
/// Returns `None` for `None`, empty strings, the host's `"unavailable"` /
/// `"unknown"` sentinels (case-insensitive), anything that does not parse
/// as a number, non-finite values and values beyond the magnitude guard.
pub fn sanitize_float(raw: Option<&str>) -> Option<f32> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }

    match text.to_ascii_lowercase().as_str() {
        "unavailable" | "unknown" | "none" | "null" => return None,
        _ => {}
    }

    let value: f32 = text.parse().ok()?;
    sanitize_numeric(value)
}

/// Validate an already-numeric value: finite and within the magnitude guard
pub fn sanitize_numeric(value: f32) -> Option<f32> {
    if !value.is_finite() || value.abs() > MAX_MAGNITUDE {
        return None;
    }
    Some(value)
}

/// Sanitize a temperature reading in Celsius
pub fn sanitize_temperature(value: f32) -> Option<f32> {
    let value = sanitize_numeric(value)?;
    if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&value) {
        return None;
    }
    Some(value)
}

/// Sanitize a relative humidity reading
///
/// Values outside (0, 100] are treated as absent: a humidity sensor
/// reporting exactly 0% is indistinguishable from a disconnected probe.
pub fn sanitize_humidity(value: f32) -> Option<f32> {
    let value = sanitize_numeric(value)?;
    if value <= 0.0 || value > 100.0 {
        return None;
    }
    Some(value)
}

/// Sanitize a power consumption reading in watts
pub fn sanitize_power(value: f32) -> Option<f32> {
    let value = sanitize_numeric(value)?;
    if value < 0.0 {
        return None;
    }
    Some(value)
}

/// Sanitize an offset value against symmetric bounds
pub fn sanitize_offset(value: f32, max_offset: f32) -> Option<f32> {
    let value = sanitize_numeric(value)?;
    if value.abs() > max_offset {
        return None;
    }
    Some(value)
}

/// Sanitize a feedback timestamp: future stamps are rejected
pub fn sanitize_timestamp(ts: Timestamp, now: Timestamp) -> Option<Timestamp> {
    if ts > now {
        return None;
    }
    Some(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_host_sentinels() {
        assert_eq!(sanitize_float(None), None);
        assert_eq!(sanitize_float(Some("")), None);
        assert_eq!(sanitize_float(Some("   ")), None);
        assert_eq!(sanitize_float(Some("unavailable")), None);
        assert_eq!(sanitize_float(Some("Unknown")), None);
        assert_eq!(sanitize_float(Some("UNAVAILABLE")), None);
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(sanitize_float(Some("warm")), None);
        assert_eq!(sanitize_float(Some("23.5C")), None);
        assert_eq!(sanitize_float(Some("--")), None);
    }

    #[test]
    fn rejects_out_of_magnitude() {
        assert_eq!(sanitize_float(Some("10001")), None);
        assert_eq!(sanitize_float(Some("-32768")), None);
        assert_eq!(sanitize_numeric(f32::NAN), None);
        assert_eq!(sanitize_numeric(f32::INFINITY), None);
    }

    #[test]
    fn valid_values_round_trip() {
        assert_eq!(sanitize_float(Some("23.5")), Some(23.5));
        assert_eq!(sanitize_float(Some("-5")), Some(-5.0));
        assert_eq!(sanitize_float(Some("0")), Some(0.0));
        assert_eq!(sanitize_float(Some(" 21.0 ")), Some(21.0));
        assert_eq!(sanitize_numeric(9999.0), Some(9999.0));
    }

    #[test]
    fn humidity_open_interval() {
        assert_eq!(sanitize_humidity(0.0), None);
        assert_eq!(sanitize_humidity(-5.0), None);
        assert_eq!(sanitize_humidity(100.5), None);
        assert_eq!(sanitize_humidity(100.0), Some(100.0));
        assert_eq!(sanitize_humidity(45.0), Some(45.0));
        assert_eq!(sanitize_humidity(0.1), Some(0.1));
    }

    #[test]
    fn temperature_bounds() {
        assert_eq!(sanitize_temperature(-80.0), Some(-80.0));
        assert_eq!(sanitize_temperature(125.0), Some(125.0));
        assert_eq!(sanitize_temperature(-80.1), None);
        assert_eq!(sanitize_temperature(300.0), None);
    }

    #[test]
    fn power_non_negative() {
        assert_eq!(sanitize_power(-1.0), None);
        assert_eq!(sanitize_power(0.0), Some(0.0));
        assert_eq!(sanitize_power(850.0), Some(850.0));
    }

    #[test]
    fn timestamp_future_rejected() {
        assert_eq!(sanitize_timestamp(1001, 1000), None);
        assert_eq!(sanitize_timestamp(1000, 1000), Some(1000));
        assert_eq!(sanitize_timestamp(500, 1000), Some(500));
    }
}
