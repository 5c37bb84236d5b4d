//! Field parsing for raw portal rows.
//!
//! The Socrata API publishes timestamps as ISO 8601 with optional
//! fractional seconds; bulk CSV exports use `MM/DD/YYYY hh:mm:ss AM`.
//! Both are accepted.

use chrono::NaiveDateTime;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parses a portal timestamp. Returns `None` if empty or unrecognized.
#[must_use]
pub fn parse_portal_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Parses lat/lng strings. Returns `None` if missing, unparseable,
/// non-finite, or zero (the portal's placeholder for "no location").
#[must_use]
pub fn parse_lat_lng(lat: Option<&str>, lng: Option<&str>) -> Option<(f64, f64)> {
    let latitude = lat?.trim().parse::<f64>().ok()?;
    let longitude = lng?.trim().parse::<f64>().ok()?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }
    if latitude == 0.0 || longitude == 0.0 {
        return None;
    }
    Some((latitude, longitude))
}

/// Parses a non-negative count. Missing, negative, or malformed values
/// count as 0.
#[must_use]
pub fn parse_count(s: Option<&str>) -> u32 {
    let Some(s) = s.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    if let Ok(n) = s.parse::<u32>() {
        return n;
    }
    match s.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(v) if v.is_finite() && v >= 0.0 => v.round().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Trims and upper-cases a label; empty becomes `None`.
#[must_use]
pub fn normalize_label(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

/// Parses an optional integer, accepting `"34.0"` style values.
#[must_use]
pub fn parse_optional_int(s: Option<&str>) -> Option<i32> {
    let s = s.map(str::trim).filter(|s| !s.is_empty())?;
    if let Ok(n) = s.parse::<i32>() {
        return Some(n);
    }
    let v = s.parse::<f64>().ok().filter(|v| v.is_finite())?;
    #[allow(clippy::cast_possible_truncation)]
    let n = v.round() as i32;
    Some(n)
}
