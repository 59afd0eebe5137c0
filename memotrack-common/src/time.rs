//! Timestamp utilities
//!
//! The catalog stores times as seconds since 2001-01-01T00:00:00Z (the Core
//! Data reference date). Everything inside memotrack works in UTC.

use chrono::{DateTime, TimeZone, Utc};

/// Seconds between the Unix epoch and the catalog epoch
pub const CATALOG_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a catalog timestamp to UTC
///
/// Fractional seconds are kept to nanosecond precision. Returns `None` for
/// NaN, infinities, or values outside chrono's representable range.
pub fn catalog_to_utc(catalog_seconds: f64) -> Option<DateTime<Utc>> {
    if !catalog_seconds.is_finite() {
        return None;
    }

    let whole = catalog_seconds.floor();
    let nanos = ((catalog_seconds - whole) * 1_000_000_000.0).round() as u32;
    // Rounding can carry into the next second
    let (whole, nanos) = if nanos >= 1_000_000_000 {
        (whole + 1.0, 0)
    } else {
        (whole, nanos)
    };

    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }

    let unix_seconds = (whole as i64).checked_add(CATALOG_EPOCH_OFFSET_SECS)?;
    Utc.timestamp_opt(unix_seconds, nanos).single()
}

/// Convert a UTC timestamp back to catalog seconds
pub fn utc_to_catalog(timestamp: DateTime<Utc>) -> f64 {
    let seconds = (timestamp.timestamp() - CATALOG_EPOCH_OFFSET_SECS) as f64;
    seconds + f64::from(timestamp.timestamp_subsec_nanos()) / 1_000_000_000.0
}
