//! Upgrading datetime-looking strings into typed values.
//!
//! Source APIs commonly return timestamps as `"YYYY-MM-DD HH:MM:SS"` strings
//! in the exchange's local time. Before loading, such strings are interpreted
//! in the configured timezone and stored as [`Value::DateTime`], keeping the
//! wall-clock components exactly as given (no conversion to UTC).

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use log::debug;

use crate::record::{Record, Value};

/// Layout of datetime strings that are normalized.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// True if `s` has exactly the `YYYY-MM-DD HH:MM:SS` shape.
///
/// This only checks digits and separators; calendar validity is checked when
/// parsing.
pub fn looks_like_datetime(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 19
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            10 => *c == b' ',
            13 | 16 => *c == b':',
            _ => c.is_ascii_digit(),
        })
}

/// Parse `s` as a wall-clock datetime in `tz`.
///
/// Returns `None` if `s` does not match the layout or is not a valid calendar
/// datetime. Wall-clock times that fall in a daylight-saving gap of `tz` are
/// still returned unchanged.
pub fn parse_local_datetime(s: &str, tz: Tz) -> Option<NaiveDateTime> {
    if !looks_like_datetime(s) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()?;

    if tz.from_local_datetime(&naive).earliest().is_none() {
        debug!("{s} does not exist in {tz} (daylight-saving gap); keeping wall clock");
    }
    Some(naive)
}

/// Render a datetime back into the normalized layout.
pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Replace every datetime-looking string field of `record` in place.
///
/// Returns the number of fields converted.
pub fn normalize_record(record: &mut Record, tz: Tz) -> usize {
    let mut converted = 0;
    for value in record.values_mut() {
        let parsed = value.as_str().and_then(|s| parse_local_datetime(s, tz));
        if let Some(dt) = parsed {
            *value = Value::DateTime(dt);
            converted += 1;
        }
    }
    converted
}

/// Normalize every record of `batch`; returns the number of fields converted.
pub fn normalize_batch(batch: &mut [Record], tz: Tz) -> usize {
    batch.iter_mut().map(|r| normalize_record(r, tz)).sum()
}
