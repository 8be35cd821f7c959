//! Inclusive calendar ranges and the algebra used to plan a backfill.
//!
//! A [`DateRange`] is a validated `[start, end]` interval over
//! `chrono::NaiveDateTime` values. Ranges built from configuration are
//! date-granular (both bounds at midnight); ranges derived from stored data
//! (coverage intervals) may carry a time of day.
//!
//! Two operations drive the planner:
//!
//! - [`DateRange::split`] cuts a range into chunks of at most `max_days`
//!   calendar days, so that each chunk can be fetched with a bounded request.
//! - [`DateRange::missing`] reconciles the range against existing coverage and
//!   returns the portions that still need fetching.
//!
//! ```
//! use backfill_core::date_range::DateRange;
//!
//! let wanted = DateRange::parse("2024-01-01", "2024-01-06").unwrap();
//! let chunks = wanted.split(2).unwrap();
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[1].to_string(), "2024-01-03 00:00:00 to 2024-01-04 00:00:00");
//! ```

mod day_buckets;
pub mod error;

use std::fmt;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use error::DateRangeError;
use error::{InvalidParameterSnafu, InvalidRangeSnafu, UnparsableDateSnafu};

/// Calendar date format accepted for range bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// How [`DateRange::missing_with`] treats holes between coverage intervals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Report only the portion before the first interval and after the last.
    ///
    /// Holes between intervals are left alone; this matches how existing
    /// deployments have been backfilled.
    #[default]
    EdgesOnly,
    /// Also report day-granular holes between intervals.
    IncludeInterior,
}

/// Inclusive interval `[start, end]` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    /// Build a range from typed bounds, rejecting `end < start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, DateRangeError> {
        ensure!(start <= end, InvalidRangeSnafu { start, end });
        Ok(Self { start, end })
    }

    /// Build a range from two calendar dates, both taken at midnight.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        Self::new(midnight(start), midnight(end))
    }

    /// Parse two `YYYY-MM-DD` strings into a range.
    pub fn parse(start: &str, end: &str) -> Result<Self, DateRangeError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        Self::from_dates(start, end)
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Inclusive upper bound.
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Number of calendar days touched by the range (at least 1).
    pub fn days(&self) -> i64 {
        (self.end.date() - self.start.date()).num_days() + 1
    }

    /// True if `ts` lies within `[start, end]`.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Split into ascending, adjacent chunks of at most `max_days` days.
    ///
    /// Each chunk ends at midnight of `cursor.date + (max_days - 1)`, clamped
    /// to the range end, and the next chunk starts at midnight of the
    /// following day. The last chunk may be shorter. Sub-day portions are not
    /// subdivided: a chunk never ends before it starts.
    pub fn split(&self, max_days: i64) -> Result<Vec<DateRange>, DateRangeError> {
        ensure!(max_days > 0, InvalidParameterSnafu { max_days });
        let step = Days::new((max_days - 1) as u64);

        let mut out = Vec::with_capacity((self.days() as u64).div_ceil(max_days as u64) as usize);
        let mut cursor = self.start;

        while cursor <= self.end {
            let chunk_end = cursor
                .date()
                .checked_add_days(step)
                .map(midnight)
                .filter(|end| *end <= self.end)
                .unwrap_or(self.end)
                .max(cursor);

            out.push(DateRange {
                start: cursor,
                end: chunk_end,
            });

            match chunk_end.date().succ_opt() {
                Some(next) => cursor = midnight(next),
                None => break,
            }
        }

        Ok(out)
    }

    /// Portions of `self` not covered by `existing`, edges only.
    ///
    /// `existing` is the coverage set (disjoint intervals); it is sorted by
    /// start before use. Only the part of `self` before the first interval
    /// and the part after the last one are returned. Holes between
    /// intervals are not reported; see [`GapPolicy::IncludeInterior`].
    ///
    /// With no existing coverage the whole range is missing.
    pub fn missing(&self, existing: &[DateRange]) -> Vec<DateRange> {
        self.missing_with(existing, GapPolicy::EdgesOnly)
    }

    /// Portions of `self` not covered by `existing`, under `policy`.
    pub fn missing_with(&self, existing: &[DateRange], policy: GapPolicy) -> Vec<DateRange> {
        if existing.is_empty() {
            return vec![*self];
        }

        let mut sorted = existing.to_vec();
        sorted.sort_by_key(|r| r.start);

        match policy {
            GapPolicy::EdgesOnly => self.edge_gaps(&sorted),
            GapPolicy::IncludeInterior => day_buckets::missing_days(self, &sorted),
        }
    }

    fn clamp(&self, ts: NaiveDateTime) -> NaiveDateTime {
        ts.clamp(self.start, self.end)
    }

    fn edge_gaps(&self, sorted: &[DateRange]) -> Vec<DateRange> {
        let mut out = Vec::with_capacity(2);

        let Some(first_start) = sorted.first().map(|r| r.start) else {
            return vec![*self];
        };
        let Some(last_end) = sorted.iter().map(|r| r.end).max() else {
            return vec![*self];
        };

        // Gap bounds are clamped into `self`.
        if self.start.date() < first_start.date() {
            let leading = first_start.date().pred_opt().map(|day_before| DateRange {
                start: self.start,
                end: self.clamp(midnight(day_before)),
            });
            out.extend(leading);
        }

        if last_end.date() < self.end.date() {
            let trailing = last_end.date().succ_opt().map(|day_after| DateRange {
                start: self.clamp(midnight(day_after)),
                end: self.end,
            });
            out.extend(trailing);
        }

        out
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parse a single `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).context(UnparsableDateSnafu { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dr(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    fn at(date: &str, h: u32, m: u32) -> NaiveDateTime {
        parse_date(date).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_rejects_reversed_and_garbage_bounds() {
        let err = DateRange::parse("2024-02-01", "2024-01-31").unwrap_err();
        assert!(matches!(err, DateRangeError::InvalidRange { .. }));
        assert!(err.is_invalid_range());

        let err = DateRange::parse("2024-13-01", "2024-12-31").unwrap_err();
        assert!(matches!(err, DateRangeError::UnparsableDate { .. }));
        assert!(err.is_invalid_range());

        assert!(DateRange::parse("yesterday", "2024-01-01").is_err());
    }

    #[test]
    fn single_day_range_is_valid() {
        let r = dr("2024-01-01", "2024-01-01");
        assert_eq!(r.days(), 1);
        assert_eq!(r.start(), r.end());
    }

    #[test]
    fn split_one_and_two_day_chunks() {
        let r = dr("2024-01-01", "2024-01-06");

        let ones = r.split(1).unwrap();
        assert_eq!(ones.len(), 6);
        assert!(ones.iter().all(|c| c.start() == c.end()));

        let twos = r.split(2).unwrap();
        assert_eq!(
            twos,
            vec![
                dr("2024-01-01", "2024-01-02"),
                dr("2024-01-03", "2024-01-04"),
                dr("2024-01-05", "2024-01-06"),
            ]
        );
    }

    #[test]
    fn split_last_chunk_is_clamped() {
        let chunks = dr("2024-01-01", "2024-01-10").split(4).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], dr("2024-01-09", "2024-01-10"));
    }

    #[test]
    fn split_rejects_non_positive_sizes() {
        let r = dr("2024-01-01", "2024-01-06");
        for bad in [0, -1, i64::MIN] {
            assert_eq!(
                r.split(bad).unwrap_err(),
                DateRangeError::InvalidParameter { max_days: bad }
            );
        }
    }

    #[test]
    fn split_chunks_are_adjacent_and_cover_the_range() {
        let ranges = [
            dr("2023-12-25", "2024-03-07"),
            dr("2024-02-28", "2024-03-01"),
            dr("2020-01-01", "2020-01-01"),
        ];
        for r in ranges {
            for c in 1..=40 {
                let chunks = r.split(c).unwrap();
                let expected_len = (r.days() + c - 1) / c;
                assert_eq!(chunks.len() as i64, expected_len, "{r} split {c}");

                assert_eq!(chunks.first().unwrap().start(), r.start());
                assert_eq!(chunks.last().unwrap().end(), r.end());
                for chunk in &chunks {
                    assert!(chunk.days() <= c);
                }
                for pair in chunks.windows(2) {
                    let next_day = pair[0].end().date().succ_opt().unwrap();
                    assert_eq!(pair[1].start(), midnight(next_day));
                }
            }
        }
    }

    #[test]
    fn split_with_time_of_day_never_inverts_a_chunk() {
        let r = DateRange::new(at("2024-01-01", 10, 0), at("2024-01-03", 0, 0)).unwrap();
        let chunks = r.split(1).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.start() <= c.end()));
        assert_eq!(chunks[0].start(), at("2024-01-01", 10, 0));
    }

    #[test]
    fn missing_reports_leading_and_trailing_edges_only() {
        let wanted = dr("2024-01-01", "2024-03-31");
        let existing = [dr("2024-01-03", "2024-01-07"), dr("2024-01-09", "2024-03-30")];

        let missing = wanted.missing(&existing);
        assert_eq!(
            missing,
            vec![dr("2024-01-01", "2024-01-02"), dr("2024-03-31", "2024-03-31")]
        );
    }

    #[test]
    fn missing_sorts_unordered_coverage() {
        let wanted = dr("2024-01-01", "2024-03-31");
        let existing = [dr("2024-01-09", "2024-03-30"), dr("2024-01-03", "2024-01-07")];
        assert_eq!(wanted.missing(&existing).len(), 2);
    }

    #[test]
    fn missing_with_no_coverage_is_the_whole_range() {
        let wanted = dr("2024-01-01", "2024-03-31");
        assert_eq!(wanted.missing(&[]), vec![wanted]);
        assert_eq!(
            wanted.missing_with(&[], GapPolicy::IncludeInterior),
            vec![wanted]
        );
    }

    #[test]
    fn missing_is_empty_when_fully_covered() {
        let wanted = dr("2024-01-05", "2024-01-10");
        assert!(wanted.missing(&[dr("2024-01-01", "2024-01-31")]).is_empty());
    }

    #[test]
    fn missing_ignores_time_of_day_within_covered_days() {
        let wanted = dr("2024-01-01", "2024-01-31");
        let existing =
            [DateRange::new(at("2024-01-01", 9, 30), at("2024-01-31", 16, 0)).unwrap()];
        assert!(wanted.missing(&existing).is_empty());
    }

    #[test]
    fn missing_is_clamped_to_the_desired_range() {
        let wanted = dr("2024-02-01", "2024-02-10");

        let before = [dr("2023-01-01", "2023-06-30")];
        assert_eq!(wanted.missing(&before), vec![wanted]);

        let after = [dr("2024-06-01", "2024-06-30")];
        assert_eq!(wanted.missing(&after), vec![wanted]);
    }

    #[test]
    fn include_interior_reports_holes_between_intervals() {
        let wanted = dr("2024-01-01", "2024-03-31");
        let existing = [dr("2024-01-03", "2024-01-07"), dr("2024-01-09", "2024-03-30")];

        let missing = wanted.missing_with(&existing, GapPolicy::IncludeInterior);
        assert_eq!(
            missing,
            vec![
                dr("2024-01-01", "2024-01-02"),
                dr("2024-01-08", "2024-01-08"),
                dr("2024-03-31", "2024-03-31"),
            ]
        );
    }

    #[test]
    fn leading_gap_keeps_a_time_of_day_start() {
        let wanted = DateRange::new(at("2024-01-01", 10, 0), at("2024-01-05", 0, 0)).unwrap();
        let existing = [dr("2024-01-02", "2024-01-05")];
        let expected = vec![DateRange::new(at("2024-01-01", 10, 0), at("2024-01-01", 10, 0)).unwrap()];

        assert_eq!(wanted.missing(&existing), expected);
        assert_eq!(
            wanted.missing_with(&existing, GapPolicy::IncludeInterior),
            expected
        );
    }

    #[test]
    fn trailing_gap_keeps_a_time_of_day_end() {
        let wanted = DateRange::new(at("2024-01-01", 0, 0), at("2024-01-05", 8, 0)).unwrap();
        let existing = [dr("2024-01-01", "2024-01-04")];
        let expected = vec![DateRange::new(at("2024-01-05", 0, 0), at("2024-01-05", 8, 0)).unwrap()];

        assert_eq!(wanted.missing(&existing), expected);
        assert_eq!(
            wanted.missing_with(&existing, GapPolicy::IncludeInterior),
            expected
        );
    }

    #[test]
    fn gaps_lie_inside_the_desired_range() {
        let wanted = DateRange::new(at("2024-01-01", 12, 0), at("2024-01-20", 6, 0)).unwrap();
        assert!(wanted.contains(at("2024-01-01", 12, 0)));
        assert!(!wanted.contains(at("2024-01-01", 11, 59)));
        assert!(!wanted.contains(at("2024-01-20", 6, 1)));

        let existing = [dr("2024-01-05", "2024-01-06"), dr("2024-01-10", "2024-01-11")];
        for policy in [GapPolicy::EdgesOnly, GapPolicy::IncludeInterior] {
            let gaps = wanted.missing_with(&existing, policy);
            assert!(!gaps.is_empty());
            for gap in gaps {
                assert!(wanted.contains(gap.start()) && wanted.contains(gap.end()));
            }
        }
    }

    #[test]
    fn display_uses_both_bounds() {
        assert_eq!(
            dr("2024-06-01", "2024-06-02").to_string(),
            "2024-06-01 00:00:00 to 2024-06-02 00:00:00"
        );
    }
}
