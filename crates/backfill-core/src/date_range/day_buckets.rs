//! Day-granular coverage bitmaps used for interior gap detection.
//!
//! Each calendar day maps to a `u32` bucket id (days since 0001-01-01, the
//! proleptic Gregorian "common era" day count). Coverage intervals are
//! rasterized into a `RoaringBitmap`, subtracted from the expected domain, and
//! the remaining buckets are grouped back into contiguous runs.

use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use roaring::RoaringBitmap;

use super::{DateRange, midnight};

/// Day bucket id. Dates before the common era have no bucket.
pub(crate) type DayBucket = u32;

pub(crate) fn day_bucket(date: NaiveDate) -> Option<DayBucket> {
    u32::try_from(date.num_days_from_ce()).ok()
}

fn bucket_date(bucket: DayBucket) -> Option<NaiveDate> {
    i32::try_from(bucket)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}

/// Inclusive day buckets touched by `range`, or `None` if the range starts
/// before the representable domain.
fn range_buckets(range: &DateRange) -> Option<RangeInclusive<DayBucket>> {
    let first = day_bucket(range.start().date())?;
    let last = day_bucket(range.end().date())?;
    Some(first..=last)
}

/// Set of calendar days known to be present.
#[derive(Debug, Clone, Default)]
pub(crate) struct DayCoverage {
    bitmap: RoaringBitmap,
}

impl DayCoverage {
    pub(crate) fn from_ranges<'a>(ranges: impl IntoIterator<Item = &'a DateRange>) -> Self {
        let mut bitmap = RoaringBitmap::new();
        for range in ranges {
            if let Some(days) = range_buckets(range) {
                bitmap.insert_range(days);
            }
        }
        Self { bitmap }
    }

    /// Contiguous runs of `expected - present`, inclusive in bucket space.
    pub(crate) fn missing_runs(&self, expected: &RoaringBitmap) -> Vec<RangeInclusive<DayBucket>> {
        let mut missing = expected.clone();
        missing -= &self.bitmap;
        runs_from_bitmap(&missing)
    }
}

fn runs_from_bitmap(bitmap: &RoaringBitmap) -> Vec<RangeInclusive<DayBucket>> {
    let mut out = Vec::new();
    let mut iter = bitmap.iter();

    let Some(mut start) = iter.next() else {
        return out;
    };
    let mut prev = start;

    for v in iter {
        if v == prev + 1 {
            prev = v;
        } else {
            out.push(start..=prev);
            start = v;
            prev = v;
        }
    }

    out.push(start..=prev);
    out
}

/// Every day-granular hole of `desired` not covered by `existing`, including
/// holes between intervals. Results are clamped to `desired`.
pub(crate) fn missing_days(desired: &DateRange, existing: &[DateRange]) -> Vec<DateRange> {
    let Some(expected_days) = range_buckets(desired) else {
        return vec![*desired];
    };
    let mut expected = RoaringBitmap::new();
    expected.insert_range(expected_days);

    let present = DayCoverage::from_ranges(existing);

    present
        .missing_runs(&expected)
        .into_iter()
        .filter_map(|run| {
            let first = bucket_date(*run.start())?;
            let last = bucket_date(*run.end())?;

            let start = midnight(first).clamp(desired.start(), desired.end());
            let end = if last == desired.end().date() {
                desired.end()
            } else {
                midnight(last).clamp(start, desired.end())
            };
            DateRange::new(start, end).ok()
        })
        .collect()
}
