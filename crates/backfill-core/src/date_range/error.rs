//! Error types and SNAFU context selectors for `date_range`.

use chrono::NaiveDateTime;
use snafu::prelude::*;

/// Errors raised while constructing or splitting a [`super::DateRange`].
///
/// All of these indicate malformed input from the caller (usually
/// configuration); none of them are retried.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum DateRangeError {
    /// A bound could not be parsed as a `YYYY-MM-DD` calendar date.
    #[snafu(display("Invalid date range bound '{value}' (expected YYYY-MM-DD): {source}"))]
    UnparsableDate {
        /// The raw bound supplied by the caller.
        value: String,
        /// Underlying chrono parse error.
        source: chrono::ParseError,
    },

    /// The end bound predates the start bound.
    #[snafu(display("Invalid date range: end {end} predates start {start}"))]
    InvalidRange {
        /// Requested start.
        start: NaiveDateTime,
        /// Requested end.
        end: NaiveDateTime,
    },

    /// Chunk sizes must be a positive number of days.
    #[snafu(display("Invalid chunk size: max_days must be positive (got {max_days})"))]
    InvalidParameter {
        /// The rejected chunk size.
        max_days: i64,
    },
}

impl DateRangeError {
    /// True for the malformed-bounds family (unparsable or reversed bounds).
    pub fn is_invalid_range(&self) -> bool {
        matches!(
            self,
            DateRangeError::UnparsableDate { .. } | DateRangeError::InvalidRange { .. }
        )
    }
}
