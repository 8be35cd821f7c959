//! Coverage index: which parts of the time axis are already stored.
//!
//! The index asks a [`CoverageSource`] for the timestamps of a column and
//! groups them into maximal runs. Two consecutive timestamps belong to the
//! same run while the gap between them is below the run gap (one day by
//! default); each run becomes one coverage interval `[min, max]`.
//!
//! The result is a disjoint, ascending `Vec<DateRange>`. It is recomputed on
//! every call; nothing is cached between calls.
//!
//! Sources backed by a SQL warehouse can push the grouping down with
//! [`grouping_sql`]; the rows it yields (one per run) pass through run
//! detection unchanged because adjacent runs are at least one gap apart.

use chrono::{NaiveDateTime, TimeDelta};
use log::debug;
use snafu::prelude::*;

use crate::{
    date_range::DateRange,
    destination::{BoxError, CoverageSource},
    record::Value,
};

/// Errors from building the coverage set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoverageError {
    /// The coverage query could not be executed.
    #[snafu(display("Coverage query for column {column} failed: {source}"))]
    Query {
        /// Timestamp column being queried.
        column: String,
        /// Underlying client error.
        source: BoxError,
    },

    /// A returned row is not a pair of date-time values.
    #[snafu(display("Unexpected coverage row {row}: {details}"))]
    UnexpectedShape {
        /// Zero-based row index in the query result.
        row: usize,
        /// What was wrong with the row.
        details: String,
    },

    /// A table or column name is not a plain identifier.
    #[snafu(display("Invalid identifier '{identifier}' in coverage query"))]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
    },
}

/// Default maximum gap between timestamps of the same run.
pub fn default_run_gap() -> TimeDelta {
    TimeDelta::days(1)
}

/// Derives coverage intervals from a [`CoverageSource`].
#[derive(Debug, Clone)]
pub struct CoverageIndex<S> {
    source: S,
    run_gap: TimeDelta,
}

impl<S: CoverageSource> CoverageIndex<S> {
    /// Index over `source` with the default one-day run gap.
    pub fn new(source: S) -> Self {
        Self {
            source,
            run_gap: default_run_gap(),
        }
    }

    /// Override the run gap.
    pub fn with_run_gap(mut self, run_gap: TimeDelta) -> Self {
        self.run_gap = run_gap;
        self
    }

    /// Borrow the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Coverage intervals for `column`, ascending and disjoint.
    pub async fn coverage(&self, column: &str) -> Result<Vec<DateRange>, CoverageError> {
        let rows = self
            .source
            .coverage_rows(column)
            .await
            .context(QuerySnafu { column })?;

        let spans = rows
            .into_iter()
            .enumerate()
            .map(|(row, values)| parse_row(row, values))
            .collect::<Result<Vec<_>, _>>()?;

        let intervals = detect_runs(spans, self.run_gap);
        debug!(
            "coverage for {column}: {} interval(s) (run gap {})",
            intervals.len(),
            self.run_gap
        );
        Ok(intervals)
    }
}

fn parse_row(row: usize, values: Vec<Value>) -> Result<DateRange, CoverageError> {
    let [start, end]: [Value; 2] = values.try_into().map_err(|v: Vec<Value>| {
        UnexpectedShapeSnafu {
            row,
            details: format!("expected 2 columns, got {}", v.len()),
        }
        .build()
    })?;

    let start = as_datetime(row, "start", &start)?;
    let end = as_datetime(row, "end", &end)?;
    DateRange::new(start, end).map_err(|_| {
        UnexpectedShapeSnafu {
            row,
            details: format!("end {end} predates start {start}"),
        }
        .build()
    })
}

fn as_datetime(row: usize, which: &str, value: &Value) -> Result<NaiveDateTime, CoverageError> {
    value.as_datetime().context(UnexpectedShapeSnafu {
        row,
        details: format!("{which} is not a date-time: {value:?}"),
    })
}

/// Group ascending spans into maximal runs.
///
/// A span joins the current run while `span.start - run.end < run_gap`;
/// otherwise it starts a new run. Input order is trusted.
pub fn detect_runs(
    spans: impl IntoIterator<Item = DateRange>,
    run_gap: TimeDelta,
) -> Vec<DateRange> {
    let mut out = Vec::new();
    let mut iter = spans.into_iter();

    let Some(first) = iter.next() else {
        return out;
    };
    let (mut start, mut end) = (first.start(), first.end());

    for span in iter {
        if span.start() - end < run_gap {
            start = start.min(span.start());
            end = end.max(span.end());
        } else {
            out.extend(DateRange::new(start, end).ok());
            start = span.start();
            end = span.end();
        }
    }

    out.extend(DateRange::new(start, end).ok());
    out
}

fn ensure_identifier(identifier: &str, extra: &[char]) -> Result<(), CoverageError> {
    let valid = !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || extra.contains(&c));
    ensure!(valid, InvalidIdentifierSnafu { identifier });
    Ok(())
}

/// Window-function query that groups `column` of `table` into runs server
/// side, yielding `(start_date, end_date)` rows ordered by start.
///
/// `table` may be a dotted `project.dataset.table` path; `run_gap` is
/// rounded down to whole minutes.
pub fn grouping_sql(table: &str, column: &str, run_gap: TimeDelta) -> Result<String, CoverageError> {
    ensure_identifier(table, &['.', '-'])?;
    ensure_identifier(column, &[])?;
    let gap_minutes = run_gap.num_minutes();

    Ok(format!(
        "WITH ordered AS (\n\
         \x20 SELECT {column},\n\
         \x20   DATETIME_DIFF({column}, LAG({column}) OVER (ORDER BY {column}), MINUTE) AS gap_minutes\n\
         \x20 FROM `{table}`\n\
         ),\n\
         runs AS (\n\
         \x20 SELECT {column},\n\
         \x20   COUNTIF(gap_minutes >= {gap_minutes}) OVER (ORDER BY {column}) AS run_id\n\
         \x20 FROM ordered\n\
         )\n\
         SELECT MIN({column}) AS start_date, MAX({column}) AS end_date\n\
         FROM runs\n\
         GROUP BY run_id\n\
         ORDER BY start_date"
    ))
}
