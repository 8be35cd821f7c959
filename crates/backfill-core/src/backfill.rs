//! End-to-end backfill for one scraper.
//!
//! [`Backfill::run`] asks the [`GapResolver`] which chunks of the desired
//! range are missing, fetches each chunk through a [`Fetcher`] and loads the
//! records with the [`BulkWriter`]. Chunks are processed one at a time in
//! ascending order.
//!
//! A chunk whose fetch returns no records is skipped without touching the
//! destination. When a fetch or write fails, [`ChunkFailurePolicy`] decides
//! whether the whole run stops or the chunk is recorded and skipped.

use async_trait::async_trait;
use chrono_tz::Tz;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    config::{ConfigError, ScraperConfig},
    coverage::CoverageIndex,
    date_range::DateRange,
    destination::{BoxError, CoverageSource, Destination},
    record::Record,
    resolver::{GapResolver, ResolveError},
    writer::{BulkWriter, WriteError},
};

/// Default maximum days per fetch.
pub const DEFAULT_CHUNK_DAYS: i64 = 30;

/// Source of records for one fetch window.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Records for `window`, bounds inclusive.
    async fn fetch(&self, window: &DateRange) -> Result<Vec<Record>, BoxError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch(&self, window: &DateRange) -> Result<Vec<Record>, BoxError> {
        (**self).fetch(window).await
    }
}

/// What a run does when one chunk fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailurePolicy {
    /// Stop and return the error.
    #[default]
    Abort,
    /// Record the failure and continue with the next chunk.
    Skip,
}

/// Errors that end a backfill run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackfillError {
    /// Planning (coverage lookup or splitting) failed.
    #[snafu(display("Failed to plan backfill: {source}"))]
    Plan {
        /// Underlying resolver error.
        source: ResolveError,
    },

    /// Fetching a chunk failed.
    #[snafu(display("Failed to fetch {window}: {source}"))]
    Fetch {
        /// Chunk being fetched.
        window: DateRange,
        /// Underlying fetcher error.
        source: BoxError,
    },

    /// Loading a chunk failed.
    #[snafu(display("Failed to write {window}: {source}"))]
    Write {
        /// Chunk being written.
        window: DateRange,
        /// Underlying writer error.
        source: WriteError,
    },
}

/// A chunk skipped under [`ChunkFailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// The failed chunk.
    pub window: DateRange,
    /// Rendered error.
    pub reason: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Chunks planned.
    pub planned: usize,
    /// Chunks loaded.
    pub written: usize,
    /// Chunks whose fetch returned nothing.
    pub empty: usize,
    /// Chunks that failed and were skipped.
    pub failed: Vec<ChunkFailure>,
    /// Records loaded.
    pub rows: usize,
}

/// One scraper's backfill pipeline.
#[derive(Debug)]
pub struct Backfill<S, D, F> {
    name: String,
    resolver: GapResolver<S>,
    writer: BulkWriter<D>,
    fetcher: F,
    column: String,
    chunk_days: i64,
    tz: Tz,
    on_failure: ChunkFailurePolicy,
}

impl<S, D, F> Backfill<S, D, F>
where
    S: CoverageSource,
    D: Destination,
    F: Fetcher,
{
    /// Pipeline with [`DEFAULT_CHUNK_DAYS`]-day chunks, a UTC source timezone and
    /// [`ChunkFailurePolicy::Abort`].
    pub fn new(
        name: impl Into<String>,
        resolver: GapResolver<S>,
        writer: BulkWriter<D>,
        fetcher: F,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            writer,
            fetcher,
            column: column.into(),
            chunk_days: DEFAULT_CHUNK_DAYS,
            tz: Tz::UTC,
            on_failure: ChunkFailurePolicy::default(),
        }
    }

    /// Wire a pipeline from validated configuration.
    pub fn from_config(
        config: &ScraperConfig,
        source: S,
        destination: D,
        fetcher: F,
    ) -> Result<Self, ConfigError> {
        let tz = config.timezone()?;
        let index = CoverageIndex::new(source).with_run_gap(config.run_gap()?);
        let resolver = GapResolver::new(index).with_policy(config.gap_policy);
        let writer = BulkWriter::new(destination).with_policy(config.retry_policy());

        Ok(
            Self::new(&config.name, resolver, writer, fetcher, &config.time_column)
                .with_chunk_days(config.chunk_days)
                .with_timezone(tz),
        )
    }

    /// Maximum days per fetch.
    pub fn with_chunk_days(mut self, chunk_days: i64) -> Self {
        self.chunk_days = chunk_days;
        self
    }

    /// Timezone of datetime strings returned by the fetcher.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    /// Per-chunk failure handling.
    pub fn with_failure_policy(mut self, on_failure: ChunkFailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Scraper name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the writer.
    pub fn writer(&self) -> &BulkWriter<D> {
        &self.writer
    }

    /// Fetch and load every missing chunk of `desired`.
    pub async fn run(&self, desired: &DateRange) -> Result<BackfillReport, BackfillError> {
        let chunks = self
            .resolver
            .plan(desired, &self.column, self.chunk_days)
            .await
            .context(PlanSnafu)?;
        info!("{}: {} chunk(s) to fetch for {desired}", self.name, chunks.len());

        let mut report = BackfillReport {
            planned: chunks.len(),
            ..BackfillReport::default()
        };

        for window in chunks {
            match self.run_chunk(&window).await {
                Ok(0) => report.empty += 1,
                Ok(rows) => {
                    report.written += 1;
                    report.rows += rows;
                }
                Err(err) => match self.on_failure {
                    ChunkFailurePolicy::Abort => return Err(err),
                    ChunkFailurePolicy::Skip => {
                        warn!("{}: skipping chunk: {err}", self.name);
                        report.failed.push(ChunkFailure {
                            window,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        info!(
            "{}: wrote {} rows in {} chunk(s), {} empty, {} failed",
            self.name,
            report.rows,
            report.written,
            report.empty,
            report.failed.len()
        );
        Ok(report)
    }

    async fn run_chunk(&self, window: &DateRange) -> Result<usize, BackfillError> {
        let records = self
            .fetcher
            .fetch(window)
            .await
            .context(FetchSnafu { window: *window })?;

        if records.is_empty() {
            debug!("{}: no records for {window}", self.name);
            return Ok(0);
        }

        let written = self
            .writer
            .write(records, self.tz)
            .await
            .context(WriteSnafu { window: *window })?;
        Ok(written.rows)
    }
}
