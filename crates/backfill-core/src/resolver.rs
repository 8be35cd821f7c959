//! Gap resolver: decides which date ranges still need fetching.
//!
//! `resolve` is a pure composition of the coverage index and
//! [`DateRange::missing_with`]; `plan` additionally splits every missing
//! range into fetch-sized chunks.

use log::info;
use snafu::prelude::*;

use crate::{
    coverage::{CoverageError, CoverageIndex},
    date_range::{DateRange, DateRangeError, GapPolicy},
    destination::CoverageSource,
};

/// Errors from resolving or planning.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResolveError {
    /// Reading existing coverage failed.
    #[snafu(display("Failed to read existing coverage: {source}"))]
    Coverage {
        /// Underlying coverage error.
        source: CoverageError,
    },

    /// Splitting a missing range failed (non-positive chunk size).
    #[snafu(display("Failed to split missing range: {source}"))]
    Split {
        /// Underlying range error.
        source: DateRangeError,
    },
}

/// Combines a desired range with stored coverage.
#[derive(Debug, Clone)]
pub struct GapResolver<S> {
    index: CoverageIndex<S>,
    policy: GapPolicy,
}

impl<S: CoverageSource> GapResolver<S> {
    /// Resolver using the edges-only gap policy.
    pub fn new(index: CoverageIndex<S>) -> Self {
        Self {
            index,
            policy: GapPolicy::default(),
        }
    }

    /// Override the gap policy.
    pub fn with_policy(mut self, policy: GapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Borrow the coverage index.
    pub fn index(&self) -> &CoverageIndex<S> {
        &self.index
    }

    /// Sub-ranges of `desired` not yet stored in `column`.
    ///
    /// An empty table yields `desired` itself.
    pub async fn resolve(
        &self,
        desired: &DateRange,
        column: &str,
    ) -> Result<Vec<DateRange>, ResolveError> {
        let existing = self.index.coverage(column).await.context(CoverageSnafu)?;
        let missing = desired.missing_with(&existing, self.policy);

        info!(
            "{desired}: {} existing interval(s), {} missing range(s)",
            existing.len(),
            missing.len()
        );
        Ok(missing)
    }

    /// Missing ranges of `desired`, each split into chunks of at most
    /// `chunk_days` days, in ascending order.
    pub async fn plan(
        &self,
        desired: &DateRange,
        column: &str,
        chunk_days: i64,
    ) -> Result<Vec<DateRange>, ResolveError> {
        let missing = self.resolve(desired, column).await?;

        let mut chunks = Vec::new();
        for range in &missing {
            chunks.extend(range.split(chunk_days).context(SplitSnafu)?);
        }
        Ok(chunks)
    }
}
