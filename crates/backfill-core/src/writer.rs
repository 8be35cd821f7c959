//! Bulk writer with lazy schema definition and bounded retries.
//!
//! [`BulkWriter::write`] loads one batch into a [`Destination`]:
//!
//! 1. An empty batch is rejected before any destination call.
//! 2. Datetime-looking strings are normalized (see [`normalize`]).
//! 3. The batch is inserted. If the destination has no schema yet, a schema
//!    is inferred from the first record, defined once, and the insert is
//!    retried immediately. Any other failure (including a second "no schema"
//!    report in the same call) counts as an attempt and is retried after a
//!    fixed backoff, up to [`RetryPolicy::max_attempts`] counted failures.
//!
//! Retry bookkeeping is local to each call, so nothing leaks from one batch
//! to the next.
//!
//! The writer assumes it is the only one writing to the destination; two
//! writers racing on an empty table may both try to define the schema.

pub mod error;
pub mod normalize;

use std::time::Duration;

use chrono_tz::Tz;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use error::WriteError;
use error::{DefineSchemaSnafu, EmptyBatchSnafu, RetriesExhaustedSnafu};

use crate::{
    destination::{Destination, InsertError},
    record::Record,
    schema::Schema,
};

/// Default number of counted insert attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default wait between counted attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded fixed-backoff retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Counted insert failures tolerated before giving up (at least 1).
    pub max_attempts: u32,
    /// Wait between counted attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Records loaded.
    pub rows: usize,
    /// Insert round-trips made, including the successful one.
    pub inserts: u32,
    /// Whether this call defined the destination schema.
    pub schema_defined: bool,
    /// Datetime strings converted during normalization.
    pub normalized_fields: usize,
}

/// What to do after a failed insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Define the schema and retry without waiting.
    Correct,
    /// Wait, then retry.
    Backoff,
    /// Give up.
    Fail,
}

/// Per-call retry state.
#[derive(Debug, Clone, Copy, Default)]
struct WriteState {
    inserts: u32,
    failures: u32,
    schema_corrected: bool,
}

impl WriteState {
    fn on_failure(&mut self, err: &InsertError, max_attempts: u32) -> Transition {
        if err.is_schema_missing() && !self.schema_corrected {
            return Transition::Correct;
        }
        self.failures += 1;
        if self.failures >= max_attempts {
            Transition::Fail
        } else {
            Transition::Backoff
        }
    }
}

/// Loads batches into a destination.
#[derive(Debug, Clone)]
pub struct BulkWriter<D> {
    destination: D,
    policy: RetryPolicy,
}

impl<D: Destination> BulkWriter<D> {
    /// Writer with the default retry policy.
    pub fn new(destination: D) -> Self {
        Self {
            destination,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Borrow the destination.
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Active retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Normalize `batch` in `tz` and load it.
    pub async fn write(&self, mut batch: Vec<Record>, tz: Tz) -> Result<WriteReport, WriteError> {
        ensure!(!batch.is_empty(), EmptyBatchSnafu);

        let normalized_fields = normalize::normalize_batch(&mut batch, tz);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = WriteState::default();

        loop {
            state.inserts += 1;
            let err = match self.destination.insert(&batch).await {
                Ok(()) => {
                    info!(
                        "inserted {} rows ({} round-trip(s))",
                        batch.len(),
                        state.inserts
                    );
                    return Ok(WriteReport {
                        rows: batch.len(),
                        inserts: state.inserts,
                        schema_defined: state.schema_corrected,
                        normalized_fields,
                    });
                }
                Err(err) => err,
            };

            match state.on_failure(&err, max_attempts) {
                Transition::Correct => {
                    let Some(sample) = batch.first() else {
                        return EmptyBatchSnafu.fail();
                    };
                    let schema = Schema::infer(sample);
                    warn!("{err}; defining schema {schema}");
                    self.destination
                        .define_schema(&schema)
                        .await
                        .context(DefineSchemaSnafu)?;
                    state.schema_corrected = true;
                }
                Transition::Backoff => {
                    warn!(
                        "insert failed (attempt {} of {max_attempts}), retrying in {:?}: {err}",
                        state.failures, self.policy.backoff
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Transition::Fail => {
                    return Err(err).context(RetriesExhaustedSnafu {
                        attempts: state.failures,
                    });
                }
            }
        }
    }
}
