//! Error types and SNAFU context selectors for `writer`.

use snafu::prelude::*;

use crate::destination::{BoxError, InsertError};

/// Errors returned by [`super::BulkWriter::write`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WriteError {
    /// The batch had no records; nothing was sent to the destination.
    #[snafu(display("Refusing to write an empty batch"))]
    EmptyBatch,

    /// The destination reported a missing schema and defining one failed.
    #[snafu(display("Failed to define destination schema: {source}"))]
    DefineSchema {
        /// Underlying client error.
        source: BoxError,
    },

    /// Every counted insert attempt failed.
    #[snafu(display("Insert failed after {attempts} attempts: {source}"))]
    RetriesExhausted {
        /// Number of counted failed attempts.
        attempts: u32,
        /// Last insert failure.
        source: InsertError,
    },
}
