//! Storage-engine seam.
//!
//! The backfill logic talks to the tabular store through two traits:
//!
//! - [`CoverageSource`] answers "which timestamps are already stored" for a
//!   column, as rows of `(start, end)` pairs.
//! - [`Destination`] accepts batches of records and can have its schema
//!   defined once.
//!
//! Insert failures are classified by [`InsertError`] so the writer can tell a
//! missing schema (recoverable by defining one) from every other failure.
//!
//! Concrete warehouse clients live outside this crate. [`memory::MemoryTable`]
//! is an in-process implementation of both traits.

pub mod memory;

use async_trait::async_trait;
use snafu::{IntoError, prelude::*};

use crate::{record::Record, record::Value, schema::Schema};

/// Boxed error from a destination client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A classified insert failure.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InsertError {
    /// The destination has no schema yet, so nothing can be loaded.
    #[snafu(display("Destination has no schema: {message}"))]
    SchemaMissing {
        /// Message reported by the destination.
        message: String,
    },

    /// Any other failure (network, quota, rejected rows, ...).
    #[snafu(display("Insert failed: {source}"))]
    Transient {
        /// Underlying client error.
        source: BoxError,
    },
}

impl InsertError {
    /// True if the destination reported that it has no schema.
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, InsertError::SchemaMissing { .. })
    }

    /// Wrap any client error as a transient failure.
    pub fn transient(source: impl Into<BoxError>) -> Self {
        TransientSnafu.into_error(source.into())
    }
}

/// Read side: rows describing the timestamps stored in a column.
#[async_trait]
pub trait CoverageSource: Send + Sync {
    /// Rows of `(start, end)` date-time pairs for `column`, in ascending
    /// order of `start`.
    ///
    /// A source that returns raw timestamps reports each one as `(t, t)`; a
    /// source that groups runs server side returns one pair per run. Each row
    /// is expected to hold exactly two [`Value::DateTime`] values.
    async fn coverage_rows(&self, column: &str) -> Result<Vec<Vec<Value>>, BoxError>;
}

/// Write side: bulk insert plus one-shot schema definition.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Insert every record of `rows`. Row order need not be preserved.
    async fn insert(&self, rows: &[Record]) -> Result<(), InsertError>;

    /// Define (or replace) the destination schema.
    async fn define_schema(&self, schema: &Schema) -> Result<(), BoxError>;
}

#[async_trait]
impl<T: CoverageSource + ?Sized> CoverageSource for std::sync::Arc<T> {
    async fn coverage_rows(&self, column: &str) -> Result<Vec<Vec<Value>>, BoxError> {
        (**self).coverage_rows(column).await
    }
}

#[async_trait]
impl<T: Destination + ?Sized> Destination for std::sync::Arc<T> {
    async fn insert(&self, rows: &[Record]) -> Result<(), InsertError> {
        (**self).insert(rows).await
    }

    async fn define_schema(&self, schema: &Schema) -> Result<(), BoxError> {
        (**self).define_schema(schema).await
    }
}
