//! Core engine for gap-aware time-series backfills.
//!
//! This crate provides the pieces needed to keep a tabular store in sync with
//! a time-indexed source API without refetching what is already stored:
//!
//! - Validated inclusive date ranges with chunked splitting and gap
//!   computation (`date_range` module).
//! - A coverage index that groups a stored timestamp column into disjoint
//!   runs (`coverage` module), and a resolver that turns a desired range plus
//!   that coverage into fetch-sized chunks (`resolver` module).
//! - A bulk writer that normalizes datetime strings, defines the destination
//!   schema lazily from the first record, and retries failed inserts with a
//!   bounded fixed backoff (`writer` module).
//! - Typed records and schemas (`record`, `schema`), the storage seam
//!   (`destination`), structured configuration (`config`) and a per-scraper
//!   pipeline (`backfill`).
//!
//! HTTP clients and warehouse clients are expected to live in integration
//! crates that implement [`backfill::Fetcher`], [`destination::CoverageSource`]
//! and [`destination::Destination`].
#![deny(missing_docs)]
pub mod backfill;
pub mod config;
pub mod coverage;
pub mod date_range;
pub mod destination;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod writer;

pub use backfill::{Backfill, BackfillError, BackfillReport, ChunkFailurePolicy, Fetcher};
pub use config::{BackfillConfig, ConfigError, ScraperConfig};
pub use coverage::{CoverageError, CoverageIndex};
pub use date_range::{DateRange, DateRangeError, GapPolicy};
pub use destination::{CoverageSource, Destination, InsertError, memory::MemoryTable};
pub use record::{Record, Value};
pub use resolver::{GapResolver, ResolveError};
pub use schema::{FieldType, Schema};
pub use writer::{BulkWriter, RetryPolicy, WriteError, WriteReport};
