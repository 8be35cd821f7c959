//! In-process table implementing both destination traits.
//!
//! `MemoryTable` behaves like a freshly created warehouse table: it starts
//! without a schema and rejects inserts with [`InsertError::SchemaMissing`]
//! until [`Destination::define_schema`] is called. Inserts are all-or-nothing
//! and validated against the schema with [`Schema::check_record`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, info};
use tokio::sync::Mutex;

use super::{BoxError, CoverageSource, Destination, InsertError, SchemaMissingSnafu};
use crate::{
    date_range::midnight,
    record::{Record, Value},
    schema::Schema,
};

/// Message reported for inserts into a table without a schema.
pub const NO_SCHEMA_MESSAGE: &str = "The destination table has no schema";

#[derive(Debug, Default)]
struct TableState {
    schema: Option<Schema>,
    rows: Vec<Record>,
}

/// A schema-on-first-write table held in memory.
#[derive(Debug, Default)]
pub struct MemoryTable {
    name: String,
    state: Mutex<TableState>,
}

impl MemoryTable {
    /// Empty table without a schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::default(),
        }
    }

    /// Empty table with `schema` already defined.
    pub fn with_schema(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TableState {
                schema: Some(schema),
                rows: Vec::new(),
            }),
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current schema, if defined.
    pub async fn schema(&self) -> Option<Schema> {
        self.state.lock().await.schema.clone()
    }

    /// Snapshot of all stored rows in insertion order.
    pub async fn rows(&self) -> Vec<Record> {
        self.state.lock().await.rows.clone()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    /// True if no rows are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn temporal(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => Some(midnight(*d)),
        _ => None,
    }
}

#[async_trait]
impl CoverageSource for MemoryTable {
    /// Distinct temporal values of `column` as degenerate `(t, t)` rows.
    ///
    /// Values that are neither dates nor date-times are reported as-is, after
    /// the temporal rows, so callers can flag the malformed column.
    async fn coverage_rows(&self, column: &str) -> Result<Vec<Vec<Value>>, BoxError> {
        let state = self.state.lock().await;

        let undeclared = state
            .schema
            .as_ref()
            .is_some_and(|schema| schema.field(column).is_none());
        if undeclared {
            return Err(format!("Unrecognized name: {column} in table {}", self.name).into());
        }

        let mut stamps = BTreeSet::new();
        let mut malformed = Vec::new();
        for value in state.rows.iter().filter_map(|r| r.get(column)) {
            match temporal(value) {
                Some(ts) => {
                    stamps.insert(ts);
                }
                None if value.is_null() => {}
                None => malformed.push(vec![value.clone(), value.clone()]),
            }
        }

        let mut out: Vec<Vec<Value>> = stamps
            .into_iter()
            .map(|ts| vec![Value::DateTime(ts), Value::DateTime(ts)])
            .collect();
        out.extend(malformed);
        Ok(out)
    }
}

#[async_trait]
impl Destination for MemoryTable {
    async fn insert(&self, rows: &[Record]) -> Result<(), InsertError> {
        let mut state = self.state.lock().await;

        let Some(schema) = &state.schema else {
            return SchemaMissingSnafu {
                message: NO_SCHEMA_MESSAGE,
            }
            .fail();
        };

        for row in rows {
            schema.check_record(row).map_err(InsertError::transient)?;
        }

        state.rows.extend_from_slice(rows);
        debug!("{}: inserted {} rows", self.name, rows.len());
        Ok(())
    }

    async fn define_schema(&self, schema: &Schema) -> Result<(), BoxError> {
        let mut state = self.state.lock().await;
        info!("{}: schema set to {schema}", self.name);
        state.schema = Some(schema.clone());
        Ok(())
    }
}
