//! Destination schemas and inference from sample records.
//!
//! Destinations start out without a schema. The first time an insert is
//! rejected for that reason, the writer derives one from the first record of
//! the batch with [`Schema::infer`] and defines it once. After that the schema
//! only changes through administrative action outside this crate.
//!
//! [`Schema::check_record`] is the validation a destination applies on insert;
//! it is name-based and treats `Null` as compatible with every type.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::record::{Record, Value};

/// Declared type of a destination column.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// Text; also the declared default for values with no usable type.
    #[default]
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// Raw bytes.
    Bytes,
    /// Calendar date.
    Date,
    /// Wall-clock time.
    Time,
    /// Date plus wall-clock time without timezone.
    #[serde(rename = "DATETIME")]
    DateTime,
}

impl FieldType {
    /// Column type name as used in DDL.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Bytes => "BYTES",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSchema {
    /// Column name.
    pub name: String,
    /// Declared column type.
    pub field_type: FieldType,
}

impl fmt::Display for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.field_type)
    }
}

/// Ordered set of column declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

/// Reasons a record does not fit a schema.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaMismatch {
    /// The record carries a field the schema does not declare.
    #[snafu(display("Field {field} is not declared in the destination schema"))]
    UnknownField {
        /// Offending field name.
        field: String,
    },

    /// The value's type differs from the declared column type.
    #[snafu(display("Field {field} is declared as {declared}, record has {actual}"))]
    TypeMismatch {
        /// Offending field name.
        field: String,
        /// Declared column type.
        declared: FieldType,
        /// Type of the supplied value.
        actual: FieldType,
    },
}

impl Schema {
    /// Build a schema from explicit declarations.
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    /// One column per field of `sample`, typed from the sample's values.
    pub fn infer(sample: &Record) -> Self {
        let fields = sample
            .iter()
            .map(|(name, value)| FieldSchema {
                name: name.clone(),
                field_type: value.field_type(),
            })
            .collect();
        Self { fields }
    }

    /// Column declarations in order.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Look up a column by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that every field of `record` is declared with a matching type.
    ///
    /// Declared columns absent from the record are allowed (they load as
    /// null).
    pub fn check_record(&self, record: &Record) -> Result<(), SchemaMismatch> {
        for (name, value) in record {
            let declared = self
                .field(name)
                .context(UnknownFieldSnafu { field: name })?
                .field_type;

            if matches!(value, Value::Null) {
                continue;
            }
            let actual = value.field_type();
            ensure!(
                declared == actual,
                TypeMismatchSnafu {
                    field: name,
                    declared,
                    actual,
                }
            );
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", cols.join(", "))
    }
}
