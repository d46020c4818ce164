//! Error types for record metadata and value conversion.

use thiserror::Error;

/// Errors raised while turning a record descriptor into a [`Table`](crate::schema::Table).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two fields map to the same physical column.
    #[error("duplicate column `{column}` in table `{table}`")]
    DuplicateColumn {
        /// Table being parsed.
        table: String,
        /// Offending column name.
        column: String,
    },

    /// More than one column carries `autoincr`.
    #[error("table `{0}` declares more than one auto-increment column")]
    MultipleAutoIncrement(String),

    /// More than one column carries `version`.
    #[error("table `{0}` declares more than one version column")]
    MultipleVersion(String),

    /// A column carries more than one of `created`, `updated`, `deleted`.
    #[error("column `{0}` plays more than one time role")]
    ConflictingTimeRole(String),

    /// A tag token could not be understood.
    #[error("invalid tag on field `{field}`: {reason}")]
    InvalidTag {
        /// Field path of the tagged field.
        field: String,
        /// Why the tag was rejected.
        reason: String,
    },
}

/// Errors raised while moving a value between a record field and SQL.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source value cannot be assigned into the target kind.
    #[error("cannot convert {from} into {to}")]
    Unsupported {
        /// Name of the source value kind.
        from: &'static str,
        /// Name of the target field kind.
        to: &'static str,
    },

    /// A textual source value did not parse as the target kind.
    #[error("cannot parse `{value}` as {target}")]
    Parse {
        /// The offending text.
        value: String,
        /// Name of the target field kind.
        target: &'static str,
    },

    /// A numeric value does not fit the target width.
    #[error("value {value} overflows {target}")]
    Overflow {
        /// The offending value, rendered.
        value: String,
        /// Name of the target field kind.
        target: &'static str,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A user-defined conversion failed.
    #[error("conversion error: {0}")]
    Conversion(Box<dyn std::error::Error + Send + Sync>),

    /// The record has no field at the given path.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// The related record cannot be addressed by a single primary key.
    #[error("unsupported cascade on `{0}`: related record must have exactly one primary key")]
    UnsupportedCascade(String),
}
