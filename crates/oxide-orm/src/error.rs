//! Error types for the ORM.

use oxide_sql_core::{ConvertError, HookError, SchemaError, SqlValue};
use thiserror::Error;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A driver error, with the statement that caused it.
    #[error("{source} [sql: {sql}, args: {args:?}]")]
    Sql {
        sql: String,
        args: Vec<SqlValue>,
        #[source]
        source: Box<OrmError>,
    },

    /// Record metadata could not be turned into a table.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A value could not move between a field and its column.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// A lifecycle hook failed.
    #[error("hook error: {0}")]
    Hook(#[source] HookError),

    /// Wrong argument shape for a builder or terminal operation.
    #[error("params type error: {0}")]
    ParamsType(String),

    /// The operation needs a table and none could be inferred.
    #[error("table not found")]
    TableNotFound,

    /// The statement has more placeholders than arguments.
    #[error("need more arguments: statement has {expected} placeholders, got {got} arguments")]
    NeedMoreArguments { expected: usize, got: usize },

    /// A condition value of an unsupported shape.
    #[error("condition type unsupported: {0}")]
    ConditionType(String),

    /// The cached path could not answer; callers fall back to the database.
    #[error("cache failed")]
    CacheFailed,

    /// A transaction was required but none is active.
    #[error("not in transaction")]
    NotInTransaction,

    /// The propagation policy forbids the current nesting.
    #[error("nested transaction not permitted: {0}")]
    NestedTransaction(String),

    /// Unknown propagation value.
    #[error("invalid transaction definition: {0}")]
    TransactionDefinition(String),

    /// A version-checked UPDATE matched no row.
    #[error("optimistic lock failed: the record was changed by another session")]
    OptimisticLock,

    /// A cascade field references a record without a single primary key.
    #[error("unsupported cascade on `{0}`")]
    UnsupportedCascade(String),

    /// A column value could not be assigned to its field.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// An UPDATE without any column to set.
    #[error("no content found to be updated")]
    NoContentFound,

    /// Paging parameters out of range.
    #[error("params format error: {0}")]
    ParamsFormat(String),

    /// The backend cannot lock rows of this page.
    #[error("FOR UPDATE cannot be combined with this paging on the current backend")]
    LockedPaging,

    /// The ID condition does not match the table's primary key.
    #[error("ID condition is error, expect {expected} primary keys, there are {got}")]
    IdCondition { expected: usize, got: usize },

    /// A DELETE without any condition.
    #[error("delete action needs at least one condition")]
    NeedDeletedCond,

    /// A participant rolled back, so the owner's commit was turned into a rollback.
    #[error("transaction marked rollback-only; rolled back instead of committing")]
    RollbackOnly,

    /// The attached context was cancelled or reached its deadline.
    #[error("operation cancelled")]
    Cancelled,

    /// No bundled driver for the requested backend.
    #[error("unsupported driver `{0}`")]
    UnsupportedDriver(String),

    /// The data source name could not be used.
    #[error("invalid dsn: {0}")]
    InvalidDsn(String),

    /// Engine configuration could not be read.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,
}

impl OrmError {
    /// Wraps a driver error with the statement that produced it.
    pub(crate) fn with_sql(self, sql: &str, args: &[SqlValue]) -> Self {
        match self {
            Self::Cancelled | Self::Sql { .. } => self,
            other => Self::Sql {
                sql: sql.to_string(),
                args: args.to_vec(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through [`OrmError::Sql`] wrapping.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Sql { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_wrapping_keeps_root() {
        let err = OrmError::TableNotFound.with_sql("SELECT 1", &[SqlValue::Int(1)]);
        assert!(matches!(err.root(), OrmError::TableNotFound));
        assert!(err.to_string().contains("SELECT 1"));
        assert!(matches!(
            OrmError::Cancelled.with_sql("SELECT 1", &[]),
            OrmError::Cancelled
        ));
    }

    #[test]
    fn test_id_condition_message() {
        let err = OrmError::IdCondition {
            expected: 2,
            got: 1,
        };
        assert_eq!(
            err.to_string(),
            "ID condition is error, expect 2 primary keys, there are 1"
        );
    }
}
