//! Database driver contract.
//!
//! The engine talks to a database only through [`Driver`] (a connection
//! pool) and [`Connection`] (one leased connection). Every statement handed
//! to a connection is final: dialect filters have been applied and
//! arguments are plain [`SqlValue`]s in placeholder order.

mod sqlite;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use oxide_sql_core::{DbType, SqlValue};
use serde::{Deserialize, Serialize};

pub use sqlite::{SqliteConnection, SqliteDriver};

use crate::error::Result;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Driver-reported id of the last inserted row, when the backend has one.
    pub last_insert_id: Option<i64>,
}

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Arc<[String]>,
    pub values: Vec<SqlValue>,
}

/// A fully buffered result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl Rows {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `(row, column name)`, column matched case-insensitively.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First column of the first row.
    #[must_use]
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum open connections.
    pub max_open: u32,
    /// Connections kept open while idle.
    pub max_idle: u32,
    /// Maximum lifetime of a connection.
    #[serde(with = "opt_secs")]
    pub max_lifetime: Option<Duration>,
    /// Idle connections are closed after this long.
    #[serde(with = "opt_secs")]
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 2,
            max_lifetime: None,
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle or in use.
    pub open: u32,
    pub idle: u32,
}

impl PoolStats {
    /// Connections currently leased.
    #[must_use]
    pub const fn in_use(&self) -> u32 {
        self.open.saturating_sub(self.idle)
    }
}

/// A connection pool for one database.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Backend this driver talks to.
    fn db_type(&self) -> DbType;

    /// The data source name the pool was opened with.
    fn dsn(&self) -> &str;

    /// Leases a connection.
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    /// Current pool statistics.
    fn stats(&self) -> PoolStats;

    /// Current pool settings.
    fn pool_config(&self) -> PoolConfig;

    /// Applies new pool settings.
    fn configure(&self, config: PoolConfig);

    /// Checks that the database answers.
    async fn ping(&self) -> Result<()>;

    /// Closes every connection.
    async fn close(&self);

    /// Opens a second, independent pool on the same database.
    async fn reopen(&self) -> Result<Arc<dyn Driver>>;
}

/// One leased connection.
///
/// Dropping a connection with an open transaction rolls the transaction back
/// before the connection is reused.
#[async_trait]
pub trait Connection: Send {
    /// Runs a statement that returns no rows.
    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult>;

    /// Runs a query and buffers every row.
    async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Rows>;

    /// Runs a query and streams its rows.
    fn fetch(&mut self, sql: String, args: Vec<SqlValue>) -> BoxStream<'_, Result<Row>>;

    /// Starts a transaction with the given statement.
    async fn begin(&mut self, sql: &str) -> Result<()>;

    /// Commits the open transaction with the given statement.
    async fn commit(&mut self, sql: &str) -> Result<()>;

    /// Rolls back the open transaction with the given statement.
    async fn rollback(&mut self, sql: &str) -> Result<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_lookup() {
        let rows = Rows {
            columns: vec!["ID".into(), "name".into()],
            rows: vec![vec![SqlValue::Int(1), SqlValue::Text("a".into())]],
        };
        assert_eq!(rows.get(0, "id"), Some(&SqlValue::Int(1)));
        assert_eq!(rows.get(1, "id"), None);
        assert_eq!(rows.scalar(), Some(&SqlValue::Int(1)));
    }

    #[test]
    fn test_pool_config_from_json() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_open": 4, "max_lifetime": 30}"#).unwrap();
        assert_eq!(config.max_open, 4);
        assert_eq!(config.max_idle, 2);
        assert_eq!(config.max_lifetime, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_pool_stats_in_use() {
        let stats = PoolStats { open: 5, idle: 2 };
        assert_eq!(stats.in_use(), 3);
    }
}
