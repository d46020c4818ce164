//! SQLite driver on top of sqlx.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use oxide_sql_core::value::format_db_time;
use oxide_sql_core::{DbType, SqlValue};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Connection as _, Row as _, Sqlite, TypeInfo as _, ValueRef as _};
use tracing::{debug, warn};

use super::{Connection, Driver, ExecResult, PoolConfig, PoolStats, Row, Rows};
use crate::error::{OrmError, Result};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A sqlx SQLite pool.
///
/// In-memory databases live as long as their connection, so their pool is
/// pinned to a single connection that is never recycled.
#[derive(Debug)]
pub struct SqliteDriver {
    dsn: String,
    options: SqliteConnectOptions,
    memory: bool,
    state: RwLock<PoolState>,
}

#[derive(Debug, Clone)]
struct PoolState {
    pool: SqlitePool,
    config: PoolConfig,
}

fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

impl SqliteDriver {
    /// Opens a pool on `dsn` (`sqlite::memory:`, `sqlite://path.db`, ...).
    ///
    /// # Errors
    ///
    /// Fails when the DSN does not parse or the first connection cannot be
    /// opened.
    pub async fn open(dsn: &str, config: PoolConfig) -> Result<Self> {
        if dsn.contains("://") && !dsn.starts_with("sqlite:") {
            return Err(OrmError::InvalidDsn(format!("{dsn}: not a sqlite url")));
        }
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| OrmError::InvalidDsn(format!("{dsn}: {e}")))?
            .create_if_missing(true);
        let memory = is_memory_dsn(dsn);
        let pool = pool_options(&config, memory)
            .connect_with(options.clone())
            .await?;
        debug!(dsn = %dsn, memory, "opened sqlite pool");
        Ok(Self {
            dsn: dsn.to_string(),
            options,
            memory,
            state: RwLock::new(PoolState { pool, config }),
        })
    }

    fn state(&self) -> PoolState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The underlying sqlx pool.
    #[must_use]
    pub fn pool(&self) -> SqlitePool {
        self.state().pool
    }
}

fn pool_options(config: &PoolConfig, memory: bool) -> SqlitePoolOptions {
    if memory {
        return SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .max_lifetime(None::<Duration>)
            .idle_timeout(None::<Duration>);
    }
    SqlitePoolOptions::new()
        .max_connections(config.max_open.max(1))
        .min_connections(config.max_idle.min(config.max_open))
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    fn dsn(&self) -> &str {
        &self.dsn
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let pool = self.pool();
        let conn = pool.acquire().await?;
        Ok(Box::new(SqliteConnection {
            conn: Some(conn),
            in_tx: false,
        }))
    }

    fn stats(&self) -> PoolStats {
        let pool = self.pool();
        PoolStats {
            open: pool.size(),
            idle: u32::try_from(pool.num_idle()).unwrap_or(u32::MAX),
        }
    }

    fn pool_config(&self) -> PoolConfig {
        self.state().config
    }

    /// sqlx fixes pool limits at creation, so file databases get a fresh
    /// pool; in-memory databases keep theirs and only record the settings.
    fn configure(&self, config: PoolConfig) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.config = config;
        if !self.memory {
            state.pool = pool_options(&config, false).connect_lazy_with(self.options.clone());
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool().acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool().close().await;
    }

    async fn reopen(&self) -> Result<Arc<dyn Driver>> {
        let driver = Self::open(&self.dsn, self.pool_config()).await?;
        Ok(Arc::new(driver))
    }
}

/// A leased SQLite connection.
pub struct SqliteConnection {
    conn: Option<PoolConnection<Sqlite>>,
    in_tx: bool,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_tx", &self.in_tx)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    fn raw(&mut self) -> Result<&mut sqlx::sqlite::SqliteConnection> {
        self.conn.as_deref_mut().ok_or(OrmError::SessionClosed)
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Blob(b) => query.bind(b.clone()),
        SqlValue::Time(t) => query.bind(format_db_time(t)),
        SqlValue::TimeTz(t) => query.bind(t.to_rfc3339()),
    }
}

fn build_query<'q>(sql: &'q str, args: &[SqlValue]) -> SqliteQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql), |query, arg| bind_value(query, arg))
}

fn column_names(row: &SqliteRow) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

fn decode_value(row: &SqliteRow, idx: usize) -> Result<SqlValue> {
    let type_name = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" | "BOOL" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            SqlValue::Float(row.try_get_unchecked::<f64, _>(idx)?)
        }
        "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        let conn = self.raw()?;
        let done = build_query(sql, args).execute(&mut *conn).await?;
        Ok(ExecResult {
            rows_affected: done.rows_affected(),
            last_insert_id: Some(done.last_insert_rowid()),
        })
    }

    async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Rows> {
        let conn = self.raw()?;
        let rows = build_query(sql, args).fetch_all(&mut *conn).await?;
        let columns = rows
            .first()
            .map(|row| column_names(row).to_vec())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(Rows { columns, rows })
    }

    fn fetch(&mut self, sql: String, args: Vec<SqlValue>) -> BoxStream<'_, Result<Row>> {
        Box::pin(stream! {
            let conn = match self.raw() {
                Ok(conn) => conn,
                Err(e) => {
                    yield Err::<Row, OrmError>(e);
                    return;
                }
            };
            let mut rows = build_query(&sql, &args).fetch(&mut *conn);
            let mut columns: Option<Arc<[String]>> = None;
            loop {
                match rows.try_next().await {
                    Ok(Some(row)) => {
                        let names = columns.get_or_insert_with(|| column_names(&row)).clone();
                        yield decode_row(&row).map(|values| Row { columns: names, values });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(OrmError::from(e));
                        break;
                    }
                }
            }
        })
    }

    async fn begin(&mut self, sql: &str) -> Result<()> {
        let conn = self.raw()?;
        sqlx::query(sql).execute(&mut *conn).await?;
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self, sql: &str) -> Result<()> {
        let conn = self.raw()?;
        sqlx::query(sql).execute(&mut *conn).await?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self, sql: &str) -> Result<()> {
        let conn = self.raw()?;
        let result = sqlx::query(sql).execute(&mut *conn).await;
        self.in_tx = false;
        result?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.in_tx {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        warn!(error = %e, "rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => {
                warn!("no runtime to roll back abandoned transaction; closing connection");
                drop(conn.detach());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn memory() -> SqliteDriver {
        SqliteDriver::open("sqlite::memory:", PoolConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let driver = memory().await;
        let mut conn = driver.acquire().await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL, data BLOB)", &[])
            .await
            .unwrap();
        let done = conn
            .execute(
                "INSERT INTO t (name, score, data) VALUES (?, ?, ?)",
                &[
                    SqlValue::Text("a".into()),
                    SqlValue::Float(1.5),
                    SqlValue::Blob(vec![1, 2]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(done.rows_affected, 1);
        assert_eq!(done.last_insert_id, Some(1));

        let rows = conn.query("SELECT id, name, score, data FROM t", &[]).await.unwrap();
        assert_eq!(rows.columns, vec!["id", "name", "score", "data"]);
        assert_eq!(
            rows.rows[0],
            vec![
                SqlValue::Int(1),
                SqlValue::Text("a".into()),
                SqlValue::Float(1.5),
                SqlValue::Blob(vec![1, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_null_and_time_binding() {
        let driver = memory().await;
        let mut conn = driver.acquire().await.unwrap();
        conn.execute("CREATE TABLE t (at DATETIME, note TEXT)", &[])
            .await
            .unwrap();
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        conn.execute(
            "INSERT INTO t (at, note) VALUES (?, ?)",
            &[SqlValue::Time(at), SqlValue::Null],
        )
        .await
        .unwrap();
        let rows = conn.query("SELECT at, note FROM t", &[]).await.unwrap();
        assert_eq!(rows.rows[0][0], SqlValue::Text("2024-01-02 03:04:05".into()));
        assert_eq!(rows.rows[0][1], SqlValue::Null);
    }

    #[tokio::test]
    async fn test_fetch_streams_rows() {
        let driver = memory().await;
        let mut conn = driver.acquire().await.unwrap();
        conn.execute("CREATE TABLE t (n INTEGER)", &[]).await.unwrap();
        conn.execute("INSERT INTO t (n) VALUES (1), (2), (3)", &[])
            .await
            .unwrap();
        let rows: Vec<Row> = conn
            .fetch("SELECT n FROM t WHERE n > ? ORDER BY n".into(), vec![SqlValue::Int(1)])
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(rows.len(), 2);
        assert_eq!(&*rows[0].columns, &["n".to_string()]);
        assert_eq!(rows[1].values, vec![SqlValue::Int(3)]);
    }

    #[tokio::test]
    async fn test_transaction_flag_and_stats() {
        let driver = memory().await;
        let mut conn = driver.acquire().await.unwrap();
        conn.begin("BEGIN").await.unwrap();
        assert!(conn.in_transaction());
        conn.rollback("ROLLBACK").await.unwrap();
        assert!(!conn.in_transaction());
        assert_eq!(driver.stats().open, 1);
        assert_eq!(driver.stats().in_use(), 1);
        drop(conn);
        driver.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_dsn() {
        let err = SqliteDriver::open("postgres://nope", PoolConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidDsn(_)));
    }
}
