//! SQL dialect support.
//!
//! Different databases have slightly different SQL syntax. A [`Dialect`]
//! captures every difference the ORM cares about: quoting, placeholders,
//! paging, auto-increment retrieval, savepoints, DDL and introspection.
//! All SQL handed out by a dialect uses `?` placeholders; the dialect's
//! [`filters`](Dialect::filters) turn them into the native form.

mod filter;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod quote;
mod sqlite;

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use filter::{apply_filters, count_placeholders, Filter, NationalLiteralFilter, SeqFilter};
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use quote::{QuotePolicy, Quoter};
pub use sqlite::SqliteDialect;

use crate::schema::{Column, Index, IndexType, SqlType, Table};
use crate::value::SqlValue;

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mysql,
    Postgres,
    Mssql,
    Sqlite,
    Oracle,
}

impl DbType {
    /// Canonical backend name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Mssql => "mssql",
            Self::Sqlite => "sqlite",
            Self::Oracle => "oracle",
        }
    }

    /// Default dialect for the backend.
    #[must_use]
    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            Self::Mysql => Arc::new(MysqlDialect),
            Self::Postgres => Arc::new(PostgresDialect::default()),
            Self::Mssql => Arc::new(MssqlDialect),
            Self::Sqlite => Arc::new(SqliteDialect),
            Self::Oracle => Arc::new(OracleDialect),
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" | "tidb" => Ok(Self::Mysql),
            "postgres" | "postgresql" | "pgx" => Ok(Self::Postgres),
            "mssql" | "sqlserver" | "odbc" => Ok(Self::Mssql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "oracle" | "oci8" | "goracle" => Ok(Self::Oracle),
            other => Err(format!("unsupported database `{other}`")),
        }
    }
}

/// LIMIT / OFFSET window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

/// Rendered pieces of a SELECT, assembled by [`Dialect::render_select`].
#[derive(Debug, Clone, Default)]
pub struct SelectParts {
    pub distinct: bool,
    /// Projection, already quoted.
    pub columns: String,
    /// Quoted table with optional alias.
    pub table: String,
    /// Rendered join chain, with a leading space when present.
    pub joins: String,
    pub where_clause: Option<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub for_update: bool,
    /// Order used when paging requires one and none was given.
    pub default_order: Option<String>,
}

impl SelectParts {
    /// `FROM ... [WHERE] [GROUP BY] [HAVING]` without ordering.
    #[must_use]
    pub fn body(&self, table_hint: &str) -> String {
        let mut sql = format!("FROM {}{table_hint}{}", self.table, self.joins);
        if let Some(cond) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(cond);
        }
        if let Some(group) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        sql
    }

    /// `SELECT [DISTINCT] cols FROM ... [ORDER BY]`.
    #[must_use]
    pub fn plain(&self, top: Option<u64>, table_hint: &str) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if let Some(n) = top {
            sql.push_str(&format!("TOP {n} "));
        }
        sql.push_str(&self.columns);
        sql.push(' ');
        sql.push_str(&self.body(table_hint));
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql
    }
}

/// How the value of an auto-increment column is recovered after INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertIdStrategy {
    /// The driver reports it.
    Driver,
    /// `INSERT ... RETURNING <pk>`.
    Returning,
    /// Read the table's sequence on the same connection.
    Sequence,
}

/// One introspected index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Physical index name.
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// A result row handed to the introspection parsers.
#[derive(Debug, Clone, Copy)]
pub struct MetaRow<'a> {
    pub columns: &'a [String],
    pub values: &'a [SqlValue],
}

impl<'a> MetaRow<'a> {
    #[must_use]
    pub const fn new(columns: &'a [String], values: &'a [SqlValue]) -> Self {
        Self { columns, values }
    }

    /// Value of a column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    /// Text of a column; NULL and missing columns give an empty string.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.get(name).map(|v| v.to_text(None)).unwrap_or_default()
    }

    /// Integer value of a column.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SqlValue::as_i64)
    }

    /// Value of the first column.
    #[must_use]
    pub fn first_text(&self) -> String {
        self.values.first().map(|v| v.to_text(None)).unwrap_or_default()
    }
}

/// Backend-specific SQL production.
pub trait Dialect: Send + Sync + Debug {
    /// Backend identifier.
    fn db_type(&self) -> DbType;

    /// Returns the name of the dialect.
    fn name(&self) -> &'static str {
        self.db_type().name()
    }

    /// Delimiters and reserved words, with the `Always` policy.
    fn quoter(&self) -> Quoter;

    /// Placeholder for the n-th (1-based) argument, after filtering.
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Rewrites applied to every statement before execution.
    fn filters(&self) -> Vec<Box<dyn Filter>> {
        Vec::new()
    }

    /// Qualifies a table name with the configured schema.
    fn qualify_table(&self, name: &str) -> String {
        name.to_string()
    }

    /// Assembles a SELECT and applies paging and row locking.
    fn render_select(&self, parts: &SelectParts, page: Option<Page>) -> String {
        let mut sql = parts.plain(None, "");
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {}", page.limit));
            if page.offset > 0 {
                sql.push_str(&format!(" OFFSET {}", page.offset));
            }
        }
        if parts.for_update {
            sql.push_str(" FOR UPDATE");
        }
        sql
    }

    /// How auto-increment values are read back.
    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::Driver
    }

    /// Statement reading the last sequence value, for [`InsertIdStrategy::Sequence`].
    fn last_insert_id_sql(&self, _table: &str) -> Option<String> {
        None
    }

    /// Expression inserted for the auto-increment column, when the dialect
    /// needs one (Oracle sequences).
    fn autoincr_insert_expr(&self, _table: &str) -> Option<String> {
        None
    }

    /// Expression for the auto-increment column in a multi-row INSERT;
    /// `None` leaves the column out.
    fn multi_insert_autoincr_expr(&self, table: &str) -> Option<String> {
        self.autoincr_insert_expr(table)
    }

    /// First id of a multi-row INSERT, from the id the driver reported.
    fn batch_first_insert_id(&self, reported: i64, rows: usize) -> i64 {
        let rows = i64::try_from(rows).unwrap_or(i64::MAX);
        reported - rows + 1
    }

    /// INSERT for a row without insertable columns.
    fn default_values_insert(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {quoted_table} DEFAULT VALUES")
    }

    /// Whether a paged SELECT can carry `FOR UPDATE`.
    fn locks_paged_select(&self, _parts: &SelectParts, _page: Page) -> bool {
        true
    }

    /// Whether `INSERT ... VALUES (...), (...)` is accepted.
    fn supports_multi_insert(&self) -> bool {
        true
    }

    /// Multi-row INSERT; `rows` are rendered value tuples without parentheses.
    fn insert_multi(&self, quoted_table: &str, quoted_columns: &str, rows: &[String]) -> String {
        let values: Vec<String> = rows.iter().map(|r| format!("({r})")).collect();
        format!(
            "INSERT INTO {quoted_table} ({quoted_columns}) VALUES {}",
            values.join(", ")
        )
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVEPOINT {name}")
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {name}")
    }

    /// `None` when the backend has no savepoint release.
    fn release_savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("RELEASE SAVEPOINT {name}"))
    }

    /// Native column type.
    fn sql_type(&self, column: &Column) -> String;

    /// Suffix marking an auto-increment primary key.
    fn autoincr_keyword(&self) -> &'static str {
        ""
    }

    /// Column definition used by CREATE TABLE and ADD COLUMN.
    fn column_definition(&self, column: &Column, single_pk: bool, q: &Quoter) -> String {
        let mut sql = format!("{} {}", q.quote(&column.name), self.sql_type(column));
        if single_pk && column.is_primary_key {
            sql.push_str(" PRIMARY KEY");
            if column.is_auto_increment {
                sql.push_str(self.autoincr_keyword());
            }
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if column.nullable {
            if !column.is_primary_key {
                sql.push_str(" NULL");
            }
        } else {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    /// CREATE TABLE, plus any companion statements.
    fn create_table_sql(&self, table: &Table, table_name: &str, q: &Quoter) -> Vec<String> {
        vec![default_create_table(self, table, table_name, q, "CREATE TABLE IF NOT EXISTS ")]
    }

    fn drop_table_sql(&self, table_name: &str, q: &Quoter) -> Vec<String> {
        vec![format!("DROP TABLE IF EXISTS {}", q.quote(table_name))]
    }

    fn create_index_sql(&self, table_name: &str, index: &Index, q: &Quoter) -> String {
        let unique = if index.index_type == IndexType::Unique {
            "UNIQUE "
        } else {
            ""
        };
        format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            q.quote(&index.x_name(table_name)),
            q.quote(table_name),
            q.join(&index.columns, ",")
        )
    }

    fn drop_index_sql(&self, table_name: &str, index: &Index, q: &Quoter) -> String {
        format!("DROP INDEX {}", q.quote(&index.x_name(table_name)))
    }

    fn add_column_sql(&self, table_name: &str, column: &Column, q: &Quoter) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            q.quote(table_name),
            self.column_definition(column, false, q)
        )
    }

    /// Query returning one row when the table exists.
    fn is_table_exist_sql(&self, table_name: &str) -> (String, Vec<SqlValue>);

    /// Query listing table names in its first column.
    fn tables_sql(&self) -> (String, Vec<SqlValue>);

    /// Query listing the columns of a table.
    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>);

    /// Parses one row of [`columns_sql`](Dialect::columns_sql).
    fn column_from_row(&self, row: &MetaRow<'_>) -> Option<Column>;

    /// Query listing the indexes of a table.
    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>);

    /// Parses one row of [`indexes_sql`](Dialect::indexes_sql); rows of
    /// the same index are merged by the caller.
    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow>;
}

/// Shared CREATE TABLE layout.
pub(crate) fn default_create_table<D: Dialect + ?Sized>(
    dialect: &D,
    table: &Table,
    table_name: &str,
    q: &Quoter,
    head: &str,
) -> String {
    let single_pk = table.primary_keys.len() == 1;
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| dialect.column_definition(c, single_pk, q))
        .collect();
    if table.primary_keys.len() > 1 {
        defs.push(format!("PRIMARY KEY ({})", q.join(&table.primary_keys, ",")));
    }
    format!("{head}{} ({})", q.quote(table_name), defs.join(", "))
}

/// Parses a stored `CREATE [UNIQUE] INDEX name ON table (cols)` statement.
#[must_use]
pub fn parse_index_sql(name: &str, sql: &str) -> Option<IndexRow> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r"(?is)^\s*CREATE\s+(UNIQUE\s+)?INDEX\s+.*?\s+ON\s+.*?\((.*)\)\s*$").ok()
        })
        .as_ref()?;
    let caps = pattern.captures(sql)?;
    let columns = caps
        .get(2)?
        .as_str()
        .split(',')
        .map(|c| {
            c.trim()
                .trim_matches(|ch| matches!(ch, '"' | '`' | '[' | ']'))
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect();
    Some(IndexRow {
        name: name.to_string(),
        unique: caps.get(1).is_some(),
        columns,
    })
}

/// Builds a [`Column`] from an introspected type name, length and nullability.
pub(crate) fn introspected_column(
    name: String,
    type_name: &str,
    length: Option<i64>,
    nullable: bool,
    default: Option<String>,
) -> Column {
    let mut sql_type = SqlType::parse(type_name).unwrap_or_else(|| SqlType {
        name: type_name.trim().to_ascii_uppercase(),
        len1: None,
        len2: None,
    });
    if sql_type.len1.is_none() {
        sql_type.len1 = length.and_then(|l| u32::try_from(l).ok()).filter(|l| *l > 0);
    }
    let mut column = Column::new(&name, sql_type);
    column.nullable = nullable;
    column.default = default.filter(|d| !d.is_empty());
    column
}

/// Renders a SQL type with its length, using a dialect-native name.
pub(crate) fn with_len(name: &str, ty: &SqlType) -> String {
    match (ty.len1, ty.len2) {
        (Some(a), Some(b)) => format!("{name}({a},{b})"),
        (Some(a), None) => format!("{name}({a})"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> SelectParts {
        SelectParts {
            columns: "*".to_string(),
            table: "\"user\"".to_string(),
            where_clause: Some("\"age\" > ?".to_string()),
            order_by: Some("\"id\"".to_string()),
            ..SelectParts::default()
        }
    }

    #[test]
    fn test_db_type_names() {
        assert_eq!("postgresql".parse::<DbType>(), Ok(DbType::Postgres));
        assert_eq!("SQLITE3".parse::<DbType>(), Ok(DbType::Sqlite));
        assert!("db2".parse::<DbType>().is_err());
        assert_eq!(DbType::Mssql.dialect().name(), "mssql");
    }

    #[test]
    fn test_plain_select() {
        assert_eq!(
            parts().plain(None, ""),
            "SELECT * FROM \"user\" WHERE \"age\" > ? ORDER BY \"id\""
        );
    }

    #[test]
    fn test_parse_index_sql() {
        let row = parse_index_sql(
            "UQE_user_name",
            "CREATE UNIQUE INDEX `UQE_user_name` ON `user` (`name`,`email`)",
        )
        .unwrap();
        assert!(row.unique);
        assert_eq!(row.columns, vec!["name", "email"]);
        let row = parse_index_sql(
            "i",
            "CREATE INDEX i ON public.t USING btree (a)",
        )
        .unwrap();
        assert!(!row.unique);
        assert_eq!(row.columns, vec!["a"]);
    }

    #[test]
    fn test_meta_row_lookup() {
        let columns = vec!["NAME".to_string(), "notnull".to_string()];
        let values = vec![SqlValue::Text("id".into()), SqlValue::Int(1)];
        let row = MetaRow::new(&columns, &values);
        assert_eq!(row.text("name"), "id");
        assert_eq!(row.int("NOTNULL"), Some(1));
        assert!(row.get("missing").is_none());
    }
}
