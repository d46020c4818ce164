//! PostgreSQL dialect.

use super::quote::COMMON_RESERVED;
use super::{
    default_create_table, introspected_column, parse_index_sql, with_len, DbType, Dialect,
    Filter, IndexRow, InsertIdStrategy, MetaRow, Quoter, SeqFilter,
};
use crate::schema::{names, Column, Index, Table};
use crate::value::SqlValue;

const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL dialect; tables live in `schema` (default `public`).
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    pub schema: Option<String>,
}

impl PostgresDialect {
    /// Dialect qualifying tables with `schema`.
    #[must_use]
    pub fn with_schema(schema: &str) -> Self {
        Self {
            schema: Some(schema.to_string()).filter(|s| !s.is_empty()),
        }
    }

    fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }
}

impl Dialect for PostgresDialect {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    fn quoter(&self) -> Quoter {
        Quoter::new('"', '"', COMMON_RESERVED)
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn filters(&self) -> Vec<Box<dyn Filter>> {
        vec![Box::new(SeqFilter {
            prefix: "$",
            start: 1,
        })]
    }

    fn qualify_table(&self, name: &str) -> String {
        match &self.schema {
            Some(schema) if schema != DEFAULT_SCHEMA && !name.contains('.') => {
                format!("{schema}.{name}")
            }
            _ => name.to_string(),
        }
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::Returning
    }

    fn sql_type(&self, column: &Column) -> String {
        let ty = &column.sql_type;
        if column.is_auto_increment {
            return match ty.name.as_str() {
                names::BIGINT | names::BIGSERIAL => "BIGSERIAL".to_string(),
                _ => "SERIAL".to_string(),
            };
        }
        match ty.name.as_str() {
            names::TINYINT | names::SMALLINT => "SMALLINT".to_string(),
            names::MEDIUMINT | names::INT | names::INTEGER | names::YEAR => "INTEGER".to_string(),
            names::BIT | names::BOOL | names::BOOLEAN => "BOOL".to_string(),
            names::DATETIME | names::TIMESTAMP => "TIMESTAMP".to_string(),
            names::TIMESTAMPZ => "TIMESTAMP WITH TIME ZONE".to_string(),
            names::DOUBLE => "DOUBLE PRECISION".to_string(),
            names::FLOAT => "REAL".to_string(),
            names::TINYTEXT | names::MEDIUMTEXT | names::LONGTEXT | names::NTEXT | names::CLOB => {
                "TEXT".to_string()
            }
            names::NVARCHAR => with_len("VARCHAR", ty),
            names::NCHAR => with_len("CHAR", ty),
            _ if ty.is_blob() => "BYTEA".to_string(),
            name => with_len(name, ty),
        }
    }

    fn create_table_sql(&self, table: &Table, table_name: &str, q: &Quoter) -> Vec<String> {
        let mut sqls = vec![default_create_table(
            self,
            table,
            table_name,
            q,
            "CREATE TABLE IF NOT EXISTS ",
        )];
        for column in &table.columns {
            if let Some(comment) = &column.comment {
                sqls.push(format!(
                    "COMMENT ON COLUMN {}.{} IS '{}'",
                    q.quote(table_name),
                    q.quote(&column.name),
                    comment.replace('\'', "''")
                ));
            }
        }
        sqls
    }

    fn drop_index_sql(&self, table_name: &str, index: &Index, q: &Quoter) -> String {
        let name = index.x_name(table_name);
        format!("DROP INDEX {}", q.quote(&self.qualify_table(&name)))
    }

    fn add_column_sql(&self, table_name: &str, column: &Column, q: &Quoter) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            q.quote(table_name),
            self.column_definition(column, false, q)
        )
    }

    fn is_table_exist_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT tablename FROM pg_tables WHERE schemaname = ? AND tablename = ?".to_string(),
            vec![
                SqlValue::Text(self.schema().to_string()),
                SqlValue::Text(table_name.to_string()),
            ],
        )
    }

    fn tables_sql(&self) -> (String, Vec<SqlValue>) {
        (
            "SELECT tablename FROM pg_tables WHERE schemaname = ?".to_string(),
            vec![SqlValue::Text(self.schema().to_string())],
        )
    }

    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT column_name, column_default, is_nullable, data_type, character_maximum_length \
             FROM information_schema.columns WHERE table_schema = ? AND table_name = ? \
             ORDER BY ordinal_position"
                .to_string(),
            vec![
                SqlValue::Text(self.schema().to_string()),
                SqlValue::Text(table_name.to_string()),
            ],
        )
    }

    fn column_from_row(&self, row: &MetaRow<'_>) -> Option<Column> {
        let name = row.text("column_name");
        if name.is_empty() {
            return None;
        }
        let default = row
            .get("column_default")
            .filter(|v| !v.is_null())
            .map(|v| v.to_text(None));
        let serial = default.as_deref().is_some_and(|d| d.starts_with("nextval("));
        let type_name = match row.text("data_type").as_str() {
            "character varying" => names::VARCHAR.to_string(),
            "character" => names::CHAR.to_string(),
            "timestamp without time zone" => names::TIMESTAMP.to_string(),
            "timestamp with time zone" => names::TIMESTAMPZ.to_string(),
            "double precision" => names::DOUBLE.to_string(),
            "boolean" => names::BOOL.to_string(),
            other => other.to_string(),
        };
        let mut column = introspected_column(
            name,
            &type_name,
            row.int("character_maximum_length"),
            row.text("is_nullable").eq_ignore_ascii_case("YES"),
            if serial { None } else { default },
        );
        column.is_auto_increment = serial;
        Some(column)
    }

    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT indexname, indexdef FROM pg_indexes WHERE schemaname = ? AND tablename = ?"
                .to_string(),
            vec![
                SqlValue::Text(self.schema().to_string()),
                SqlValue::Text(table_name.to_string()),
            ],
        )
    }

    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow> {
        let name = row.text("indexname");
        if name.ends_with("_pkey") {
            return None;
        }
        parse_index_sql(&name, &row.text("indexdef"))
    }
}
