//! SQLite dialect.

use super::quote::COMMON_RESERVED;
use super::{
    introspected_column, parse_index_sql, DbType, Dialect, IndexRow, MetaRow, Page, Quoter,
    SelectParts,
};
use crate::schema::{names, Column};
use crate::value::SqlValue;

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    fn quoter(&self) -> Quoter {
        Quoter::new('"', '"', COMMON_RESERVED)
    }

    fn render_select(&self, parts: &SelectParts, page: Option<Page>) -> String {
        // SQLite has no row locks; FOR UPDATE is dropped.
        let mut sql = parts.plain(None, "");
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {}", page.limit));
            if page.offset > 0 {
                sql.push_str(&format!(" OFFSET {}", page.offset));
            }
        }
        sql
    }

    fn sql_type(&self, column: &Column) -> String {
        // SQLite has dynamic typing with type affinity
        let ty = &column.sql_type;
        if column.is_auto_increment {
            return "INTEGER".to_string();
        }
        match ty.name.as_str() {
            names::BOOL | names::BOOLEAN => "INTEGER".to_string(),
            _ if ty.is_integer() => "INTEGER".to_string(),
            names::REAL | names::FLOAT | names::DOUBLE => "REAL".to_string(),
            names::DECIMAL | names::NUMERIC | names::MONEY => "NUMERIC".to_string(),
            names::DATE => "DATE".to_string(),
            names::TIME => "TIME".to_string(),
            _ if ty.is_time() => "DATETIME".to_string(),
            _ if ty.is_blob() => "BLOB".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn autoincr_keyword(&self) -> &'static str {
        " AUTOINCREMENT"
    }

    fn is_table_exist_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?".to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn tables_sql(&self) -> (String, Vec<SqlValue>) {
        (
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'"
                .to_string(),
            Vec::new(),
        )
    }

    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?)".to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn column_from_row(&self, row: &MetaRow<'_>) -> Option<Column> {
        let name = row.text("name");
        if name.is_empty() {
            return None;
        }
        let mut column = introspected_column(
            name,
            &row.text("type"),
            None,
            row.int("notnull") != Some(1),
            row.get("dflt_value")
                .filter(|v| !v.is_null())
                .map(|v| v.to_text(None)),
        );
        if row.int("pk").unwrap_or(0) > 0 {
            column.is_primary_key = true;
            column.nullable = false;
        }
        Some(column)
    }

    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT name, sql FROM sqlite_master WHERE type='index' AND tbl_name = ? AND sql IS NOT NULL"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow> {
        parse_index_sql(&row.text("name"), &row.text("sql"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Index, IndexType, SqlType, Table};

    fn user_table() -> Table {
        let mut table = Table::new("user");
        let mut id = Column::new("id", SqlType::new("BIGINT"));
        id.is_primary_key = true;
        id.is_auto_increment = true;
        id.nullable = false;
        table.add_column(id);
        table.add_column(Column::new("name", SqlType::with_len("VARCHAR", 255)));
        table
    }

    #[test]
    fn test_create_table() {
        let d = SqliteDialect;
        let sql = d.create_table_sql(&user_table(), "user", &d.quoter());
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE IF NOT EXISTS \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \"name\" TEXT NULL)"
            ]
        );
    }

    #[test]
    fn test_paging() {
        let parts = SelectParts {
            columns: "*".into(),
            table: "\"user\"".into(),
            for_update: true,
            ..SelectParts::default()
        };
        assert_eq!(
            SqliteDialect.render_select(&parts, Some(Page { limit: 2, offset: 3 })),
            "SELECT * FROM \"user\" LIMIT 2 OFFSET 3"
        );
    }

    #[test]
    fn test_index_ddl() {
        let d = SqliteDialect;
        let mut index = Index::new("name", IndexType::Unique);
        index.columns.push("name".into());
        assert_eq!(
            d.create_index_sql("user", &index, &d.quoter()),
            "CREATE UNIQUE INDEX \"UQE_user_name\" ON \"user\" (\"name\")"
        );
        assert_eq!(
            d.drop_index_sql("user", &index, &d.quoter()),
            "DROP INDEX \"UQE_user_name\""
        );
    }

    #[test]
    fn test_column_introspection() {
        let columns: Vec<String> = ["name", "type", "notnull", "dflt_value", "pk"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let values = vec![
            SqlValue::Text("id".into()),
            SqlValue::Text("INTEGER".into()),
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Int(1),
        ];
        let column = SqliteDialect
            .column_from_row(&MetaRow::new(&columns, &values))
            .unwrap();
        assert_eq!(column.name, "id");
        assert!(column.is_primary_key);
        assert!(!column.nullable);
        assert!(column.default.is_none());
    }
}
