//! Microsoft SQL Server dialect.

use super::{
    default_create_table, introspected_column, with_len, DbType, Dialect, Filter, IndexRow,
    MetaRow, NationalLiteralFilter, Page, Quoter, SelectParts,
};
use crate::schema::{names, Column, Index, Table};
use crate::value::SqlValue;

const MSSQL_RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BACKUP", "BEGIN", "BETWEEN", "BREAK",
    "BY", "CASCADE", "CASE", "CHECK", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "DATABASE", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END",
    "EXEC", "EXISTS", "FILE", "FOR", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING", "IDENTITY",
    "IN", "INDEX", "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "NOT",
    "NULL", "OF", "ON", "OR", "ORDER", "OUTER", "PERCENT", "PRIMARY", "PROC", "PUBLIC",
    "REFERENCES", "RIGHT", "ROWCOUNT", "SELECT", "SET", "TABLE", "THEN", "TO", "TOP", "TRAN",
    "TRANSACTION", "UNION", "UNIQUE", "UPDATE", "USER", "VALUES", "VIEW", "WHERE", "WITH",
];

const LOCK_HINT: &str = " WITH (UPDLOCK, ROWLOCK)";

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn db_type(&self) -> DbType {
        DbType::Mssql
    }

    fn quoter(&self) -> Quoter {
        Quoter::new('[', ']', MSSQL_RESERVED)
    }

    fn filters(&self) -> Vec<Box<dyn Filter>> {
        vec![Box::new(NationalLiteralFilter)]
    }

    /// `TOP n` when there is no offset; a `ROW_NUMBER()` window otherwise.
    fn render_select(&self, parts: &SelectParts, page: Option<Page>) -> String {
        let hint = if parts.for_update { LOCK_HINT } else { "" };
        let Some(page) = page else {
            return parts.plain(None, hint);
        };
        if page.offset == 0 {
            return parts.plain(Some(page.limit), hint);
        }
        let order = parts
            .order_by
            .clone()
            .or_else(|| parts.default_order.clone())
            .unwrap_or_else(|| "(SELECT NULL)".to_string());
        let mut inner = String::from("SELECT ");
        if parts.distinct {
            inner.push_str("DISTINCT ");
        }
        inner.push_str(&format!(
            "{}, ROW_NUMBER() OVER (ORDER BY {order}) AS [rn] {}",
            parts.columns,
            parts.body(hint)
        ));
        format!(
            "SELECT * FROM ({inner}) AS [sq] WHERE [rn] BETWEEN {} AND {}",
            page.offset + 1,
            page.offset + page.limit
        )
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT TRANSACTION"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK TRANSACTION"
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVE TRANSACTION {name}")
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TRANSACTION {name}")
    }

    fn release_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn sql_type(&self, column: &Column) -> String {
        let ty = &column.sql_type;
        match ty.name.as_str() {
            names::BOOL | names::BOOLEAN => "BIT".to_string(),
            names::SERIAL | names::MEDIUMINT | names::INTEGER => "INT".to_string(),
            names::BIGSERIAL => "BIGINT".to_string(),
            names::TEXT | names::TINYTEXT | names::MEDIUMTEXT | names::LONGTEXT | names::CLOB => {
                "VARCHAR(MAX)".to_string()
            }
            names::NTEXT | names::JSON | names::JSONB => "NVARCHAR(MAX)".to_string(),
            names::XML => "XML".to_string(),
            names::UUID => "UNIQUEIDENTIFIER".to_string(),
            names::TIMESTAMP => "DATETIME".to_string(),
            names::TIMESTAMPZ => "DATETIMEOFFSET".to_string(),
            names::DOUBLE => "FLOAT".to_string(),
            names::BLOB | names::TINYBLOB | names::MEDIUMBLOB | names::LONGBLOB | names::BYTEA => {
                "VARBINARY(MAX)".to_string()
            }
            name => with_len(name, ty),
        }
    }

    fn autoincr_keyword(&self) -> &'static str {
        " IDENTITY(1,1)"
    }

    fn create_table_sql(&self, table: &Table, table_name: &str, q: &Quoter) -> Vec<String> {
        let head = format!(
            "IF NOT EXISTS (SELECT [name] FROM sys.tables WHERE [name] = '{}') CREATE TABLE ",
            table_name.replace('\'', "''")
        );
        vec![default_create_table(self, table, table_name, q, &head)]
    }

    fn drop_table_sql(&self, table_name: &str, q: &Quoter) -> Vec<String> {
        vec![format!(
            "IF EXISTS (SELECT * FROM sys.tables WHERE [name] = '{}') DROP TABLE {}",
            table_name.replace('\'', "''"),
            q.quote(table_name)
        )]
    }

    fn drop_index_sql(&self, table_name: &str, index: &Index, q: &Quoter) -> String {
        format!(
            "DROP INDEX {} ON {}",
            q.quote(&index.x_name(table_name)),
            q.quote(table_name)
        )
    }

    fn is_table_exist_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT [name] FROM sys.tables WHERE [name] = ?".to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn tables_sql(&self) -> (String, Vec<SqlValue>) {
        ("SELECT [name] FROM sys.tables".to_string(), Vec::new())
    }

    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, IS_NULLABLE, COLUMN_DEFAULT, \
             COLUMNPROPERTY(OBJECT_ID(TABLE_NAME), COLUMN_NAME, 'IsIdentity') AS IS_IDENTITY \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn column_from_row(&self, row: &MetaRow<'_>) -> Option<Column> {
        let name = row.text("COLUMN_NAME");
        if name.is_empty() {
            return None;
        }
        let mut column = introspected_column(
            name,
            &row.text("DATA_TYPE"),
            row.int("CHARACTER_MAXIMUM_LENGTH").filter(|l| *l > 0),
            row.text("IS_NULLABLE").eq_ignore_ascii_case("YES"),
            row.get("COLUMN_DEFAULT")
                .filter(|v| !v.is_null())
                .map(|v| v.to_text(None)),
        );
        column.is_auto_increment = row.int("IS_IDENTITY") == Some(1);
        Some(column)
    }

    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT IXS.NAME AS INDEX_NAME, C.NAME AS COLUMN_NAME, IXS.is_unique AS IS_UNIQUE \
             FROM SYS.INDEXES IXS \
             INNER JOIN SYS.INDEX_COLUMNS IXCS ON IXS.OBJECT_ID = IXCS.OBJECT_ID AND IXS.INDEX_ID = IXCS.INDEX_ID \
             INNER JOIN SYS.COLUMNS C ON IXS.OBJECT_ID = C.OBJECT_ID AND IXCS.COLUMN_ID = C.COLUMN_ID \
             WHERE IXS.TYPE_DESC = 'NONCLUSTERED' AND OBJECT_NAME(IXS.OBJECT_ID) = ?"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow> {
        let name = row.text("INDEX_NAME");
        if name.is_empty() {
            return None;
        }
        Some(IndexRow {
            name,
            unique: row.int("IS_UNIQUE") == Some(1),
            columns: vec![row.text("COLUMN_NAME")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> SelectParts {
        SelectParts {
            columns: "*".into(),
            table: "[user]".into(),
            ..SelectParts::default()
        }
    }

    #[test]
    fn test_top_without_offset() {
        assert_eq!(
            MssqlDialect.render_select(&parts(), Some(Page { limit: 2, offset: 0 })),
            "SELECT TOP 2 * FROM [user]"
        );
    }

    #[test]
    fn test_row_number_window_uses_default_order() {
        let mut p = parts();
        p.default_order = Some("[id]".into());
        assert_eq!(
            MssqlDialect.render_select(&p, Some(Page { limit: 2, offset: 3 })),
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER (ORDER BY [id]) AS [rn] FROM [user]) AS [sq] \
             WHERE [rn] BETWEEN 4 AND 5"
        );
    }

    #[test]
    fn test_lock_hint_and_savepoints() {
        let mut p = parts();
        p.for_update = true;
        assert_eq!(
            MssqlDialect.render_select(&p, None),
            "SELECT * FROM [user] WITH (UPDLOCK, ROWLOCK)"
        );
        assert_eq!(MssqlDialect.savepoint_sql("sp_1_1"), "SAVE TRANSACTION sp_1_1");
        assert!(MssqlDialect.release_savepoint_sql("sp_1_1").is_none());
    }
}
