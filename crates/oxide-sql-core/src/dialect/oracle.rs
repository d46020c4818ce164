//! Oracle dialect.
//!
//! Auto-increment columns are backed by a per-table sequence named
//! `seq_<table>`, created alongside the table. A `trg_<table>` trigger
//! fills the column from the sequence when an INSERT leaves it out, which
//! is how `INSERT ALL` gets one key per row.

use super::quote::COMMON_RESERVED;
use super::{
    default_create_table, introspected_column, DbType, Dialect, Filter, IndexRow,
    InsertIdStrategy, MetaRow, Page, Quoter, SelectParts, SeqFilter,
};
use crate::schema::{names, Column, Table};
use crate::value::SqlValue;

/// Oracle dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

fn sequence_name(table: &str) -> String {
    format!("seq_{}", table.replace('.', "_"))
}

fn trigger_name(table: &str) -> String {
    format!("trg_{}", table.replace('.', "_"))
}

fn ignore_missing(statement: &str) -> String {
    format!(
        "BEGIN EXECUTE IMMEDIATE '{}'; EXCEPTION WHEN OTHERS THEN NULL; END;",
        statement.replace('\'', "''")
    )
}

fn with_len_or(name: &str, len: Option<u32>, fallback: u32) -> String {
    format!("{name}({})", len.unwrap_or(fallback))
}

impl Dialect for OracleDialect {
    fn db_type(&self) -> DbType {
        DbType::Oracle
    }

    fn quoter(&self) -> Quoter {
        Quoter::new('"', '"', COMMON_RESERVED)
    }

    fn placeholder(&self, n: usize) -> String {
        format!(":{n}")
    }

    fn filters(&self) -> Vec<Box<dyn Filter>> {
        vec![Box::new(SeqFilter {
            prefix: ":",
            start: 1,
        })]
    }

    /// Paging wraps the query twice around `ROWNUM`. A locking read can
    /// only be paged as a first page without ordering, where the bound
    /// moves into the WHERE clause.
    fn render_select(&self, parts: &SelectParts, page: Option<Page>) -> String {
        let Some(page) = page else {
            let base = parts.plain(None, "");
            return if parts.for_update {
                format!("{base} FOR UPDATE")
            } else {
                base
            };
        };
        if parts.for_update && self.locks_paged_select(parts, page) {
            let bound = format!("ROWNUM <= {}", page.limit);
            let mut limited = parts.clone();
            limited.where_clause = Some(match &parts.where_clause {
                Some(cond) => format!("({cond}) AND {bound}"),
                None => bound,
            });
            return format!("{} FOR UPDATE", limited.plain(None, ""));
        }
        format!(
            "SELECT * FROM (SELECT at.*, ROWNUM rn FROM ({}) at WHERE ROWNUM <= {}) aat WHERE rn > {}",
            parts.plain(None, ""),
            page.offset + page.limit,
            page.offset
        )
    }

    fn locks_paged_select(&self, parts: &SelectParts, page: Page) -> bool {
        page.offset == 0 && parts.order_by.is_none() && !parts.distinct && parts.group_by.is_none()
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::Sequence
    }

    fn last_insert_id_sql(&self, table: &str) -> Option<String> {
        Some(format!("SELECT {}.currval FROM dual", sequence_name(table)))
    }

    fn autoincr_insert_expr(&self, table: &str) -> Option<String> {
        Some(format!("{}.nextval", sequence_name(table)))
    }

    /// `NEXTVAL` is evaluated once per source row of `INSERT ALL`, so the
    /// key column is left to the trigger.
    fn multi_insert_autoincr_expr(&self, _table: &str) -> Option<String> {
        None
    }

    fn insert_multi(&self, quoted_table: &str, quoted_columns: &str, rows: &[String]) -> String {
        let mut sql = String::from("INSERT ALL");
        for row in rows {
            sql.push_str(&format!(" INTO {quoted_table} ({quoted_columns}) VALUES ({row})"));
        }
        sql.push_str(" SELECT 1 FROM DUAL");
        sql
    }

    fn begin_sql(&self) -> &'static str {
        "SET TRANSACTION READ WRITE"
    }

    fn release_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn sql_type(&self, column: &Column) -> String {
        let ty = &column.sql_type;
        match ty.name.as_str() {
            names::BIT | names::TINYINT | names::BOOL | names::BOOLEAN => "NUMBER(3)".to_string(),
            names::SMALLINT => "NUMBER(5)".to_string(),
            names::MEDIUMINT | names::INT | names::INTEGER | names::SERIAL | names::YEAR => {
                "NUMBER(10)".to_string()
            }
            names::BIGINT | names::BIGSERIAL => "NUMBER(19)".to_string(),
            names::CHAR | names::UUID => with_len_or("CHAR", ty.len1, 36),
            names::VARCHAR | names::ENUM | names::SET => with_len_or("VARCHAR2", ty.len1, 255),
            names::NCHAR => with_len_or("NCHAR", ty.len1, 1),
            names::NVARCHAR => with_len_or("NVARCHAR2", ty.len1, 255),
            names::NTEXT => "NCLOB".to_string(),
            names::DATE => "DATE".to_string(),
            names::TIMESTAMPZ => "TIMESTAMP WITH TIME ZONE".to_string(),
            names::REAL | names::FLOAT => "BINARY_FLOAT".to_string(),
            names::DOUBLE => "BINARY_DOUBLE".to_string(),
            names::DECIMAL | names::NUMERIC | names::MONEY => match (ty.len1, ty.len2) {
                (Some(p), Some(s)) => format!("NUMBER({p},{s})"),
                (Some(p), None) => format!("NUMBER({p})"),
                _ => "NUMBER".to_string(),
            },
            _ if ty.is_time() => "TIMESTAMP".to_string(),
            _ if ty.is_blob() => "BLOB".to_string(),
            _ => "CLOB".to_string(),
        }
    }

    fn column_definition(&self, column: &Column, single_pk: bool, q: &Quoter) -> String {
        let mut sql = format!("{} {}", q.quote(&column.name), self.sql_type(column));
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if single_pk && column.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    fn create_table_sql(&self, table: &Table, table_name: &str, q: &Quoter) -> Vec<String> {
        let mut sqls = vec![default_create_table(self, table, table_name, q, "CREATE TABLE ")];
        if let Some(column) = &table.auto_increment {
            let seq = sequence_name(table_name);
            let column = q.quote(column);
            sqls.push(format!("CREATE SEQUENCE {seq} START WITH 1 INCREMENT BY 1"));
            sqls.push(format!(
                "CREATE OR REPLACE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW \
                 WHEN (new.{column} IS NULL) BEGIN SELECT {seq}.nextval INTO :new.{column} FROM dual; END;",
                trigger_name(table_name),
                q.quote(table_name),
            ));
        }
        sqls
    }

    fn drop_table_sql(&self, table_name: &str, q: &Quoter) -> Vec<String> {
        vec![
            ignore_missing(&format!("DROP TABLE {}", q.quote(table_name))),
            ignore_missing(&format!("DROP SEQUENCE {}", sequence_name(table_name))),
        ]
    }

    fn is_table_exist_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT table_name FROM user_tables WHERE table_name = ?".to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn tables_sql(&self) -> (String, Vec<SqlValue>) {
        ("SELECT table_name FROM user_tables".to_string(), Vec::new())
    }

    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT column_name, data_default, data_type, data_length, data_precision, data_scale, nullable \
             FROM user_tab_columns WHERE table_name = ? ORDER BY column_id"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn column_from_row(&self, row: &MetaRow<'_>) -> Option<Column> {
        let name = row.text("column_name");
        if name.is_empty() {
            return None;
        }
        let data_type = row.text("data_type");
        let type_name = match data_type.as_str() {
            "VARCHAR2" => names::VARCHAR,
            "NVARCHAR2" => names::NVARCHAR,
            "NUMBER" => match row.int("data_scale") {
                Some(scale) if scale > 0 => names::DECIMAL,
                _ => names::BIGINT,
            },
            "BINARY_FLOAT" => names::FLOAT,
            "BINARY_DOUBLE" => names::DOUBLE,
            other if other.starts_with("TIMESTAMP") => names::TIMESTAMP,
            other => other,
        };
        let length = if type_name == names::VARCHAR || type_name == names::NVARCHAR {
            row.int("data_length")
        } else {
            None
        };
        Some(introspected_column(
            name,
            type_name,
            length,
            row.text("nullable") == "Y",
            row.get("data_default")
                .filter(|v| !v.is_null())
                .map(|v| v.to_text(None).trim().to_string()),
        ))
    }

    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT t.column_name, i.uniqueness, i.index_name FROM user_ind_columns t, user_indexes i \
             WHERE t.index_name = i.index_name AND t.table_name = i.table_name AND t.table_name = ? \
             ORDER BY t.column_position"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow> {
        let name = row.text("index_name");
        if name.is_empty() || name.starts_with("SYS_") {
            return None;
        }
        Some(IndexRow {
            name,
            unique: row.text("uniqueness") == "UNIQUE",
            columns: vec![row.text("column_name")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::apply_filters;
    use crate::schema::SqlType;

    #[test]
    fn test_rownum_paging() {
        let parts = SelectParts {
            columns: "*".into(),
            table: "\"user\"".into(),
            order_by: Some("\"id\"".into()),
            ..SelectParts::default()
        };
        assert_eq!(
            OracleDialect.render_select(&parts, Some(Page { limit: 2, offset: 3 })),
            "SELECT * FROM (SELECT at.*, ROWNUM rn FROM (SELECT * FROM \"user\" ORDER BY \"id\") at \
             WHERE ROWNUM <= 5) aat WHERE rn > 3"
        );
    }

    #[test]
    fn test_locking_first_page() {
        let d = OracleDialect;
        let parts = SelectParts {
            columns: "*".into(),
            table: "\"user\"".into(),
            where_clause: Some("\"name\" = ?".into()),
            for_update: true,
            ..SelectParts::default()
        };
        let first = Page { limit: 1, offset: 0 };
        assert!(d.locks_paged_select(&parts, first));
        assert_eq!(
            d.render_select(&parts, Some(first)),
            "SELECT * FROM \"user\" WHERE (\"name\" = ?) AND ROWNUM <= 1 FOR UPDATE"
        );

        let mut ordered = parts.clone();
        ordered.order_by = Some("\"id\"".into());
        assert!(!d.locks_paged_select(&ordered, first));
        assert!(!d.locks_paged_select(&parts, Page { limit: 1, offset: 2 }));
        assert_eq!(
            d.render_select(&parts, None),
            "SELECT * FROM \"user\" WHERE \"name\" = ? FOR UPDATE"
        );
    }

    #[test]
    fn test_sequence_names() {
        let d = OracleDialect;
        assert_eq!(
            d.last_insert_id_sql("user").as_deref(),
            Some("SELECT seq_user.currval FROM dual")
        );
        assert_eq!(d.autoincr_insert_expr("user").as_deref(), Some("seq_user.nextval"));
    }

    #[test]
    fn test_insert_all() {
        let d = OracleDialect;
        let sql = d.insert_multi("\"user\"", "\"name\"", &["?".to_string(), "?".to_string()]);
        assert_eq!(
            apply_filters(&d.filters(), &sql),
            "INSERT ALL INTO \"user\" (\"name\") VALUES (:1) INTO \"user\" (\"name\") VALUES (:2) SELECT 1 FROM DUAL"
        );
    }

    #[test]
    fn test_create_table_adds_sequence() {
        let d = OracleDialect;
        let mut table = Table::new("user");
        let mut id = Column::new("id", SqlType::new("BIGINT"));
        id.is_primary_key = true;
        id.is_auto_increment = true;
        id.nullable = false;
        table.add_column(id);
        let sqls = d.create_table_sql(&table, "user", &d.quoter());
        assert_eq!(sqls[0], "CREATE TABLE \"user\" (\"id\" NUMBER(19) PRIMARY KEY NOT NULL)");
        assert_eq!(sqls[1], "CREATE SEQUENCE seq_user START WITH 1 INCREMENT BY 1");
        assert_eq!(
            sqls[2],
            "CREATE OR REPLACE TRIGGER trg_user BEFORE INSERT ON \"user\" FOR EACH ROW \
             WHEN (new.\"id\" IS NULL) BEGIN SELECT seq_user.nextval INTO :new.\"id\" FROM dual; END;"
        );
        assert!(d.multi_insert_autoincr_expr("user").is_none());
    }
}
