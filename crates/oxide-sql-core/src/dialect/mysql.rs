//! MySQL dialect.

use super::quote::COMMON_RESERVED;
use super::{introspected_column, with_len, DbType, Dialect, IndexRow, MetaRow, Quoter};
use crate::schema::{names, Column, Index};
use crate::value::SqlValue;

/// MySQL / MariaDB dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn db_type(&self) -> DbType {
        DbType::Mysql
    }

    fn quoter(&self) -> Quoter {
        Quoter::new('`', '`', COMMON_RESERVED)
    }

    fn batch_first_insert_id(&self, reported: i64, _rows: usize) -> i64 {
        // LAST_INSERT_ID() reports the first row of a multi-row insert.
        reported
    }

    fn default_values_insert(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {quoted_table} VALUES ()")
    }

    fn sql_type(&self, column: &Column) -> String {
        let ty = &column.sql_type;
        match ty.name.as_str() {
            names::BOOL | names::BOOLEAN => "TINYINT(1)".to_string(),
            names::SERIAL => "INT".to_string(),
            names::BIGSERIAL => "BIGINT".to_string(),
            names::BYTEA => "BLOB".to_string(),
            names::TIMESTAMPZ => "TIMESTAMP".to_string(),
            names::UUID => "CHAR(36)".to_string(),
            names::NVARCHAR => with_len("VARCHAR", ty),
            names::NCHAR => with_len("CHAR", ty),
            names::NTEXT | names::XML => "TEXT".to_string(),
            names::CLOB => "LONGTEXT".to_string(),
            names::JSONB => "JSON".to_string(),
            names::MONEY => "DECIMAL(19,4)".to_string(),
            names::VARCHAR if ty.len1.is_none() => "VARCHAR(255)".to_string(),
            name => with_len(name, ty),
        }
    }

    fn autoincr_keyword(&self) -> &'static str {
        " AUTO_INCREMENT"
    }

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
        sql.push_str(if column.nullable && !column.is_primary_key {
            " NULL"
        } else if column.nullable {
            ""
        } else {
            " NOT NULL"
        });
        if let Some(comment) = &column.comment {
            sql.push_str(&format!(" COMMENT '{}'", comment.replace('\'', "''")));
        }
        sql
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
            "SELECT `TABLE_NAME` FROM `INFORMATION_SCHEMA`.`TABLES` WHERE `TABLE_SCHEMA` = DATABASE() AND `TABLE_NAME` = ?"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn tables_sql(&self) -> (String, Vec<SqlValue>) {
        (
            "SELECT `TABLE_NAME` FROM `INFORMATION_SCHEMA`.`TABLES` WHERE `TABLE_SCHEMA` = DATABASE() AND `TABLE_TYPE` = 'BASE TABLE'"
                .to_string(),
            Vec::new(),
        )
    }

    fn columns_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT `COLUMN_NAME`, `IS_NULLABLE`, `COLUMN_DEFAULT`, `DATA_TYPE`, \
             `CHARACTER_MAXIMUM_LENGTH`, `COLUMN_KEY`, `EXTRA`, `COLUMN_COMMENT` \
             FROM `INFORMATION_SCHEMA`.`COLUMNS` WHERE `TABLE_SCHEMA` = DATABASE() AND `TABLE_NAME` = ? \
             ORDER BY `ORDINAL_POSITION`"
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
            row.int("CHARACTER_MAXIMUM_LENGTH"),
            row.text("IS_NULLABLE").eq_ignore_ascii_case("YES"),
            row.get("COLUMN_DEFAULT")
                .filter(|v| !v.is_null())
                .map(|v| v.to_text(None)),
        );
        column.is_primary_key = row.text("COLUMN_KEY") == "PRI";
        column.is_auto_increment = row.text("EXTRA").contains("auto_increment");
        column.comment = Some(row.text("COLUMN_COMMENT")).filter(|c| !c.is_empty());
        Some(column)
    }

    fn indexes_sql(&self, table_name: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT `INDEX_NAME`, `NON_UNIQUE`, `COLUMN_NAME` FROM `INFORMATION_SCHEMA`.`STATISTICS` \
             WHERE `TABLE_SCHEMA` = DATABASE() AND `TABLE_NAME` = ? ORDER BY `SEQ_IN_INDEX`"
                .to_string(),
            vec![SqlValue::Text(table_name.to_string())],
        )
    }

    fn index_from_row(&self, row: &MetaRow<'_>) -> Option<IndexRow> {
        let name = row.text("INDEX_NAME");
        if name.is_empty() || name == "PRIMARY" {
            return None;
        }
        Some(IndexRow {
            name,
            unique: row.int("NON_UNIQUE") == Some(0),
            columns: vec![row.text("COLUMN_NAME")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Page, SelectParts};
    use crate::schema::{IndexType, SqlType, Table};

    #[test]
    fn test_create_table_with_comment() {
        let d = MysqlDialect;
        let mut table = Table::new("user");
        let mut id = Column::new("id", SqlType::new("BIGINT"));
        id.is_primary_key = true;
        id.is_auto_increment = true;
        id.nullable = false;
        table.add_column(id);
        let mut name = Column::new("name", SqlType::with_len("VARCHAR", 64));
        name.comment = Some("login name".into());
        table.add_column(name);
        assert_eq!(
            d.create_table_sql(&table, "user", &d.quoter())[0],
            "CREATE TABLE IF NOT EXISTS `user` (`id` BIGINT PRIMARY KEY AUTO_INCREMENT NOT NULL, \
             `name` VARCHAR(64) NULL COMMENT 'login name')"
        );
    }

    #[test]
    fn test_paging_and_lock() {
        let parts = SelectParts {
            columns: "*".into(),
            table: "`user`".into(),
            order_by: Some("`id`".into()),
            for_update: true,
            ..SelectParts::default()
        };
        assert_eq!(
            MysqlDialect.render_select(&parts, Some(Page { limit: 2, offset: 3 })),
            "SELECT * FROM `user` ORDER BY `id` LIMIT 2 OFFSET 3 FOR UPDATE"
        );
    }

    #[test]
    fn test_insert_forms() {
        let d = MysqlDialect;
        assert_eq!(d.default_values_insert("`t`"), "INSERT INTO `t` VALUES ()");
        assert_eq!(d.batch_first_insert_id(10, 3), 10);
        let mut index = Index::new("name", IndexType::Index);
        index.columns.push("name".into());
        assert_eq!(
            d.drop_index_sql("user", &index, &d.quoter()),
            "DROP INDEX `IDX_user_name` ON `user`"
        );
    }
}
