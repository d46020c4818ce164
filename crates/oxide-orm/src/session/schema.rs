//! DDL, synchronization and introspection.

use oxide_sql_core::dialect::MetaRow;
use oxide_sql_core::{Column, Index, IndexType, Record, RecordDescriptor, SqlValue, Table};

use super::Session;
use crate::error::{OrmError, Result};
use crate::logger::LogLevel;

/// Base type name: `VARCHAR(255)` gives `VARCHAR`.
fn base_type(sql_type: &str) -> String {
    sql_type
        .split('(')
        .next()
        .unwrap_or(sql_type)
        .trim()
        .to_ascii_uppercase()
}

/// Whether an introspected index was created by the engine for `table`.
fn is_engine_index(name: &str, table: &str) -> bool {
    let table = table.replace('.', "_");
    [format!("IDX_{table}_"), format!("UQE_{table}_")]
        .iter()
        .any(|prefix| name.starts_with(prefix.as_str()))
}

impl Session {
    async fn exec_all(&mut self, statements: Vec<String>) -> Result<()> {
        for sql in statements {
            self.exec_sql(&sql, Vec::new()).await?;
        }
        Ok(())
    }

    async fn table_exists(&mut self, name: &str) -> Result<bool> {
        let (sql, args) = self.engine().dialect().is_table_exist_sql(name);
        Ok(!self.query_sql(&sql, args).await?.is_empty())
    }

    async fn db_columns(&mut self, name: &str) -> Result<Vec<Column>> {
        let dialect = self.engine().dialect();
        let (sql, args) = dialect.columns_sql(name);
        let rows = self.query_sql(&sql, args).await?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|values| dialect.column_from_row(&MetaRow::new(&rows.columns, values)))
            .collect())
    }

    /// Introspected indexes under their physical names.
    async fn db_indexes(&mut self, name: &str) -> Result<Vec<Index>> {
        let dialect = self.engine().dialect();
        let (sql, args) = dialect.indexes_sql(name);
        let rows = self.query_sql(&sql, args).await?;
        let mut indexes: Vec<Index> = Vec::new();
        for values in &rows.rows {
            let Some(row) = dialect.index_from_row(&MetaRow::new(&rows.columns, values)) else {
                continue;
            };
            if let Some(existing) = indexes.iter_mut().find(|i| i.name == row.name) {
                existing.columns.extend(row.columns);
                continue;
            }
            let kind = if row.unique {
                IndexType::Unique
            } else {
                IndexType::Index
            };
            let mut index = Index::new(&row.name, kind);
            index.columns = row.columns;
            indexes.push(index);
        }
        Ok(indexes)
    }

    fn target_name(&self, table: &Table) -> String {
        self.statement.table_name_for(table).to_string()
    }

    async fn create_table_of(&mut self, table: &Table, name: &str) -> Result<()> {
        let dialect = self.engine().dialect();
        let q = self.engine().quoter();
        self.exec_all(dialect.create_table_sql(table, name, &q)).await
    }

    async fn create_indexes_of(&mut self, table: &Table, name: &str, kind: IndexType) -> Result<()> {
        let dialect = self.engine().dialect();
        let q = self.engine().quoter();
        let statements = table
            .indexes
            .iter()
            .filter(|i| i.index_type == kind)
            .map(|i| dialect.create_index_sql(name, i, &q))
            .collect();
        self.exec_all(statements).await
    }

    /// Creates the table of `T` if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn create_table<T: Record>(&mut self) -> Result<()> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let name = self.target_name(&table);
            self.create_table_of(&table, &name).await
        }
        .await;
        self.finish();
        result
    }

    /// Creates the non-unique indexes of `T`.
    ///
    /// # Errors
    ///
    /// Fails on driver errors, including an index that already exists.
    pub async fn create_indexes<T: Record>(&mut self) -> Result<()> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let name = self.target_name(&table);
            self.create_indexes_of(&table, &name, IndexType::Index).await
        }
        .await;
        self.finish();
        result
    }

    /// Creates the unique indexes of `T`.
    ///
    /// # Errors
    ///
    /// Fails on driver errors, including an index that already exists.
    pub async fn create_unique_indexes<T: Record>(&mut self) -> Result<()> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let name = self.target_name(&table);
            self.create_indexes_of(&table, &name, IndexType::Unique).await
        }
        .await;
        self.finish();
        result
    }

    /// Drops the table of `T` if it exists.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn drop_table<T: Record>(&mut self) -> Result<()> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let name = self.target_name(&table);
            let statements = self
                .engine()
                .dialect()
                .drop_table_sql(&name, &self.engine().quoter());
            self.exec_all(statements).await
        }
        .await;
        self.finish();
        result
    }

    /// Creates each table with its indexes, skipping tables that exist.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn create_tables(&mut self, records: &[&'static RecordDescriptor]) -> Result<()> {
        let result = async {
            self.check_open()?;
            for &desc in records {
                let table = self.engine().table_info_of(desc)?;
                if self.table_exists(&table.name).await? {
                    continue;
                }
                self.create_table_of(&table, &table.name).await?;
                self.create_indexes_of(&table, &table.name, IndexType::Unique)
                    .await?;
                self.create_indexes_of(&table, &table.name, IndexType::Index)
                    .await?;
            }
            Ok(())
        }
        .await;
        self.finish();
        result
    }

    /// Drops each table that exists.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn drop_tables(&mut self, records: &[&'static RecordDescriptor]) -> Result<()> {
        let result = async {
            self.check_open()?;
            let dialect = self.engine().dialect();
            let q = self.engine().quoter();
            for &desc in records {
                let name = self.engine().table_name_of(desc);
                self.exec_all(dialect.drop_table_sql(&name, &q)).await?;
            }
            Ok(())
        }
        .await;
        self.finish();
        result
    }

    /// Whether the table of `T` exists.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn is_table_exist<T: Record>(&mut self) -> Result<bool> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let name = self.target_name(&table);
            self.table_exists(&name).await
        }
        .await;
        self.finish();
        result
    }

    /// Whether the table of `T` has no rows.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn is_table_empty<T: Record>(&mut self) -> Result<bool> {
        let result = async {
            self.check_open()?;
            let table = self.engine().table_info::<T>()?;
            let dialect = self.engine().dialect();
            let cx = self.sql_cx(dialect.as_ref());
            let sql = format!("SELECT count(*) FROM {}", cx.quote_table(&self.target_name(&table)));
            let rows = self.query_sql(&sql, Vec::new()).await?;
            Ok::<_, OrmError>(rows.scalar().and_then(SqlValue::as_i64).unwrap_or(0) == 0)
        }
        .await;
        self.finish();
        result
    }

    /// Brings the table of `T` in line with its declaration.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn sync<T: Record>(&mut self) -> Result<()> {
        self.sync_tables(&[T::descriptor()]).await
    }

    /// Brings each table in line with its record declaration.
    ///
    /// Missing tables are created with their indexes, missing columns are
    /// added and indexes whose shape changed are recreated. Engine-named
    /// indexes that are no longer declared are dropped. Column type
    /// mismatches are only logged.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn sync_tables(&mut self, records: &[&'static RecordDescriptor]) -> Result<()> {
        let mut result = self.check_open();
        for &desc in records {
            if result.is_err() {
                break;
            }
            result = self.sync_one(desc).await;
        }
        self.finish();
        result
    }

    async fn sync_one(&mut self, desc: &'static RecordDescriptor) -> Result<()> {
        let table = self.engine().table_info_of(desc)?;
        let name = table.name.clone();
        let dialect = self.engine().dialect();
        let q = self.engine().quoter();

        if !self.table_exists(&name).await? {
            self.create_table_of(&table, &name).await?;
            self.create_indexes_of(&table, &name, IndexType::Unique).await?;
            self.create_indexes_of(&table, &name, IndexType::Index).await?;
            self.engine()
                .log(LogLevel::Info, &format!("created table `{name}`"));
            return Ok(());
        }

        let existing = self.db_columns(&name).await?;
        for column in &table.columns {
            match existing.iter().find(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                None => {
                    self.exec_sql(&dialect.add_column_sql(&name, column, &q), Vec::new())
                        .await?;
                    self.engine().log(
                        LogLevel::Info,
                        &format!("added column `{}` to table `{name}`", column.name),
                    );
                }
                Some(found) => {
                    let expected = base_type(&dialect.sql_type(column));
                    let actual = base_type(&found.sql_type.name);
                    if expected != actual {
                        self.engine().log(
                            LogLevel::Warn,
                            &format!(
                                "table `{name}` column `{}` has type {actual}, declared {expected}",
                                column.name
                            ),
                        );
                    }
                }
            }
        }

        let mut indexes = self.db_indexes(&name).await?;
        for declared in &table.indexes {
            let physical = declared.x_name(&name);
            let pos = indexes
                .iter()
                .position(|i| i.name.eq_ignore_ascii_case(&physical));
            if let Some(pos) = pos {
                let found = indexes.remove(pos);
                if found.equal_shape(declared) {
                    continue;
                }
                self.exec_sql(&dialect.drop_index_sql(&name, &found, &q), Vec::new())
                    .await?;
            }
            self.exec_sql(&dialect.create_index_sql(&name, declared, &q), Vec::new())
                .await?;
        }
        for stale in indexes.iter().filter(|i| is_engine_index(&i.name, &name)) {
            self.exec_sql(&dialect.drop_index_sql(&name, stale, &q), Vec::new())
                .await?;
            self.engine()
                .log(LogLevel::Info, &format!("dropped index `{}`", stale.name));
        }
        Ok(())
    }

    /// Tables of the connected database with their columns and indexes.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn db_metas(&mut self) -> Result<Vec<Table>> {
        let result = self.db_metas_inner().await;
        self.finish();
        result
    }

    async fn db_metas_inner(&mut self) -> Result<Vec<Table>> {
        self.check_open()?;
        let (sql, args) = self.engine().dialect().tables_sql();
        let rows = self.query_sql(&sql, args).await?;
        let names: Vec<String> = rows
            .rows
            .iter()
            .map(|values| MetaRow::new(&rows.columns, values).first_text())
            .collect();
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let mut table = Table::new(&name);
            for column in self.db_columns(&name).await? {
                table.add_column(column);
            }
            for index in self.db_indexes(&name).await? {
                table.add_index(index);
            }
            tables.push(table);
        }
        Ok(tables)
    }
}
