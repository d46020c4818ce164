//! INSERT.

use chrono::Utc;
use oxide_sql_core::dialect::InsertIdStrategy;
use oxide_sql_core::{Column, ConvertContext, Record, SqlValue, Table};

use super::Session;
use crate::error::{OrmError, Result};
use crate::statement::build::column_cx;
use crate::statement::{SqlCx, Statement};

/// A column of the INSERT and how its value is produced.
struct Slot<'t> {
    column: &'t Column,
    /// Literal SQL used instead of a placeholder.
    expr: Option<String>,
}

/// Current time in the representation of `column`.
pub(crate) fn auto_time(convert: ConvertContext, column: &Column) -> SqlValue {
    if column.sql_type.is_integer() {
        SqlValue::Int(Utc::now().timestamp())
    } else {
        column_cx(convert, column).now()
    }
}

/// Columns of the INSERT; `multi` selects the expression a multi-row
/// statement uses for a generated key.
fn insert_slots<'t, T: Record>(
    statement: &Statement,
    table: &'t Table,
    table_name: &str,
    first: &T,
    cx: &SqlCx<'_>,
    multi: bool,
) -> Vec<Slot<'t>> {
    let mut slots = Vec::new();
    for column in &table.columns {
        if !column.is_writable() || column.is_deleted {
            continue;
        }
        if column.is_auto_increment && first.is_zero_field(&column.field_path) {
            let expr = if multi {
                cx.dialect.multi_insert_autoincr_expr(table_name)
            } else {
                cx.dialect.autoincr_insert_expr(table_name)
            };
            if let Some(expr) = expr {
                slots.push(Slot {
                    column,
                    expr: Some(expr),
                });
            }
            continue;
        }
        if statement.columns.is_excluded(&column.name) {
            continue;
        }
        slots.push(Slot { column, expr: None });
    }
    slots
}

/// Placeholders and arguments of one row; engine-managed values are
/// written back to `bean`.
fn row_values<T: Record>(
    statement: &Statement,
    slots: &[Slot<'_>],
    bean: &mut T,
    convert: ConvertContext,
) -> Result<(String, Vec<SqlValue>)> {
    let mut holders = Vec::with_capacity(slots.len());
    let mut args = Vec::with_capacity(slots.len());
    for slot in slots {
        if let Some(expr) = &slot.expr {
            holders.push(expr.clone());
            continue;
        }
        let column = slot.column;
        let ccx = column_cx(convert, column);
        let value = if (column.is_created || column.is_updated) && !statement.no_auto_time {
            let now = auto_time(convert, column);
            bean.set_field(&column.field_path, now.clone(), &ccx)?;
            now
        } else if column.is_version && bean.is_zero_field(&column.field_path) {
            bean.set_field(&column.field_path, SqlValue::Int(1), &ccx)?;
            SqlValue::Int(1)
        } else {
            ccx.normalize(bean.get_field(&column.field_path, &ccx)?)
        };
        holders.push("?".to_string());
        args.push(value);
    }
    Ok((holders.join(", "), args))
}

/// Assigns consecutive keys starting at `first`.
fn write_ids<T: Record>(
    beans: &mut [T],
    column: &Column,
    first: i64,
    convert: ConvertContext,
) -> Result<()> {
    for (id, bean) in (first..).zip(beans.iter_mut()) {
        bean.set_field(&column.field_path, SqlValue::Int(id), &convert)?;
    }
    Ok(())
}

impl Session {
    /// Inserts one record and writes the generated key back into it.
    /// Returns the number of inserted rows.
    ///
    /// # Errors
    ///
    /// Fails when a hook rejects the record or on driver errors.
    pub async fn insert<T: Record>(&mut self, bean: &mut T) -> Result<u64> {
        let result = self.insert_inner(bean).await;
        self.finish();
        result
    }

    async fn insert_inner<T: Record>(&mut self, bean: &mut T) -> Result<u64> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        self.run_before_closures(&*bean);
        bean.before_insert().map_err(OrmError::Hook)?;

        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let table_name = self.statement.table_name_for(&table).to_string();
        let quoted_table = cx.quote_table(&table_name);
        let slots = insert_slots(&self.statement, &table, &table_name, &*bean, &cx, false);
        let (values, args) = row_values(&self.statement, &slots, bean, cx.convert)?;

        let mut sql = if slots.is_empty() {
            dialect.default_values_insert(&quoted_table)
        } else {
            let names: Vec<&str> = slots.iter().map(|s| s.column.name.as_str()).collect();
            format!(
                "INSERT INTO {quoted_table} ({}) VALUES ({values})",
                cx.quoter.join(&names, ", ")
            )
        };

        let autoincr = table
            .auto_increment_column()
            .filter(|c| bean.is_zero_field(&c.field_path));
        let (affected, id) = match (autoincr, dialect.insert_id_strategy()) {
            (Some(column), InsertIdStrategy::Returning) => {
                sql.push_str(" RETURNING ");
                sql.push_str(&cx.quoter.quote(&column.name));
                let rows = self.query_sql(&sql, args).await?;
                let id = rows.scalar().and_then(SqlValue::as_i64);
                (rows.len() as u64, id)
            }
            (Some(_), InsertIdStrategy::Sequence) => {
                let result = self.exec_sql(&sql, args).await?;
                let id = match dialect.last_insert_id_sql(&table_name) {
                    Some(id_sql) => self
                        .query_sql(&id_sql, Vec::new())
                        .await?
                        .scalar()
                        .and_then(SqlValue::as_i64),
                    None => None,
                };
                (result.rows_affected, id)
            }
            _ => {
                let result = self.exec_sql(&sql, args).await?;
                (result.rows_affected, result.last_insert_id)
            }
        };

        if let (Some(column), Some(id)) = (autoincr, id) {
            bean.set_field(&column.field_path, SqlValue::Int(id), &cx.convert)?;
        }
        if let Some(cacher) = self.engine().cacher_for(&table) {
            cacher.clear_ids(&table.name);
        }
        self.queue_after(&*bean, T::after_insert);
        Ok(affected)
    }

    /// Inserts several records of one type in a single statement. Keys
    /// are written back where the backend reports them.
    ///
    /// # Errors
    ///
    /// Fails when a hook rejects a record or on driver errors.
    pub async fn insert_multi<T: Record>(&mut self, beans: &mut [T]) -> Result<u64> {
        let result = self.insert_multi_inner(beans).await;
        self.finish();
        result
    }

    async fn insert_multi_inner<T: Record>(&mut self, beans: &mut [T]) -> Result<u64> {
        self.check_open()?;
        if beans.is_empty() {
            return Ok(0);
        }
        let table = self.engine().table_info::<T>()?;
        let dialect = self.engine().dialect();
        if !dialect.supports_multi_insert() {
            let statement = self.statement.clone();
            let mut affected = 0;
            for bean in beans.iter_mut() {
                self.statement = statement.clone();
                affected += self.insert_inner(bean).await?;
            }
            return Ok(affected);
        }

        for bean in beans.iter_mut() {
            self.run_before_closures(&*bean);
            bean.before_insert().map_err(OrmError::Hook)?;
        }
        let cx = self.sql_cx(dialect.as_ref());
        let table_name = self.statement.table_name_for(&table).to_string();
        let slots = insert_slots(&self.statement, &table, &table_name, &beans[0], &cx, true);
        if slots.is_empty() {
            return Err(OrmError::NoContentFound);
        }
        let mut rows = Vec::with_capacity(beans.len());
        let mut args = Vec::new();
        for bean in beans.iter_mut() {
            let (values, row_args) = row_values(&self.statement, &slots, bean, cx.convert)?;
            rows.push(values);
            args.extend(row_args);
        }
        let names: Vec<&str> = slots.iter().map(|s| s.column.name.as_str()).collect();
        let mut sql = dialect.insert_multi(
            &cx.quote_table(&table_name),
            &cx.quoter.join(&names, ", "),
            &rows,
        );

        let autoincr = table
            .auto_increment_column()
            .filter(|c| !slots.iter().any(|s| s.column.name == c.name));
        let affected = match (autoincr, dialect.insert_id_strategy()) {
            (Some(column), InsertIdStrategy::Returning) => {
                sql.push_str(" RETURNING ");
                sql.push_str(&cx.quoter.quote(&column.name));
                let result = self.query_sql(&sql, args).await?;
                for (bean, row) in beans.iter_mut().zip(&result.rows) {
                    if let Some(id) = row.first().and_then(SqlValue::as_i64) {
                        bean.set_field(&column.field_path, SqlValue::Int(id), &cx.convert)?;
                    }
                }
                result.len() as u64
            }
            (Some(column), InsertIdStrategy::Driver) => {
                let result = self.exec_sql(&sql, args).await?;
                if let Some(reported) = result.last_insert_id {
                    let first = dialect.batch_first_insert_id(reported, beans.len());
                    write_ids(beans, column, first, cx.convert)?;
                }
                result.rows_affected
            }
            (Some(column), InsertIdStrategy::Sequence) => {
                let result = self.exec_sql(&sql, args).await?;
                if let Some(id_sql) = dialect.last_insert_id_sql(&table_name) {
                    let last = self
                        .query_sql(&id_sql, Vec::new())
                        .await?
                        .scalar()
                        .and_then(SqlValue::as_i64);
                    if let Some(last) = last {
                        let first = dialect.batch_first_insert_id(last, beans.len());
                        write_ids(beans, column, first, cx.convert)?;
                    }
                }
                result.rows_affected
            }
            _ => self.exec_sql(&sql, args).await?.rows_affected,
        };

        if let Some(cacher) = self.engine().cacher_for(&table) {
            cacher.clear_ids(&table.name);
        }
        for bean in beans.iter() {
            self.queue_after(bean, T::after_insert);
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use oxide_sql_core::{DbType, TableParser};
    use oxide_sql_derive::Record;

    use super::*;

    #[derive(Debug, Clone, Default, Record)]
    struct User {
        #[orm("pk autoincr")]
        id: i64,
        name: String,
    }

    fn slot_sql(db: DbType, multi: bool) -> Vec<String> {
        let table = TableParser::default().parse(User::descriptor()).unwrap();
        let dialect = db.dialect();
        let cx = SqlCx::new(dialect.as_ref(), dialect.quoter(), ConvertContext::default());
        let statement = Statement::default();
        insert_slots(&statement, &table, "user", &User::default(), &cx, multi)
            .iter()
            .map(|slot| {
                slot.expr
                    .clone()
                    .unwrap_or_else(|| format!("?{}", slot.column.name))
            })
            .collect()
    }

    #[test]
    fn test_oracle_sequence_key_only_in_single_insert() {
        assert_eq!(slot_sql(DbType::Oracle, false), ["seq_user.nextval", "?name"]);
        assert_eq!(slot_sql(DbType::Oracle, true), ["?name"]);
        assert_eq!(slot_sql(DbType::Sqlite, true), ["?name"]);
    }

    #[test]
    fn test_oracle_insert_all_has_no_nextval() {
        let table = TableParser::default().parse(User::descriptor()).unwrap();
        let dialect = DbType::Oracle.dialect();
        let cx = SqlCx::new(dialect.as_ref(), dialect.quoter(), ConvertContext::default());
        let statement = Statement::default();
        let mut beans = vec![
            User {
                name: "a".into(),
                ..User::default()
            },
            User {
                name: "b".into(),
                ..User::default()
            },
        ];
        let slots = insert_slots(&statement, &table, "user", &beans[0], &cx, true);
        let mut rows = Vec::new();
        for bean in &mut beans {
            rows.push(row_values(&statement, &slots, bean, cx.convert).unwrap().0);
        }
        let names: Vec<&str> = slots.iter().map(|s| s.column.name.as_str()).collect();
        let sql = dialect.insert_multi(&cx.quote_table("user"), &cx.quoter.join(&names, ", "), &rows);
        assert_eq!(
            sql,
            "INSERT ALL INTO \"user\" (\"name\") VALUES (?) INTO \"user\" (\"name\") VALUES (?) \
             SELECT 1 FROM DUAL"
        );
    }

    #[test]
    fn test_write_ids_is_consecutive() {
        let mut beans = vec![User::default(), User::default(), User::default()];
        let table = TableParser::default().parse(User::descriptor()).unwrap();
        let column = table.auto_increment_column().unwrap();
        write_ids(&mut beans, column, 7, ConvertContext::default()).unwrap();
        let ids: Vec<i64> = beans.iter().map(|b| b.id).collect();
        assert_eq!(ids, [7, 8, 9]);
    }
}
