//! DELETE, physical or soft.

use oxide_sql_core::{Pk, Record};

use super::insert::auto_time;
use super::Session;
use crate::error::{OrmError, Result};
use crate::statement::build::column_cx;

impl Session {
    /// Deletes the rows matching `bean` and the statement's conditions.
    ///
    /// Tables with a `deleted` column get the column stamped instead,
    /// unless [`unscoped`](Self::unscoped) is set. Returns the number of
    /// affected rows.
    ///
    /// # Errors
    ///
    /// [`OrmError::NeedDeletedCond`] when no condition applies.
    pub async fn delete<T: Record>(&mut self, bean: &mut T) -> Result<u64> {
        let result = self.delete_inner(bean).await;
        self.finish();
        result
    }

    async fn delete_inner<T: Record>(&mut self, bean: &mut T) -> Result<u64> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        self.run_before_closures(&*bean);
        bean.before_delete().map_err(OrmError::Hook)?;

        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let st = &self.statement;
        let from_bean = !st.no_auto_condition && !st.bean_conds(&table, &*bean, &cx, None)?.is_empty();
        if !from_bean && !st.has_condition() {
            return Err(OrmError::NeedDeletedCond);
        }

        let table_name = cx.quote_table(st.table_name_for(&table));
        let mut args = Vec::new();
        let mut sql = match table.deleted_column().filter(|_| !st.unscoped) {
            Some(column) => {
                let now = auto_time(cx.convert, column);
                bean.set_field(&column.field_path, now.clone(), &column_cx(cx.convert, column))?;
                args.push(now);
                format!("UPDATE {table_name} SET {}=?", cx.quoter.quote(&column.name))
            }
            None => format!("DELETE FROM {table_name}"),
        };
        if let Some(cond) = st.where_cond(&table, Some(&*bean), &cx)? {
            let rendered = cond.render(&cx.quoter, &mut args);
            if !rendered.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&rendered);
            }
        }
        let pk: Option<Pk> = match &st.id {
            Some(_) => None,
            None if table.pk_columns().all(|c| !bean.is_zero_field(&c.field_path))
                && !table.primary_keys.is_empty() =>
            {
                Some(bean.pk_at(&table.pk_paths(), &cx.convert)?)
            }
            None => None,
        };

        let affected = self.exec_sql(&sql, args).await?.rows_affected;
        if let Some(cacher) = self.engine().cacher_for(&table) {
            match pk {
                Some(pk) => cacher.del_bean(&table.name, &pk.key_string()),
                None => cacher.clear_beans(&table.name),
            }
            cacher.clear_ids(&table.name);
        }
        self.queue_after(&*bean, T::after_delete);
        Ok(affected)
    }
}
