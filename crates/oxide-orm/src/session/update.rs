//! UPDATE.

use oxide_sql_core::{Column, FieldKind, Pk, Record, SqlValue, Table};

use super::insert::auto_time;
use super::Session;
use crate::error::{OrmError, Result};
use crate::statement::build::{column_cx, pk_cond};
use crate::statement::{Cond, SqlCx, Statement};

/// Whether the column takes part in the SET list.
fn wants_column<T: Record>(statement: &Statement, column: &Column, bean: &T) -> bool {
    let filter = &statement.columns;
    if filter.is_excluded(&column.name) {
        return false;
    }
    if !filter.cols.is_empty() || filter.all_cols || filter.is_must(&column.name) {
        return true;
    }
    if !bean.is_zero_field(&column.field_path) {
        return true;
    }
    (column.nullable && filter.is_nullable(&column.name))
        || (column.kind == FieldKind::Bool && filter.uses_bool(&column.name))
}

/// Primary key of `bean` when every key field is set.
fn known_pk<T: Record>(table: &Table, bean: &T, cx: &SqlCx<'_>) -> Result<Option<Pk>> {
    if table.primary_keys.is_empty()
        || table.pk_columns().any(|c| bean.is_zero_field(&c.field_path))
    {
        return Ok(None);
    }
    Ok(Some(bean.pk_at(&table.pk_paths(), &cx.convert)?))
}

impl Session {
    /// Updates rows from the fields of `bean`.
    ///
    /// Only non-zero fields are written unless `cols`, `all_cols`,
    /// `must_cols`, `nullable` or `use_bool` say otherwise. Without `id`,
    /// `where_` or a condition, the non-zero primary key of `bean` selects
    /// the row. Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// [`OrmError::NoContentFound`] when nothing would be set,
    /// [`OrmError::OptimisticLock`] when a versioned update matched no row.
    pub async fn update<T: Record>(&mut self, bean: &mut T) -> Result<u64> {
        let result = self.update_inner(bean, None).await;
        self.finish();
        result
    }

    /// Like [`update`](Self::update), with the non-zero fields of `cond` as
    /// the condition.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn update_with<T: Record>(&mut self, bean: &mut T, cond: &T) -> Result<u64> {
        let result = self.update_inner(bean, Some(cond)).await;
        self.finish();
        result
    }

    async fn update_inner<T: Record>(&mut self, bean: &mut T, cond: Option<&T>) -> Result<u64> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        self.run_before_closures(&*bean);
        bean.before_update().map_err(OrmError::Hook)?;

        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let q = &cx.quoter;
        let st = &self.statement;
        let version = table.version_column().filter(|_| !st.no_versioning);
        let modified = |name: &str| {
            st.incr
                .iter()
                .chain(&st.decr)
                .map(|(c, _)| c)
                .chain(st.exprs.iter().map(|(c, _)| c))
                .any(|c| c.eq_ignore_ascii_case(name))
        };

        let mut sets = Vec::new();
        let mut args = Vec::new();
        for column in &table.columns {
            if column.is_primary_key
                || column.is_created
                || column.is_deleted
                || column.is_auto_increment
                || !column.is_writable()
                || (column.is_version && version.is_some())
                || modified(&column.name)
            {
                continue;
            }
            let ccx = column_cx(cx.convert, column);
            if column.is_updated && !st.no_auto_time {
                let now = auto_time(cx.convert, column);
                bean.set_field(&column.field_path, now.clone(), &ccx)?;
                sets.push(format!("{}=?", q.quote(&column.name)));
                args.push(now);
                continue;
            }
            if !wants_column(st, column, &*bean) {
                continue;
            }
            let value = if column.nullable
                && st.columns.is_nullable(&column.name)
                && bean.is_zero_field(&column.field_path)
            {
                SqlValue::Null
            } else {
                ccx.normalize(bean.get_field(&column.field_path, &ccx)?)
            };
            sets.push(format!("{}=?", q.quote(&column.name)));
            args.push(value);
        }
        for (op, list) in [("+", &st.incr), ("-", &st.decr)] {
            for (name, value) in list {
                let quoted = q.quote(name);
                sets.push(format!("{quoted}={quoted}{op}?"));
                args.push(value.clone());
            }
        }
        for (name, expr) in &st.exprs {
            sets.push(format!("{}={}", q.quote(name), q.replace(expr)));
        }
        if sets.is_empty() {
            return Err(OrmError::NoContentFound);
        }

        let mut where_cond = st.where_cond(&table, cond, &cx)?;
        let mut pk = None;
        if !st.has_condition() && cond.is_none() {
            pk = known_pk(&table, &*bean, &cx)?;
            if let Some(pk) = &pk {
                let by_pk = pk_cond(&table, pk, None)?;
                where_cond = Some(match where_cond {
                    Some(c) => c.and(by_pk),
                    None => by_pk,
                });
            }
        }
        if let Some(column) = version {
            let current = bean.get_field(&column.field_path, &cx.convert)?;
            let quoted = q.quote(&column.name);
            sets.push(format!("{quoted}={quoted}+1"));
            let check = Cond::eq(&column.name, current);
            where_cond = Some(match where_cond {
                Some(c) => c.and(check),
                None => check,
            });
        }

        let table_name = st.table_name_for(&table).to_string();
        let mut sql = format!("UPDATE {} SET {}", cx.quote_table(&table_name), sets.join(", "));
        if let Some(cond) = where_cond {
            let rendered = cond.render(q, &mut args);
            if !rendered.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&rendered);
            }
        }

        let affected = self.exec_sql(&sql, args).await?.rows_affected;
        if let Some(column) = version {
            if affected == 0 {
                return Err(OrmError::OptimisticLock);
            }
            let next = bean
                .get_field(&column.field_path, &cx.convert)?
                .as_i64()
                .unwrap_or(0)
                + 1;
            bean.set_field(&column.field_path, SqlValue::Int(next), &cx.convert)?;
        }

        if let Some(cacher) = self.engine().cacher_for(&table) {
            match pk {
                Some(pk) => cacher.del_bean(&table.name, &pk.key_string()),
                None => cacher.clear_beans(&table.name),
            }
            cacher.clear_ids(&table.name);
        }
        self.queue_after(&*bean, T::after_update);
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use oxide_sql_core::TableParser;
    use oxide_sql_derive::Record;

    use super::*;
    use crate::statement::split_names;

    #[derive(Debug, Clone, Default, Record)]
    struct Profile {
        #[orm("pk autoincr")]
        id: i64,
        nick: String,
        score: i32,
        verified: bool,
        bio: Option<String>,
    }

    fn column_names(st: &Statement, bean: &Profile) -> Vec<String> {
        let table = TableParser::default().parse(Profile::descriptor()).unwrap();
        table
            .columns
            .iter()
            .filter(|c| !c.is_primary_key && wants_column(st, c, bean))
            .map(|c| c.name.clone())
            .collect()
    }

    #[test]
    fn test_zero_fields_are_skipped() {
        let bean = Profile {
            nick: "x".into(),
            ..Profile::default()
        };
        assert_eq!(column_names(&Statement::default(), &bean), vec!["nick"]);
    }

    #[test]
    fn test_column_overrides() {
        let bean = Profile::default();
        let mut st = Statement::default();
        st.columns.must = split_names(&["score"]);
        st.columns.nullable = split_names(&["bio"]);
        st.columns.use_bool = Some(Vec::new());
        assert_eq!(column_names(&st, &bean), vec!["score", "verified", "bio"]);

        let mut st = Statement::default();
        st.columns.all_cols = true;
        st.columns.omit = split_names(&["nick"]);
        assert_eq!(column_names(&st, &bean), vec!["score", "verified", "bio"]);
    }
}
