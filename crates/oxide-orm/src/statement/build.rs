//! SQL generation from builder state.

use oxide_sql_core::dialect::{Page, SelectParts};
use oxide_sql_core::{
    Column, ColumnCodec, ConvertContext, DbType, FieldKind, Pk, Quoter, Record, SqlValue, Table,
};

use super::{Cond, Order, SqlCx, Statement};
use crate::error::{OrmError, Result};

/// A SELECT ready for [`Dialect::render_select`](oxide_sql_core::Dialect::render_select).
#[derive(Debug, Clone)]
pub(crate) struct SelectPlan {
    pub parts: SelectParts,
    pub page: Option<Page>,
    pub args: Vec<SqlValue>,
}

impl SelectPlan {
    pub(crate) fn sql(&self, cx: &SqlCx<'_>) -> String {
        cx.dialect.render_select(&self.parts, self.page)
    }

    /// The same query projecting only the primary key.
    pub(crate) fn pk_only(&self, table: &Table, q: &Quoter) -> Self {
        let mut plan = self.clone();
        plan.parts.columns = q.join(&table.primary_keys, ", ");
        plan
    }
}

/// Conversion context of one column; `utc` columns are stored as UTC.
pub(crate) fn column_cx(convert: ConvertContext, column: &Column) -> ConvertContext {
    if column.utc {
        convert.with_utc_storage()
    } else {
        convert
    }
}

fn prefixed(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) if !name.contains('.') && !name.contains('(') => format!("{p}.{name}"),
        _ => name.to_string(),
    }
}

/// Converts textual ids into the integer form of integer key columns.
fn coerce_key(column: &Column, value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(text) if column.sql_type.is_integer() => match text.trim().parse::<i64>() {
            Ok(n) => SqlValue::Int(n),
            Err(_) => SqlValue::Text(text),
        },
        other => other,
    }
}

/// `WHERE` equalities on every primary-key column.
pub(crate) fn pk_cond(table: &Table, pk: &Pk, prefix: Option<&str>) -> Result<Cond> {
    if pk.len() != table.primary_keys.len() {
        return Err(OrmError::IdCondition {
            expected: table.primary_keys.len(),
            got: pk.len(),
        });
    }
    Ok(Cond::And(
        table
            .pk_columns()
            .zip(pk.values())
            .map(|(column, value)| {
                Cond::eq(&prefixed(prefix, &column.name), coerce_key(column, value.clone()))
            })
            .collect(),
    ))
}

/// `SELECT <all readable columns> FROM <table> WHERE <pk>`.
pub(crate) fn select_by_pk(
    table: &Table,
    table_name: &str,
    pk: &Pk,
    cx: &SqlCx<'_>,
) -> Result<(String, Vec<SqlValue>)> {
    let q = &cx.quoter;
    let columns: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| c.is_readable())
        .map(|c| c.name.as_str())
        .collect();
    let mut args = Vec::new();
    let cond = pk_cond(table, pk, None)?.render(q, &mut args);
    let sql = format!(
        "SELECT {} FROM {} WHERE {cond}",
        q.join(&columns, ", "),
        cx.quote_table(table_name)
    );
    Ok((sql, args))
}

impl Statement {
    /// Physical table name: the override, or the mapped name.
    pub(crate) fn table_name_for<'t>(&'t self, table: &'t Table) -> &'t str {
        self.table.as_deref().unwrap_or(&table.name)
    }

    /// Qualifier for column names once joins are present.
    fn column_prefix(&self, table: &Table) -> Option<String> {
        if self.joins.is_empty() {
            return None;
        }
        Some(
            self.alias
                .clone()
                .unwrap_or_else(|| self.table_name_for(table).to_string()),
        )
    }

    fn from_clause(&self, table_name: &str, cx: &SqlCx<'_>) -> String {
        let mut from = cx.quote_table(table_name);
        if let Some(alias) = &self.alias {
            let keyword = if cx.dialect.db_type() == DbType::Oracle {
                " "
            } else {
                " AS "
            };
            from.push_str(keyword);
            from.push_str(&cx.quoter.quote(alias));
        }
        from
    }

    fn join_clause(&self, cx: &SqlCx<'_>, args: &mut Vec<SqlValue>) -> String {
        let mut sql = String::new();
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.op.trim());
            sql.push_str(" JOIN ");
            sql.push_str(&cx.quote_table(&join.table));
            if let Some(alias) = &join.alias {
                sql.push(' ');
                sql.push_str(&cx.quoter.quote(alias));
            }
            sql.push_str(" ON ");
            sql.push_str(&cx.quoter.replace(&join.on));
            args.extend(join.args.iter().cloned());
        }
        sql
    }

    /// One condition per non-zero field of `bean`.
    ///
    /// JSON columns, engine-managed time columns and the soft-delete column
    /// never take part; bool columns only when named by `use_bool` or
    /// `must_cols`.
    pub(crate) fn bean_conds<T: Record>(
        &self,
        table: &Table,
        bean: &T,
        cx: &SqlCx<'_>,
        prefix: Option<&str>,
    ) -> Result<Vec<Cond>> {
        let filter = &self.columns;
        let mut conds = Vec::new();
        for column in &table.columns {
            if matches!(column.codec, ColumnCodec::Json | ColumnCodec::Embedded)
                || column.is_time_role()
                || !column.is_readable()
            {
                continue;
            }
            let must = filter.is_must(&column.name);
            let include = if column.kind == FieldKind::Bool {
                must || filter.uses_bool(&column.name)
            } else {
                must || !bean.is_zero_field(&column.field_path)
            };
            if !include {
                continue;
            }
            let value = bean.get_field(&column.field_path, &column_cx(cx.convert, column))?;
            let value = cx.convert.normalize(value);
            let name = prefixed(prefix, &column.name);
            conds.push(if value.is_null() {
                Cond::is_null(&name)
            } else {
                Cond::eq(&name, value)
            });
        }
        Ok(conds)
    }

    /// Full WHERE tree: id, condition bean, explicit conditions and the
    /// soft-delete filter.
    pub(crate) fn where_cond<T: Record>(
        &self,
        table: &Table,
        bean: Option<&T>,
        cx: &SqlCx<'_>,
    ) -> Result<Option<Cond>> {
        let prefix = self.column_prefix(table);
        let prefix = prefix.as_deref();
        let mut items = Vec::new();
        if let Some(id) = &self.id {
            items.push(pk_cond(table, id, prefix)?);
        }
        if let Some(bean) = bean.filter(|_| !self.no_auto_condition) {
            items.extend(self.bean_conds(table, bean, cx, prefix)?);
        }
        if let Some(cond) = self.cond.as_ref().filter(|c| !c.is_empty()) {
            items.push(cond.clone());
        }
        if let Some(deleted) = table.deleted_column().filter(|_| !self.unscoped) {
            items.push(Cond::is_null(&prefixed(prefix, &deleted.name)));
        }
        Ok((!items.is_empty()).then(|| Cond::And(items)))
    }

    fn projection(&self, table: &Table, q: &Quoter, prefix: Option<&str>) -> String {
        if let Some(select) = &self.select {
            return q.replace(select);
        }
        let names: Vec<String> = match &self.distinct {
            Some(columns) if !columns.is_empty() => columns.clone(),
            _ if !self.columns.cols.is_empty() => self.columns.cols.clone(),
            _ => table
                .columns
                .iter()
                .filter(|c| c.is_readable() && !self.columns.is_excluded(&c.name))
                .map(|c| c.name.clone())
                .collect(),
        };
        if names.is_empty() {
            return "*".to_string();
        }
        names
            .iter()
            .map(|n| q.quote(&prefixed(prefix, n)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn order_clause(&self, q: &Quoter) -> Option<String> {
        if self.order_by.is_empty() {
            return None;
        }
        Some(
            self.order_by
                .iter()
                .map(|order| match order {
                    Order::Raw(sql) => q.replace(sql),
                    Order::Asc(column) => format!("{} ASC", q.quote(column)),
                    Order::Desc(column) => format!("{} DESC", q.quote(column)),
                })
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// The SELECT of a typed query.
    pub(crate) fn select_plan<T: Record>(
        &self,
        table: &Table,
        bean: Option<&T>,
        cx: &SqlCx<'_>,
    ) -> Result<SelectPlan> {
        let q = &cx.quoter;
        let table_name = self.table_name_for(table);
        let prefix = self.column_prefix(table);
        let mut args = Vec::new();
        let joins = self.join_clause(cx, &mut args);
        let where_clause = self
            .where_cond(table, bean, cx)?
            .map(|cond| cond.render(q, &mut args))
            .filter(|sql| !sql.is_empty());
        let group_by = self.group_by.as_ref().map(|g| {
            g.split(',')
                .map(|c| q.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        });
        let default_order = if table.primary_keys.is_empty() {
            table
                .indexes
                .iter()
                .find_map(|index| index.columns.first())
                .map(|column| q.quote(&prefixed(prefix.as_deref(), column)))
        } else {
            Some(
                table
                    .primary_keys
                    .iter()
                    .map(|pk| q.quote(&prefixed(prefix.as_deref(), pk)))
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        };
        let parts = SelectParts {
            distinct: self.distinct.is_some(),
            columns: self.projection(table, q, prefix.as_deref()),
            table: self.from_clause(table_name, cx),
            joins,
            where_clause,
            group_by,
            having: self.having.as_ref().map(|h| q.replace(h)),
            order_by: self.order_clause(q),
            for_update: self.for_update,
            default_order,
        };
        if let Some(page) = self.page {
            if parts.for_update && !cx.dialect.locks_paged_select(&parts, page) {
                return Err(OrmError::LockedPaging);
            }
        }
        Ok(SelectPlan {
            parts,
            page: self.page,
            args,
        })
    }

    /// `SELECT count(*) ...` over the same rows a find would return.
    pub(crate) fn count_sql<T: Record>(
        &self,
        table: &Table,
        bean: Option<&T>,
        cx: &SqlCx<'_>,
    ) -> Result<(String, Vec<SqlValue>)> {
        let plan = self.select_plan(table, bean, cx)?;
        let sql = if plan.parts.group_by.is_some() || plan.parts.distinct {
            let mut inner = plan.parts.clone();
            inner.order_by = None;
            format!("SELECT count(*) FROM ({}) sub", inner.plain(None, ""))
        } else {
            format!("SELECT count(*) {}", plan.parts.body(""))
        };
        Ok((sql, plan.args))
    }

    /// `SELECT COALESCE(sum(c), 0), ...` for each column.
    pub(crate) fn sum_sql<T: Record>(
        &self,
        table: &Table,
        bean: Option<&T>,
        columns: &[&str],
        cx: &SqlCx<'_>,
    ) -> Result<(String, Vec<SqlValue>)> {
        if columns.is_empty() {
            return Err(OrmError::ParamsType("sum needs at least one column".into()));
        }
        let plan = self.select_plan(table, bean, cx)?;
        let sums: Vec<String> = columns
            .iter()
            .map(|c| format!("COALESCE(sum({}),0)", cx.quoter.quote(c)))
            .collect();
        Ok((
            format!("SELECT {} {}", sums.join(", "), plan.parts.body("")),
            plan.args,
        ))
    }

    /// Whether a typed query may go through the cache.
    pub(crate) fn cacheable(&self, table: &Table) -> bool {
        !table.primary_keys.is_empty()
            && !self.no_cache
            && self.raw.is_none()
            && self.table.is_none()
            && self.joins.is_empty()
            && !self.for_update
            && self.select.is_none()
            && self.distinct.is_none()
            && self.group_by.is_none()
            && self.having.is_none()
            && self.columns.cols.is_empty()
            && self.columns.omit.is_empty()
            && !(self.unscoped && table.deleted.is_some())
    }
}
