//! Row materialization.

use oxide_sql_core::{ConvertContext, Pk, Record, RecordDescriptor, SqlValue, Table};

use super::Session;
use crate::driver::Rows;
use crate::error::{OrmError, Result};
use crate::statement::build::{column_cx, select_by_pk};

/// A cascade field waiting for its related row.
pub(crate) struct PendingCascade {
    path: String,
    key: SqlValue,
    related: fn() -> &'static RecordDescriptor,
}

/// Table column index for each result column. Columns are matched
/// case-insensitively; a table column only takes the first result column
/// carrying its name.
pub(crate) fn column_mapping(table: &Table, columns: &[String]) -> Vec<Option<usize>> {
    let mut seen = vec![false; table.columns.len()];
    columns
        .iter()
        .map(|name| {
            let name = name.rsplit('.').next().unwrap_or(name);
            let idx = table
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))?;
            if seen[idx] || !table.columns[idx].is_readable() {
                return None;
            }
            seen[idx] = true;
            Some(idx)
        })
        .collect()
}

/// Fills a fresh record from one row, running the per-column hooks.
///
/// Cascade fields are only collected when `cascade` is set; `after_load`
/// is left to the caller.
pub(crate) fn scan_values<T: Record>(
    table: &Table,
    mapping: &[Option<usize>],
    values: Vec<SqlValue>,
    convert: ConvertContext,
    cascade: bool,
) -> Result<(T, Vec<PendingCascade>)> {
    let mut bean = T::default();
    let mut pending = Vec::new();
    for (value, idx) in values.into_iter().zip(mapping) {
        let Some(column) = idx.map(|i| &table.columns[i]) else {
            continue;
        };
        bean.before_set(&column.name, &value);
        match column.cascade {
            Some(related) if cascade && !value.is_null() => pending.push(PendingCascade {
                path: column.field_path.clone(),
                key: value.clone(),
                related,
            }),
            // Without cascading, a related record only carries its key.
            _ => bean.set_field(&column.field_path, value.clone(), &column_cx(convert, column))?,
        }
        bean.after_set(&column.name, &value);
    }
    Ok((bean, pending))
}

impl Session {
    pub(crate) fn cascade_enabled(&self) -> bool {
        self.statement
            .cascade
            .unwrap_or_else(|| self.engine().cascade_default())
    }

    /// Materializes every row, loading cascade fields first.
    pub(crate) async fn scan_rows<T: Record>(&mut self, table: &Table, rows: Rows) -> Result<Vec<T>> {
        let mapping = column_mapping(table, &rows.columns);
        let cascade = self.cascade_enabled();
        let convert = self.engine().convert_context();
        let mut beans = Vec::with_capacity(rows.len());
        for values in rows.rows {
            let (mut bean, pending) = scan_values::<T>(table, &mapping, values, convert, cascade)?;
            for item in pending {
                self.load_cascade(&mut bean, item).await?;
            }
            bean.after_load();
            beans.push(bean);
        }
        Ok(beans)
    }

    async fn load_cascade<T: Record>(&mut self, bean: &mut T, item: PendingCascade) -> Result<()> {
        let related = self.engine().table_info_of((item.related)())?;
        if related.primary_keys.len() != 1 {
            return Err(OrmError::UnsupportedCascade(related.name.clone()));
        }
        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let (sql, args) = select_by_pk(&related, &related.name, &Pk::from(item.key), &cx)?;
        let rows = self.query_sql(&sql, args).await?;
        let Some(values) = rows.rows.into_iter().next() else {
            return Ok(());
        };
        let pairs: Vec<(String, SqlValue)> = rows
            .columns
            .iter()
            .zip(values)
            .filter_map(|(name, value)| related.column(name).map(|c| (c.field_path.clone(), value)))
            .collect();
        bean.set_related(&item.path, &pairs, &cx.convert)?;
        Ok(())
    }
}
