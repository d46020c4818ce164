//! Typed read operations.

use std::collections::HashMap;
use std::sync::Arc;

use oxide_sql_core::dialect::Page;
use oxide_sql_core::{Pk, Record, SqlValue, Table};

use super::Session;
use crate::cache::{sql_key, Cacher};
use crate::error::{OrmError, Result};
use crate::statement::build::select_by_pk;
use crate::statement::{SelectPlan, SqlCx};

fn to_count(value: Option<&SqlValue>) -> u64 {
    value
        .and_then(SqlValue::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

impl Session {
    /// Rows of the current statement, through the cache when possible.
    pub(crate) async fn find_rows<T: Record>(&mut self, bean: Option<&T>) -> Result<Vec<T>> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        if let Some((sql, args)) = self.statement.raw.clone() {
            let rows = self.query_sql(&sql, args).await?;
            return self.scan_rows(&table, rows).await;
        }
        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let plan = self.statement.select_plan(&table, bean, &cx)?;
        if self.statement.cacheable(&table) {
            if let Some(cacher) = self.engine().cacher_for(&table) {
                match self.find_cached::<T>(&table, &plan, &cx, cacher.as_ref()).await {
                    Err(OrmError::CacheFailed) => {}
                    other => return other,
                }
            }
        }
        let rows = self.query_sql(&plan.sql(&cx), plan.args).await?;
        self.scan_rows(&table, rows).await
    }

    /// Resolves the query as a primary-key list, then each key through the
    /// bean cache.
    async fn find_cached<T: Record>(
        &mut self,
        table: &Table,
        plan: &SelectPlan,
        cx: &SqlCx<'_>,
        cacher: &dyn Cacher,
    ) -> Result<Vec<T>> {
        let ids_plan = plan.pk_only(table, &cx.quoter);
        let ids_sql = ids_plan.sql(cx);
        let key = sql_key(&ids_sql, &ids_plan.args);
        let ids = if let Some(ids) = cacher.get_ids(&table.name, &key) {
            ids
        } else {
            let rows = self.query_sql(&ids_sql, ids_plan.args).await?;
            let ids: Vec<Pk> = rows
                .rows
                .into_iter()
                .map(|row| Pk::new(row.into_iter().map(|v| cx.convert.normalize(v)).collect()))
                .collect();
            cacher.put_ids(&table.name, &key, ids.clone());
            ids
        };

        let mut beans = Vec::with_capacity(ids.len());
        for id in ids {
            let bean_key = id.key_string();
            let cached = cacher
                .get_bean(&table.name, &bean_key)
                .and_then(|bean| bean.downcast_ref::<T>().cloned());
            if let Some(bean) = cached {
                beans.push(bean);
                continue;
            }
            let (sql, args) = select_by_pk(table, &table.name, &id, cx)?;
            let rows = self.query_sql(&sql, args).await?;
            let Some(bean) = self.scan_rows::<T>(table, rows).await?.into_iter().next() else {
                // The id list is stale.
                cacher.del_ids(&table.name, &key);
                return Err(OrmError::CacheFailed);
            };
            cacher.put_bean(&table.name, &bean_key, Arc::new(bean.clone()));
            beans.push(bean);
        }
        Ok(beans)
    }

    /// Fetches one row into `bean`, using its non-zero fields as
    /// conditions. Returns whether a row was found; `bean` is untouched
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Fails on driver, conversion or id-arity errors.
    pub async fn get<T: Record>(&mut self, bean: &mut T) -> Result<bool> {
        let result = self.get_inner(bean).await;
        self.finish();
        result
    }

    async fn get_inner<T: Record>(&mut self, bean: &mut T) -> Result<bool> {
        if self.statement.raw.is_none() {
            let offset = self.statement.page.map_or(0, |p| p.offset);
            self.statement.page = Some(Page { limit: 1, offset });
        }
        let found = self.find_rows::<T>(Some(&*bean)).await?;
        match found.into_iter().next() {
            Some(row) => {
                *bean = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All rows matching the statement.
    ///
    /// # Errors
    ///
    /// Fails on driver or conversion errors.
    pub async fn find<T: Record>(&mut self) -> Result<Vec<T>> {
        let result = self.find_rows::<T>(None).await;
        self.finish();
        result
    }

    /// All rows matching the statement and the non-zero fields of `cond`.
    ///
    /// # Errors
    ///
    /// Fails on driver or conversion errors.
    pub async fn find_by<T: Record>(&mut self, cond: &T) -> Result<Vec<T>> {
        let result = self.find_rows::<T>(Some(cond)).await;
        self.finish();
        result
    }

    /// Matching rows keyed by primary key.
    ///
    /// # Errors
    ///
    /// Fails on driver or conversion errors.
    pub async fn find_map<T: Record>(&mut self) -> Result<HashMap<Pk, T>> {
        let result = self.find_map_inner::<T>().await;
        self.finish();
        result
    }

    async fn find_map_inner<T: Record>(&mut self) -> Result<HashMap<Pk, T>> {
        let table = self.engine().table_info::<T>()?;
        let convert = self.engine().convert_context();
        let paths = table.pk_paths();
        let beans = self.find_rows::<T>(None).await?;
        let mut map = HashMap::with_capacity(beans.len());
        for bean in beans {
            map.insert(bean.pk_at(&paths, &convert)?, bean);
        }
        Ok(map)
    }

    /// One page of rows plus the number of rows matching without paging.
    ///
    /// # Errors
    ///
    /// Fails on driver or conversion errors.
    pub async fn find_and_count<T: Record>(&mut self) -> Result<(Vec<T>, u64)> {
        let statement = self.statement.clone();
        let result = match self.find_rows::<T>(None).await {
            Ok(beans) => {
                self.statement = statement;
                self.statement.page = None;
                self.statement.order_by.clear();
                self.count_inner::<T>(None).await.map(|n| (beans, n))
            }
            Err(e) => Err(e),
        };
        self.finish();
        result
    }

    /// Number of rows matching the statement.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn count<T: Record>(&mut self) -> Result<u64> {
        let result = self.count_inner::<T>(None).await;
        self.finish();
        result
    }

    /// Number of rows matching the statement and the non-zero fields of
    /// `cond`.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn count_by<T: Record>(&mut self, cond: &T) -> Result<u64> {
        let result = self.count_inner(Some(cond)).await;
        self.finish();
        result
    }

    async fn count_inner<T: Record>(&mut self, bean: Option<&T>) -> Result<u64> {
        self.check_open()?;
        let (sql, args) = if let Some(raw) = self.statement.raw.clone() {
            raw
        } else {
            let table = self.engine().table_info::<T>()?;
            let dialect = self.engine().dialect();
            let cx = self.sql_cx(dialect.as_ref());
            self.statement.count_sql(&table, bean, &cx)?
        };
        let rows = self.query_sql(&sql, args).await?;
        Ok(to_count(rows.scalar()))
    }

    /// Whether any row matches the statement.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn exist<T: Record>(&mut self) -> Result<bool> {
        let result = self.exist_inner::<T>(None).await;
        self.finish();
        result
    }

    /// Whether any row matches the statement and the non-zero fields of
    /// `cond`.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn exist_by<T: Record>(&mut self, cond: &T) -> Result<bool> {
        let result = self.exist_inner(Some(cond)).await;
        self.finish();
        result
    }

    async fn exist_inner<T: Record>(&mut self, bean: Option<&T>) -> Result<bool> {
        self.check_open()?;
        let (sql, args) = if let Some(raw) = self.statement.raw.clone() {
            raw
        } else {
            let table = self.engine().table_info::<T>()?;
            let dialect = self.engine().dialect();
            let cx = self.sql_cx(dialect.as_ref());
            self.statement.page = Some(Page {
                limit: 1,
                offset: 0,
            });
            let plan = self.statement.select_plan(&table, bean, &cx)?;
            (plan.sql(&cx), plan.args)
        };
        Ok(!self.query_sql(&sql, args).await?.is_empty())
    }

    /// Sum of one column over the matching rows.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn sum<T: Record>(&mut self, column: &str) -> Result<f64> {
        let result = self.sums_inner::<T>(&[column]).await;
        self.finish();
        result.map(|sums| sums.first().copied().unwrap_or(0.0))
    }

    /// Sums of several columns.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or an empty column list.
    pub async fn sums<T: Record>(&mut self, columns: &[&str]) -> Result<Vec<f64>> {
        let result = self.sums_inner::<T>(columns).await;
        self.finish();
        result
    }

    /// Integer sum of one column.
    ///
    /// # Errors
    ///
    /// Fails on driver errors.
    pub async fn sum_int<T: Record>(&mut self, column: &str) -> Result<i64> {
        let result = self.sum_values::<T>(&[column]).await;
        self.finish();
        Ok(result?
            .first()
            .and_then(SqlValue::as_i64)
            .unwrap_or_default())
    }

    async fn sums_inner<T: Record>(&mut self, columns: &[&str]) -> Result<Vec<f64>> {
        let values = self.sum_values::<T>(columns).await?;
        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or_default())
            .collect())
    }

    async fn sum_values<T: Record>(&mut self, columns: &[&str]) -> Result<Vec<SqlValue>> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        let dialect = self.engine().dialect();
        let cx = self.sql_cx(dialect.as_ref());
        let (sql, args) = self.statement.sum_sql::<T>(&table, None, columns, &cx)?;
        let rows = self.query_sql(&sql, args).await?;
        Ok(rows.rows.into_iter().next().unwrap_or_default())
    }

    /// Calls `f` with each matching row and its index; an error from `f`
    /// stops the iteration.
    ///
    /// With a [`buffer_size`](Self::buffer_size) rows are fetched in pages
    /// of that size, otherwise in one query.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or with the first error returned by `f`.
    pub async fn iterate<T, F>(&mut self, mut f: F) -> Result<()>
    where
        T: Record,
        F: FnMut(usize, T) -> Result<()> + Send,
    {
        let result = self.iterate_inner::<T, F>(&mut f).await;
        self.finish();
        result
    }

    async fn iterate_inner<T, F>(&mut self, f: &mut F) -> Result<()>
    where
        T: Record,
        F: FnMut(usize, T) -> Result<()> + Send,
    {
        let size = u64::try_from(self.statement.buffer_size).unwrap_or(u64::MAX);
        if size == 0 {
            for (idx, bean) in self.find_rows::<T>(None).await?.into_iter().enumerate() {
                f(idx, bean)?;
            }
            return Ok(());
        }

        let template = self.statement.clone();
        let limit = template.page.map(|p| p.limit);
        let mut offset = template.page.map_or(0, |p| p.offset);
        let mut seen = 0u64;
        let mut idx = 0usize;
        loop {
            let take = limit.map_or(size, |l| size.min(l.saturating_sub(seen)));
            if take == 0 {
                return Ok(());
            }
            self.statement = template.clone();
            self.statement.page = Some(Page {
                limit: take,
                offset,
            });
            let batch = self.find_rows::<T>(None).await?;
            let fetched = u64::try_from(batch.len()).unwrap_or(u64::MAX);
            for bean in batch {
                f(idx, bean)?;
                idx += 1;
            }
            if fetched < take {
                return Ok(());
            }
            seen += fetched;
            offset += fetched;
        }
    }
}
