//! Hand-written SQL.

use std::collections::HashMap;

use oxide_sql_core::SqlValue;

use super::Session;
use crate::driver::{ExecResult, Rows};
use crate::error::Result;

impl Session {
    /// Runs a query and returns its rows untyped.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or missing arguments.
    pub async fn query(&mut self, sql: &str, args: Vec<SqlValue>) -> Result<Rows> {
        let result = self.query_sql(sql, args).await;
        self.finish();
        result
    }

    /// Runs a query and returns each row as a column-to-value map.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or missing arguments.
    pub async fn query_maps(
        &mut self,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> Result<Vec<HashMap<String, SqlValue>>> {
        let rows = self.query(sql, args).await?;
        let columns = rows.columns;
        Ok(rows
            .rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect())
    }

    /// Runs a query and renders every value as text. Times use
    /// `time_format` (a `chrono` format string) when given; NULL becomes
    /// an empty string.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or missing arguments.
    pub async fn query_string(
        &mut self,
        sql: &str,
        args: Vec<SqlValue>,
        time_format: Option<&str>,
    ) -> Result<Vec<HashMap<String, String>>> {
        let rows = self.query(sql, args).await?;
        let columns = rows.columns;
        Ok(rows
            .rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .cloned()
                    .zip(values.iter().map(|v| v.to_text(time_format)))
                    .collect()
            })
            .collect())
    }

    /// Runs a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Fails on driver errors or missing arguments.
    pub async fn exec(&mut self, sql: &str, args: Vec<SqlValue>) -> Result<ExecResult> {
        let result = self.exec_sql(sql, args).await;
        self.finish();
        result
    }
}
