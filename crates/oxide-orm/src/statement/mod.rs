//! Builder state accumulated by session verbs.
//!
//! A [`Statement`] is plain data: the session's fluent verbs fill it, the
//! terminal operations turn it into SQL through the functions in `build`,
//! and it is reset after every terminal operation.

pub(crate) mod build;
pub mod cond;

use oxide_sql_core::dialect::Page;
use oxide_sql_core::{ConvertContext, Dialect, Pk, Quoter, SqlValue};

pub use cond::{CompareOp, Cond, InValues, SubQuery};

pub(crate) use build::SelectPlan;

/// Everything SQL generation needs from the engine.
#[derive(Clone, Copy)]
pub(crate) struct SqlCx<'a> {
    pub dialect: &'a dyn Dialect,
    pub quoter: Quoter,
    pub convert: ConvertContext,
}

impl<'a> SqlCx<'a> {
    pub(crate) fn new(dialect: &'a dyn Dialect, quoter: Quoter, convert: ConvertContext) -> Self {
        Self {
            dialect,
            quoter,
            convert,
        }
    }

    /// Quoted, schema-qualified table name.
    pub(crate) fn quote_table(&self, name: &str) -> String {
        self.quoter.quote(&self.dialect.qualify_table(name))
    }
}

/// One JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    /// Free text such as `INNER` or `LEFT OUTER`.
    pub op: String,
    pub table: String,
    pub alias: Option<String>,
    pub on: String,
    pub args: Vec<SqlValue>,
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Order {
    /// Hand-written clause, backquotes rewritten.
    Raw(String),
    Asc(String),
    Desc(String),
}

/// Column include/exclude lists.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnFilter {
    pub cols: Vec<String>,
    pub omit: Vec<String>,
    pub must: Vec<String>,
    pub nullable: Vec<String>,
    /// `Some(empty)` means every bool column.
    pub use_bool: Option<Vec<String>>,
    pub all_cols: bool,
}

fn listed(list: &[String], name: &str) -> bool {
    list.iter().any(|n| {
        n.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
            .eq_ignore_ascii_case(name)
    })
}

/// Splits `"a, b"` style arguments into single names.
pub(crate) fn split_names(names: &[&str]) -> Vec<String> {
    names
        .iter()
        .flat_map(|n| n.split(','))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

impl ColumnFilter {
    /// Excluded by `omit`, or not named by a non-empty `cols`.
    pub(crate) fn is_excluded(&self, name: &str) -> bool {
        listed(&self.omit, name) || (!self.cols.is_empty() && !listed(&self.cols, name))
    }

    pub(crate) fn is_must(&self, name: &str) -> bool {
        listed(&self.must, name)
    }

    pub(crate) fn is_nullable(&self, name: &str) -> bool {
        listed(&self.nullable, name)
    }

    pub(crate) fn uses_bool(&self, name: &str) -> bool {
        self.use_bool
            .as_ref()
            .is_some_and(|list| list.is_empty() || listed(list, name))
    }
}

/// Builder state of one session.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    /// Table name override.
    pub(crate) table: Option<String>,
    pub(crate) alias: Option<String>,
    /// Raw SQL that bypasses generation.
    pub(crate) raw: Option<(String, Vec<SqlValue>)>,
    pub(crate) cond: Option<Cond>,
    pub(crate) id: Option<Pk>,
    pub(crate) joins: Vec<Join>,
    /// Projection override.
    pub(crate) select: Option<String>,
    pub(crate) columns: ColumnFilter,
    pub(crate) order_by: Vec<Order>,
    pub(crate) group_by: Option<String>,
    pub(crate) having: Option<String>,
    pub(crate) page: Option<Page>,
    pub(crate) distinct: Option<Vec<String>>,
    pub(crate) for_update: bool,
    pub(crate) incr: Vec<(String, SqlValue)>,
    pub(crate) decr: Vec<(String, SqlValue)>,
    pub(crate) exprs: Vec<(String, String)>,
    pub(crate) cascade: Option<bool>,
    pub(crate) unscoped: bool,
    pub(crate) no_auto_condition: bool,
    pub(crate) no_cache: bool,
    pub(crate) no_versioning: bool,
    pub(crate) no_auto_time: bool,
    pub(crate) buffer_size: usize,
}

impl Statement {
    /// Clears all builder state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adds `cond` with AND.
    pub(crate) fn and(&mut self, cond: Cond) {
        self.cond = Some(match self.cond.take() {
            Some(prev) => prev.and(cond),
            None => cond,
        });
    }

    /// Adds `cond` with OR; the prior tree becomes the left operand.
    pub(crate) fn or(&mut self, cond: Cond) {
        self.cond = Some(match self.cond.take() {
            Some(prev) => prev.or(cond),
            None => cond,
        });
    }

    /// Whether the statement carries its own condition.
    pub(crate) fn has_condition(&self) -> bool {
        self.id.is_some() || self.cond.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_filter() {
        let filter = ColumnFilter {
            cols: split_names(&["name, age"]),
            omit: vec!["age".into()],
            use_bool: Some(vec![]),
            ..ColumnFilter::default()
        };
        assert!(!filter.is_excluded("NAME"));
        assert!(filter.is_excluded("age"));
        assert!(filter.is_excluded("email"));
        assert!(filter.uses_bool("active"));
        assert!(!ColumnFilter::default().uses_bool("active"));
    }

    #[test]
    fn test_or_wraps_prior_tree() {
        let mut st = Statement::default();
        st.and(Cond::eq("a", 1));
        st.and(Cond::eq("b", 2));
        st.or(Cond::eq("c", 3));
        assert!(matches!(st.cond, Some(Cond::Or(ref items)) if items.len() == 2));
        st.reset();
        assert!(st.cond.is_none());
        assert!(!st.has_condition());
    }
}
