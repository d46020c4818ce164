//! Condition trees.
//!
//! A [`Cond`] is a boolean expression over columns that renders into a
//! WHERE fragment with `?` placeholders, combined with AND, OR and NOT.
//!
//! ```ignore
//! use oxide_orm::Cond;
//!
//! let cond = Cond::eq("status", "active")
//!     .and(Cond::gt("age", 18).or(Cond::eq("verified", true)));
//! ```

use std::fmt;

use oxide_sql_core::{Quoter, SqlValue, ToSqlValue};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        })
    }
}

/// A `SELECT <columns> FROM <table> [WHERE ...]` used as the right side of
/// IN / NOT IN.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub cond: Option<Box<Cond>>,
}

impl SubQuery {
    /// Selects `column` from `table`.
    #[must_use]
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: vec![column.to_string()],
            cond: None,
        }
    }

    /// Restricts the subquery.
    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.cond = Some(Box::new(match self.cond.take() {
            Some(prev) => prev.and(cond),
            None => cond,
        }));
        self
    }
}

/// Right side of an IN predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum InValues {
    List(Vec<SqlValue>),
    Query(SubQuery),
}

impl From<Vec<SqlValue>> for InValues {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::List(values)
    }
}

impl From<SubQuery> for InValues {
    fn from(query: SubQuery) -> Self {
        Self::Query(query)
    }
}

/// A boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// Hand-written fragment with `?` placeholders.
    Expr { sql: String, args: Vec<SqlValue> },
    Compare {
        column: String,
        op: CompareOp,
        value: SqlValue,
    },
    IsNull(String),
    IsNotNull(String),
    In { column: String, values: InValues },
    NotIn { column: String, values: InValues },
    Like { column: String, pattern: String },
    Between {
        column: String,
        low: SqlValue,
        high: SqlValue,
    },
    And(Vec<Cond>),
    Or(Vec<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    /// A raw fragment; backquoted identifiers are rewritten for the dialect.
    pub fn expr(sql: &str, args: Vec<SqlValue>) -> Self {
        Self::Expr {
            sql: sql.to_string(),
            args,
        }
    }

    fn compare<V: ToSqlValue>(column: &str, op: CompareOp, value: V) -> Self {
        Self::Compare {
            column: column.to_string(),
            op,
            value: value.to_sql_value(),
        }
    }

    pub fn eq<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn gt<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn lt<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte<V: ToSqlValue>(column: &str, value: V) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    pub fn is_not_null(column: &str) -> Self {
        Self::IsNotNull(column.to_string())
    }

    /// `column IN (...)`; an empty list never matches.
    pub fn in_list(column: &str, values: impl Into<InValues>) -> Self {
        Self::In {
            column: column.to_string(),
            values: values.into(),
        }
    }

    /// `column NOT IN (...)`; an empty list always matches.
    pub fn not_in_list(column: &str, values: impl Into<InValues>) -> Self {
        Self::NotIn {
            column: column.to_string(),
            values: values.into(),
        }
    }

    /// Use `%` for wildcards.
    pub fn like(column: &str, pattern: &str) -> Self {
        Self::Like {
            column: column.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn between<V: ToSqlValue>(column: &str, low: V, high: V) -> Self {
        Self::Between {
            column: column.to_string(),
            low: low.to_sql_value(),
            high: high.to_sql_value(),
        }
    }

    /// AND-joined equalities, one per `(column, value)` pair.
    pub fn all_eq<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
        V: ToSqlValue,
    {
        Self::And(
            pairs
                .into_iter()
                .map(|(column, value)| Self::eq(&column, value))
                .collect(),
        )
    }

    /// Combines with AND, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut items = match self {
            Self::And(items) => items,
            cond => vec![cond],
        };
        match other {
            Self::And(more) => items.extend(more),
            cond => items.push(cond),
        }
        Self::And(items)
    }

    /// Combines with OR, flattening nested disjunctions.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let mut items = match self {
            Self::Or(items) => items,
            cond => vec![cond],
        };
        match other {
            Self::Or(more) => items.extend(more),
            cond => items.push(cond),
        }
        Self::Or(items)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Whether the tree renders to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(items) | Self::Or(items) => items.iter().all(Self::is_empty),
            Self::Expr { sql, .. } => sql.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the tree, appending its arguments to `args`.
    pub fn render(&self, q: &Quoter, args: &mut Vec<SqlValue>) -> String {
        match self {
            Self::Expr { sql, args: own } => {
                args.extend(own.iter().cloned());
                q.replace(sql)
            }
            Self::Compare { column, op, value } => {
                args.push(value.clone());
                format!("{}{op}?", q.quote(column))
            }
            Self::IsNull(column) => format!("{} IS NULL", q.quote(column)),
            Self::IsNotNull(column) => format!("{} IS NOT NULL", q.quote(column)),
            Self::In { column, values } => render_in(q, column, values, false, args),
            Self::NotIn { column, values } => render_in(q, column, values, true, args),
            Self::Like { column, pattern } => {
                args.push(SqlValue::Text(pattern.clone()));
                format!("{} LIKE ?", q.quote(column))
            }
            Self::Between { column, low, high } => {
                args.push(low.clone());
                args.push(high.clone());
                format!("{} BETWEEN ? AND ?", q.quote(column))
            }
            Self::And(items) => render_joined(q, items, " AND ", args, |c| {
                matches!(c, Self::Or(_) | Self::Expr { .. })
            }),
            Self::Or(items) => render_joined(q, items, " OR ", args, |c| {
                matches!(c, Self::And(_) | Self::Expr { .. })
            }),
            Self::Not(inner) => format!("NOT ({})", inner.render(q, args)),
        }
    }
}

fn render_joined(
    q: &Quoter,
    items: &[Cond],
    sep: &str,
    args: &mut Vec<SqlValue>,
    needs_parens: impl Fn(&Cond) -> bool,
) -> String {
    let items: Vec<&Cond> = items.iter().filter(|c| !c.is_empty()).collect();
    let single = items.len() == 1;
    items
        .into_iter()
        .map(|c| {
            let sql = c.render(q, args);
            if !single && needs_parens(c) {
                format!("({sql})")
            } else {
                sql
            }
        })
        .collect::<Vec<_>>()
        .join(sep)
}

fn render_in(
    q: &Quoter,
    column: &str,
    values: &InValues,
    negate: bool,
    args: &mut Vec<SqlValue>,
) -> String {
    let op = if negate { "NOT IN" } else { "IN" };
    match values {
        InValues::List(list) if list.is_empty() => {
            if negate { "0=0" } else { "0=1" }.to_string()
        }
        InValues::List(list) => {
            args.extend(list.iter().cloned());
            let marks = vec!["?"; list.len()].join(",");
            format!("{} {op} ({marks})", q.quote(column))
        }
        InValues::Query(sub) => {
            let mut sql = format!(
                "{} {op} (SELECT {} FROM {}",
                q.quote(column),
                q.join(&sub.columns, ","),
                q.quote(&sub.table)
            );
            if let Some(cond) = sub.cond.as_deref().filter(|c| !c.is_empty()) {
                sql.push_str(" WHERE ");
                sql.push_str(&cond.render(q, args));
            }
            sql.push(')');
            sql
        }
    }
}

#[cfg(test)]
mod tests {
    use oxide_sql_core::{args, DbType};

    use super::*;

    fn build(cond: &Cond) -> (String, Vec<SqlValue>) {
        let q = DbType::Sqlite.dialect().quoter();
        let mut args = Vec::new();
        let sql = cond.render(&q, &mut args);
        (sql, args)
    }

    #[test]
    fn test_simple_eq() {
        let (sql, params) = build(&Cond::eq("status", "active"));
        assert_eq!(sql, "\"status\"=?");
        assert_eq!(params, args!["active"]);
    }

    #[test]
    fn test_and_flattens() {
        let cond = Cond::eq("a", 1).and(Cond::gt("b", 2)).and(Cond::is_null("c"));
        let (sql, params) = build(&cond);
        assert_eq!(sql, "\"a\"=? AND \"b\">? AND \"c\" IS NULL");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_or_inside_and_is_wrapped() {
        let cond = Cond::eq("status", "active").and(Cond::gt("age", 18).or(Cond::eq("verified", true)));
        let (sql, params) = build(&cond);
        assert_eq!(sql, "\"status\"=? AND (\"age\">? OR \"verified\"=?)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_raw_fragment_rewrites_backquotes() {
        let cond = Cond::expr("`age` > ? OR `name` = ?", args![3, "x"]).and(Cond::eq("id", 1));
        let (sql, params) = build(&cond);
        assert_eq!(sql, "(\"age\" > ? OR \"name\" = ?) AND \"id\"=?");
        assert_eq!(params, args![3, "x", 1]);
    }

    #[test]
    fn test_in_list_and_empty_list() {
        let (sql, params) = build(&Cond::in_list("id", args![1, 2, 3]));
        assert_eq!(sql, "\"id\" IN (?,?,?)");
        assert_eq!(params.len(), 3);
        assert_eq!(build(&Cond::in_list("id", Vec::<SqlValue>::new())).0, "0=1");
        assert_eq!(build(&Cond::not_in_list("id", Vec::<SqlValue>::new())).0, "0=0");
    }

    #[test]
    fn test_in_subquery() {
        let sub = SubQuery::new("post", "author_id").filter(Cond::gt("score", 10));
        let (sql, params) = build(&Cond::in_list("id", sub));
        assert_eq!(
            sql,
            "\"id\" IN (SELECT \"author_id\" FROM \"post\" WHERE \"score\">?)"
        );
        assert_eq!(params, args![10]);
    }

    #[test]
    fn test_not_and_between() {
        let (sql, _) = build(&Cond::between("price", 10, 100).not());
        assert_eq!(sql, "NOT (\"price\" BETWEEN ? AND ?)");
    }

    #[test]
    fn test_all_eq_and_dotted_columns() {
        let cond = Cond::all_eq(vec![("u.name".to_string(), "x"), ("u.city".to_string(), "y")]);
        let (sql, _) = build(&cond);
        assert_eq!(sql, "\"u\".\"name\"=? AND \"u\".\"city\"=?");
    }

    #[test]
    fn test_empty_children_are_skipped() {
        let cond = Cond::And(vec![Cond::expr("", vec![]), Cond::eq("a", 1)]);
        assert_eq!(build(&cond).0, "\"a\"=?");
        assert!(Cond::And(vec![]).is_empty());
    }
}
