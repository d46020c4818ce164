//! Second-level cache.
//!
//! Two kinds of entries are kept per table:
//! - beans: a materialized record keyed by its primary key
//! - ids: the primary keys a SELECT returned, keyed by SQL and arguments
//!
//! A query result is never cached as rows. Reads resolve cached ids through
//! the bean entries, and any write on a table clears its id entries.

mod lru;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use oxide_sql_core::{Pk, SqlValue};

pub use lru::LruCacher;

/// A cached, materialized record.
pub type Bean = Arc<dyn Any + Send + Sync>;

/// A concurrency-safe store for beans and id lists.
pub trait Cacher: Send + Sync + Debug {
    /// Bean of `table` with primary key `pk`.
    fn get_bean(&self, table: &str, pk: &str) -> Option<Bean>;

    fn put_bean(&self, table: &str, pk: &str, bean: Bean);

    fn del_bean(&self, table: &str, pk: &str);

    /// Removes every bean of `table`.
    fn clear_beans(&self, table: &str);

    /// Primary keys a query returned.
    fn get_ids(&self, table: &str, sql: &str) -> Option<Vec<Pk>>;

    fn put_ids(&self, table: &str, sql: &str, ids: Vec<Pk>);

    fn del_ids(&self, table: &str, sql: &str);

    /// Removes every id list of `table`.
    fn clear_ids(&self, table: &str);
}

/// Key of an id list: the SQL text followed by its arguments.
#[must_use]
pub fn sql_key(sql: &str, args: &[SqlValue]) -> String {
    let args = serde_json::to_string(args).unwrap_or_else(|_| format!("{args:?}"));
    format!("{sql}-{args}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_key_includes_args() {
        let a = sql_key("SELECT 1 WHERE x=?", &[SqlValue::Int(1)]);
        let b = sql_key("SELECT 1 WHERE x=?", &[SqlValue::Int(2)]);
        assert_ne!(a, b);
        assert!(a.starts_with("SELECT 1 WHERE x=?-"));
    }
}
