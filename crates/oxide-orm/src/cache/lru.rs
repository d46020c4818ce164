//! Bounded least-recently-used cacher.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use oxide_sql_core::Pk;

use super::{Bean, Cacher};

#[derive(Debug, Clone)]
enum Value {
    Bean(Bean),
    Ids(Vec<Pk>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    tick: u64,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Bean,
    Ids,
}

type Key = (Kind, String, String);

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Key, Entry>,
    /// Access order: tick to key.
    order: BTreeMap<u64, Key>,
    tick: u64,
}

impl Inner {
    fn touch(&mut self, key: &Key) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &Key) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
        }
    }

    fn get(&mut self, key: &Key) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
            self.remove(key);
            return None;
        }
        let value = entry.value.clone();
        self.touch(key);
        Some(value)
    }

    fn put(&mut self, key: Key, value: Value, ttl: Option<Duration>, capacity: usize) {
        self.remove(&key);
        self.tick += 1;
        self.order.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                tick: self.tick,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn clear(&mut self, kind: Kind, table: &str) {
        let keys: Vec<Key> = self
            .entries
            .keys()
            .filter(|(k, t, _)| *k == kind && t == table)
            .cloned()
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    fn count(&self, kind: Kind, table: &str) -> usize {
        self.entries
            .keys()
            .filter(|(k, t, _)| *k == kind && t == table)
            .count()
    }
}

/// LRU cacher bounded by element count, with optional expiry.
#[derive(Debug)]
pub struct LruCacher {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl LruCacher {
    /// Cacher holding at most `capacity` entries of either kind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::default(),
            capacity: capacity.max(1),
            ttl: None,
        }
    }

    /// Entries expire `ttl` after they were stored.
    #[must_use]
    pub const fn with_expiry(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cached beans of `table`.
    #[must_use]
    pub fn bean_count(&self, table: &str) -> usize {
        self.lock().count(Kind::Bean, table)
    }

    /// Number of cached id lists of `table`.
    #[must_use]
    pub fn ids_count(&self, table: &str) -> usize {
        self.lock().count(Kind::Ids, table)
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruCacher {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl Cacher for LruCacher {
    fn get_bean(&self, table: &str, pk: &str) -> Option<Bean> {
        match self
            .lock()
            .get(&(Kind::Bean, table.to_string(), pk.to_string()))?
        {
            Value::Bean(bean) => Some(bean),
            Value::Ids(_) => None,
        }
    }

    fn put_bean(&self, table: &str, pk: &str, bean: Bean) {
        self.lock().put(
            (Kind::Bean, table.to_string(), pk.to_string()),
            Value::Bean(bean),
            self.ttl,
            self.capacity,
        );
    }

    fn del_bean(&self, table: &str, pk: &str) {
        self.lock()
            .remove(&(Kind::Bean, table.to_string(), pk.to_string()));
    }

    fn clear_beans(&self, table: &str) {
        self.lock().clear(Kind::Bean, table);
    }

    fn get_ids(&self, table: &str, sql: &str) -> Option<Vec<Pk>> {
        match self
            .lock()
            .get(&(Kind::Ids, table.to_string(), sql.to_string()))?
        {
            Value::Ids(ids) => Some(ids),
            Value::Bean(_) => None,
        }
    }

    fn put_ids(&self, table: &str, sql: &str, ids: Vec<Pk>) {
        self.lock().put(
            (Kind::Ids, table.to_string(), sql.to_string()),
            Value::Ids(ids),
            self.ttl,
            self.capacity,
        );
    }

    fn del_ids(&self, table: &str, sql: &str) {
        self.lock()
            .remove(&(Kind::Ids, table.to_string(), sql.to_string()));
    }

    fn clear_ids(&self, table: &str) {
        self.lock().clear(Kind::Ids, table);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oxide_sql_core::SqlValue;

    use super::*;

    fn pk(n: i64) -> Pk {
        Pk::new(vec![SqlValue::Int(n)])
    }

    #[test]
    fn test_bean_round_trip_and_downcast() {
        let cacher = LruCacher::new(8);
        cacher.put_bean("user", "1", Arc::new(String::from("lunny")));
        let bean = cacher.get_bean("user", "1").unwrap();
        assert_eq!(bean.downcast_ref::<String>().map(String::as_str), Some("lunny"));
        assert!(cacher.get_bean("post", "1").is_none());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cacher = LruCacher::new(2);
        cacher.put_ids("user", "a", vec![pk(1)]);
        cacher.put_ids("user", "b", vec![pk(2)]);
        // Touch "a" so that "b" becomes the oldest.
        assert!(cacher.get_ids("user", "a").is_some());
        cacher.put_ids("user", "c", vec![pk(3)]);
        assert!(cacher.get_ids("user", "b").is_none());
        assert_eq!(cacher.get_ids("user", "a"), Some(vec![pk(1)]));
        assert_eq!(cacher.len(), 2);
    }

    #[test]
    fn test_clear_is_per_table_and_kind() {
        let cacher = LruCacher::new(16);
        cacher.put_ids("user", "a", vec![pk(1)]);
        cacher.put_ids("post", "a", vec![pk(1)]);
        cacher.put_bean("user", "1", Arc::new(1_i64));
        cacher.clear_ids("user");
        assert_eq!(cacher.ids_count("user"), 0);
        assert_eq!(cacher.ids_count("post"), 1);
        assert_eq!(cacher.bean_count("user"), 1);
        cacher.clear_beans("user");
        assert_eq!(cacher.bean_count("user"), 0);
    }

    #[test]
    fn test_expiry() {
        let cacher = LruCacher::new(4).with_expiry(Duration::ZERO);
        cacher.put_bean("user", "1", Arc::new(1_i64));
        assert!(cacher.get_bean("user", "1").is_none());
        assert!(cacher.is_empty());
    }
}
