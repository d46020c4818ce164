//! Primary/replica engine groups.
//!
//! An [`EngineGroup`] routes reads to a replica chosen by its
//! [`GroupPolicy`] and writes to the primary. Settings are applied to every
//! engine of the group.
//!
//! ```ignore
//! let group = EngineGroup::open(
//!     "sqlite",
//!     &["sqlite://primary.db", "sqlite://replica1.db", "sqlite://replica2.db"],
//! )
//! .await?
//! .with_policy(Arc::new(WeightRoundRobinPolicy::new(&[2, 1])));
//!
//! group.insert(&mut user).await?;                       // primary
//! let adults: Vec<User> = group.read().where_("age > ?", args![18]).find().await?;
//! ```

mod policy;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use futures::future::try_join_all;
use oxide_sql_core::{QuotePolicy, Record, RecordDescriptor, SharedMapper, SqlValue};

pub use policy::{
    GroupPolicy, LeastConnPolicy, RandomPolicy, RoundRobinPolicy, WeightRandomPolicy,
    WeightRoundRobinPolicy,
};

use crate::cache::Cacher;
use crate::driver::{ExecResult, Rows};
use crate::engine::Engine;
use crate::error::{OrmError, Result};
use crate::logger::{LogLevel, Logger};
use crate::session::Session;

/// One primary engine, its replicas and a routing policy.
#[derive(Debug, Clone)]
pub struct EngineGroup {
    primary: Engine,
    replicas: Vec<Engine>,
    policy: Arc<dyn GroupPolicy>,
}

impl EngineGroup {
    /// Groups opened engines under round-robin routing.
    #[must_use]
    pub fn new(primary: Engine, replicas: Vec<Engine>) -> Self {
        Self {
            primary,
            replicas,
            policy: Arc::new(RoundRobinPolicy::new()),
        }
    }

    /// Opens one engine per DSN; the first is the primary.
    ///
    /// # Errors
    ///
    /// [`OrmError::Config`] without any DSN, or the first open failure.
    pub async fn open(driver_name: &str, dsns: &[&str]) -> Result<Self> {
        let Some((first, rest)) = dsns.split_first() else {
            return Err(OrmError::Config("engine group needs at least one dsn".to_string()));
        };
        let primary = Engine::open(driver_name, first).await?;
        let replicas = try_join_all(rest.iter().map(|dsn| Engine::open(driver_name, dsn))).await?;
        Ok(Self::new(primary, replicas))
    }

    /// Replaces the routing policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn GroupPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn primary(&self) -> &Engine {
        &self.primary
    }

    #[must_use]
    pub fn replicas(&self) -> &[Engine] {
        &self.replicas
    }

    /// Engine for the next read: a replica picked by the policy, or the
    /// primary when there are none.
    #[must_use]
    pub fn read(&self) -> &Engine {
        if self.replicas.is_empty() {
            &self.primary
        } else {
            self.policy.pick(&self.replicas)
        }
    }

    /// Engine for writes.
    #[must_use]
    pub const fn write(&self) -> &Engine {
        &self.primary
    }

    fn engines(&self) -> impl Iterator<Item = &Engine> {
        std::iter::once(&self.primary).chain(&self.replicas)
    }

    /// A session on the primary. Transactions run there.
    #[must_use]
    pub fn new_session(&self) -> Session {
        self.primary.new_session()
    }

    // ---------------------------------------------------------------------
    // Fan-out settings
    // ---------------------------------------------------------------------

    pub fn set_max_open_conns(&self, n: u32) {
        self.engines().for_each(|e| e.set_max_open_conns(n));
    }

    pub fn set_max_idle_conns(&self, n: u32) {
        self.engines().for_each(|e| e.set_max_idle_conns(n));
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Option<Duration>) {
        self.engines().for_each(|e| e.set_conn_max_lifetime(lifetime));
    }

    pub fn set_logger(&self, logger: &Arc<dyn Logger>) {
        self.engines().for_each(|e| e.set_logger(Arc::clone(logger)));
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.engines().for_each(|e| e.set_log_level(level));
    }

    pub fn show_sql(&self, on: bool) {
        self.engines().for_each(|e| e.show_sql(on));
    }

    pub fn set_mapper(&self, mapper: &SharedMapper) {
        self.engines().for_each(|e| e.set_mapper(Arc::clone(mapper)));
    }

    pub fn set_table_mapper(&self, mapper: &SharedMapper) {
        self.engines()
            .for_each(|e| e.set_table_mapper(Arc::clone(mapper)));
    }

    pub fn set_column_mapper(&self, mapper: &SharedMapper) {
        self.engines()
            .for_each(|e| e.set_column_mapper(Arc::clone(mapper)));
    }

    pub fn set_quote_policy(&self, policy: QuotePolicy) {
        self.engines().for_each(|e| e.set_quote_policy(policy));
    }

    /// Shares one cacher across the group so primary writes invalidate
    /// what replicas cached.
    pub fn set_default_cacher(&self, cacher: Option<&Arc<dyn Cacher>>) {
        self.engines()
            .for_each(|e| e.set_default_cacher(cacher.cloned()));
    }

    pub fn set_tz_location(&self, tz: FixedOffset) {
        self.engines().for_each(|e| e.set_tz_location(tz));
    }

    pub fn set_database_tz(&self, tz: FixedOffset) {
        self.engines().for_each(|e| e.set_database_tz(tz));
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Pings every engine.
    ///
    /// # Errors
    ///
    /// The first engine that does not answer.
    pub async fn ping(&self) -> Result<()> {
        try_join_all(self.engines().map(Engine::ping)).await?;
        Ok(())
    }

    /// Closes every pool.
    pub async fn close(&self) {
        for engine in self.engines() {
            engine.close().await;
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`Session::get`].
    pub async fn get<T: Record>(&self, bean: &mut T) -> Result<bool> {
        self.read().get(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::find`].
    pub async fn find<T: Record>(&self) -> Result<Vec<T>> {
        self.read().find().await
    }

    /// # Errors
    ///
    /// See [`Session::count`].
    pub async fn count<T: Record>(&self) -> Result<u64> {
        self.read().count::<T>().await
    }

    /// # Errors
    ///
    /// See [`Session::exist_by`].
    pub async fn exist<T: Record>(&self, bean: &T) -> Result<bool> {
        self.read().exist(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::query`].
    pub async fn query(&self, sql: &str, args: Vec<SqlValue>) -> Result<Rows> {
        self.read().query(sql, args).await
    }

    /// # Errors
    ///
    /// See [`Session::query_string`].
    pub async fn query_string(
        &self,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> Result<Vec<HashMap<String, String>>> {
        self.read().query_string(sql, args).await
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`Session::insert`].
    pub async fn insert<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.primary.insert(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::insert_multi`].
    pub async fn insert_multi<T: Record>(&self, beans: &mut [T]) -> Result<u64> {
        self.primary.insert_multi(beans).await
    }

    /// # Errors
    ///
    /// See [`Session::update`].
    pub async fn update<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.primary.update(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::delete`].
    pub async fn delete<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.primary.delete(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::exec`].
    pub async fn exec(&self, sql: &str, args: Vec<SqlValue>) -> Result<ExecResult> {
        self.primary.exec(sql, args).await
    }

    /// Synchronizes the schema on every engine.
    ///
    /// # Errors
    ///
    /// See [`Session::sync_tables`].
    pub async fn sync_tables(&self, records: &[&'static RecordDescriptor]) -> Result<()> {
        for engine in self.engines() {
            engine.sync_tables(records).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn group(replicas: usize) -> EngineGroup {
        let dsns = vec!["sqlite::memory:"; replicas + 1];
        EngineGroup::open("sqlite", &dsns).await.unwrap()
    }

    fn index_of(group: &EngineGroup, engine: &Engine) -> usize {
        group
            .replicas()
            .iter()
            .position(|r| std::ptr::eq(r, engine))
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_needs_a_dsn() {
        let err = EngineGroup::open("sqlite", &[]).await.unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }

    #[tokio::test]
    async fn test_reads_fall_back_to_primary() {
        let group = group(0).await;
        assert!(std::ptr::eq(group.read(), group.primary()));
    }

    #[tokio::test]
    async fn test_round_robin_cycles() {
        let group = group(3).await;
        let picks: Vec<usize> = (0..6).map(|_| index_of(&group, group.read())).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_weighted_round_robin_follows_schedule() {
        let group = group(2)
            .await
            .with_policy(Arc::new(WeightRoundRobinPolicy::new(&[1, 2])));
        let picks: Vec<usize> = (0..6).map(|_| index_of(&group, group.read())).collect();
        assert_eq!(picks, vec![0, 1, 1, 0, 1, 1]);
    }

    #[tokio::test]
    async fn test_seeded_random_is_reproducible() {
        let a = group(3).await.with_policy(Arc::new(RandomPolicy::seeded(7)));
        let b = group(3).await.with_policy(Arc::new(RandomPolicy::seeded(7)));
        let picks_a: Vec<usize> = (0..10).map(|_| index_of(&a, a.read())).collect();
        let picks_b: Vec<usize> = (0..10).map(|_| index_of(&b, b.read())).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[tokio::test]
    async fn test_weight_random_never_picks_zero_weight() {
        let group = group(2)
            .await
            .with_policy(Arc::new(WeightRandomPolicy::seeded(&[0, 1], 11)));
        assert!((0..20).all(|_| index_of(&group, group.read()) == 1));
    }

    #[tokio::test]
    async fn test_least_conn_prefers_first_on_ties() {
        // Every in-memory pool holds exactly one connection.
        let group = group(3).await.with_policy(Arc::new(LeastConnPolicy));
        let picks: Vec<usize> = (0..3).map(|_| index_of(&group, group.read())).collect();
        assert_eq!(picks, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_settings_fan_out() {
        let group = group(2).await;
        group.set_max_open_conns(3);
        group.set_quote_policy(QuotePolicy::Never);
        for engine in group.engines() {
            assert_eq!(engine.driver().pool_config().max_open, 3);
            assert_eq!(engine.quoter().quote("id"), "id");
        }
    }
}
