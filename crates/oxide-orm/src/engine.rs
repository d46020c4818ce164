//! The engine: one connection pool plus the settings every session reads.
//!
//! An [`Engine`] is cheap to clone; clones share the pool, the settings and
//! the table registry. Settings sit behind a read-write lock so they can be
//! changed while sessions are running; a session sees the values current at
//! the moment it reads them.
//!
//! ```ignore
//! let engine = Engine::open("sqlite", "sqlite::memory:").await?;
//! engine.show_sql(true);
//! engine.sync::<User>().await?;
//!
//! let mut user = User { name: "ada".into(), ..User::default() };
//! engine.insert(&mut user).await?;
//! let found: Vec<User> = engine.where_("name = ?", args!["ada"]).find().await?;
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::FixedOffset;
use futures::future::BoxFuture;
use oxide_sql_core::dialect::PostgresDialect;
use oxide_sql_core::{
    mapper_by_name, ConvertContext, DbType, Dialect, Pk, QuotePolicy, Quoter, Record,
    RecordDescriptor, SharedMapper, SqlValue, Table, TableParser, ToSqlValue,
};

use crate::cache::Cacher;
use crate::config::EngineConfig;
use crate::driver::{Driver, ExecResult, PoolConfig, PoolStats, Rows, SqliteDriver};
use crate::error::{OrmError, Result};
use crate::logger::{LogLevel, Logger, TracingLogger};
use crate::session::Session;
use crate::statement::{Cond, InValues};
use crate::tx::Propagation;

/// Mutable engine settings.
#[derive(Clone)]
struct Settings {
    dialect: Arc<dyn Dialect>,
    parser: TableParser,
    quote_policy: QuotePolicy,
    logger: Arc<dyn Logger>,
    log_level: LogLevel,
    show_sql: bool,
    log_session_id: bool,
    default_cacher: Option<Arc<dyn Cacher>>,
    table_cachers: HashMap<String, Arc<dyn Cacher>>,
    convert: ConvertContext,
    cascade: bool,
}

struct Inner {
    driver: Arc<dyn Driver>,
    settings: RwLock<Settings>,
    tables: RwLock<HashMap<TypeId, Arc<Table>>>,
    session_seq: AtomicU64,
}

/// Entry point: owns the pool, the dialect, the mappers, the logger and the
/// caches.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("db_type", &self.db_type())
            .field("dsn", &self.inner.driver.dsn())
            .finish_non_exhaustive()
    }
}

/// Shortcut builder verbs: each opens an auto-closing session, applies the
/// verb and hands the session back for chaining.
macro_rules! session_verbs {
    ($(
        $(#[$doc:meta])*
        fn $name:ident $(<$g:ident: $bound:ident>)? ($($arg:ident: $ty:ty),*);
    )*) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name $(<$g: $bound>)? (&self $(, $arg: $ty)*) -> Session {
                let mut session = self.auto_session();
                session.$name $(::<$g>)? ($($arg),*);
                session
            }
        )*
    };
}

impl Engine {
    /// Wraps an opened driver with default settings.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        let settings = Settings {
            dialect: driver.db_type().dialect(),
            parser: TableParser::default(),
            quote_policy: QuotePolicy::Always,
            logger: Arc::new(TracingLogger),
            log_level: LogLevel::Info,
            show_sql: false,
            log_session_id: false,
            default_cacher: None,
            table_cachers: HashMap::new(),
            convert: ConvertContext::default(),
            cascade: true,
        };
        Self {
            inner: Arc::new(Inner {
                driver,
                settings: RwLock::new(settings),
                tables: RwLock::new(HashMap::new()),
                session_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Opens a pool for `driver_name` on `dsn` with default pool settings.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnsupportedDriver`] for drivers this build cannot open,
    /// [`OrmError::InvalidDsn`] or a database error when the pool fails.
    pub async fn open(driver_name: &str, dsn: &str) -> Result<Self> {
        let driver = open_driver(driver_name, dsn, PoolConfig::default()).await?;
        Ok(Self::new(driver))
    }

    /// Opens an engine and applies every setting of `config`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), plus [`OrmError::Config`] for an
    /// unknown mapper name.
    pub async fn from_config(config: &EngineConfig) -> Result<Self> {
        let mapper = mapper_by_name(&config.mapper)
            .ok_or_else(|| OrmError::Config(format!("unknown mapper `{}`", config.mapper)))?;
        let tz = offset(config.tz_offset)?;
        let db_tz = offset(config.database_tz_offset)?;
        let driver = open_driver(&config.driver, &config.dsn, config.pool).await?;
        let engine = Self::new(driver);
        engine.set_mapper(mapper);
        engine.set_quote_policy(config.quote_policy);
        engine.set_log_level(config.log_level);
        engine.show_sql(config.show_sql);
        engine.set_tz_location(tz);
        engine.set_database_tz(db_tz);
        engine.set_cascade(config.cascade);
        Ok(engine)
    }

    /// A second engine with its own pool on the same database and a copy of
    /// the current settings.
    ///
    /// # Errors
    ///
    /// Fails when the new pool cannot be opened.
    pub async fn clone_engine(&self) -> Result<Self> {
        let driver = self.inner.driver.reopen().await?;
        let settings = self.settings().clone();
        let tables = self.inner.tables.read().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(Self {
            inner: Arc::new(Inner {
                driver,
                settings: RwLock::new(settings),
                tables: RwLock::new(tables),
                session_seq: AtomicU64::new(0),
            }),
        })
    }

    fn settings(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut settings);
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn db_type(&self) -> DbType {
        self.inner.driver.db_type()
    }

    #[must_use]
    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.inner.driver)
    }

    #[must_use]
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.settings().dialect)
    }

    /// The dialect's quoter under the current quote policy.
    #[must_use]
    pub fn quoter(&self) -> Quoter {
        let settings = self.settings();
        settings.dialect.quoter().with_policy(settings.quote_policy)
    }

    #[must_use]
    pub fn convert_context(&self) -> ConvertContext {
        self.settings().convert
    }

    #[must_use]
    pub fn cascade_default(&self) -> bool {
        self.settings().cascade
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.inner.session_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The logger and whether session ids are attached, when SQL logging
    /// is on.
    pub(crate) fn sql_logger(&self) -> Option<(Arc<dyn Logger>, bool)> {
        let settings = self.settings();
        settings
            .show_sql
            .then(|| (Arc::clone(&settings.logger), settings.log_session_id))
    }

    /// Sends `msg` to the logger when `level` passes the engine's filter.
    pub fn log(&self, level: LogLevel, msg: &str) {
        let settings = self.settings();
        if level != LogLevel::Off && level >= settings.log_level {
            settings.logger.log(level, msg);
        }
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    /// Uses `mapper` for table and column names. Clears the table registry.
    pub fn set_mapper(&self, mapper: SharedMapper) {
        self.update_settings(|s| s.parser = TableParser::new(Arc::clone(&mapper), mapper));
        self.clear_tables();
    }

    /// Clears the table registry.
    pub fn set_table_mapper(&self, mapper: SharedMapper) {
        self.update_settings(|s| s.parser.table_mapper = mapper);
        self.clear_tables();
    }

    /// Clears the table registry.
    pub fn set_column_mapper(&self, mapper: SharedMapper) {
        self.update_settings(|s| s.parser.column_mapper = mapper);
        self.clear_tables();
    }

    pub fn set_quote_policy(&self, policy: QuotePolicy) {
        self.update_settings(|s| s.quote_policy = policy);
    }

    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        self.update_settings(|s| s.logger = logger);
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.update_settings(|s| s.log_level = level);
    }

    /// Logs every statement through the logger's SQL callbacks.
    pub fn show_sql(&self, on: bool) {
        self.update_settings(|s| s.show_sql = on);
    }

    /// Attaches the session id to logged statements.
    pub fn log_session_id(&self, on: bool) {
        self.update_settings(|s| s.log_session_id = on);
    }

    /// Cacher for every table without its own; `None` disables caching.
    pub fn set_default_cacher(&self, cacher: Option<Arc<dyn Cacher>>) {
        self.update_settings(|s| s.default_cacher = cacher);
    }

    /// Cacher for one table, overriding the default.
    pub fn set_cacher(&self, table: &str, cacher: Arc<dyn Cacher>) {
        self.update_settings(|s| {
            s.table_cachers.insert(table.to_string(), cacher);
        });
    }

    /// Drops the per-table cacher of `table`.
    pub fn remove_cacher(&self, table: &str) {
        self.update_settings(|s| {
            s.table_cachers.remove(table);
        });
    }

    /// Cacher used for `table`: none when the table opts out, else its own,
    /// else the default.
    #[must_use]
    pub fn cacher_for(&self, table: &Table) -> Option<Arc<dyn Cacher>> {
        if table.cache == Some(false) {
            return None;
        }
        let settings = self.settings();
        settings
            .table_cachers
            .get(&table.name)
            .or(settings.default_cacher.as_ref())
            .cloned()
    }

    /// Zone of times handed to the application.
    pub fn set_tz_location(&self, tz: FixedOffset) {
        self.update_settings(|s| s.convert.tz_location = tz);
    }

    /// Zone of times stored in the database.
    pub fn set_database_tz(&self, tz: FixedOffset) {
        self.update_settings(|s| s.convert.database_tz = tz);
    }

    /// Whether cascade fields are loaded unless a session says otherwise.
    pub fn set_cascade(&self, on: bool) {
        self.update_settings(|s| s.cascade = on);
    }

    /// Qualifies PostgreSQL introspection and DDL with `schema`. Ignored on
    /// other backends.
    pub fn set_schema(&self, schema: &str) {
        if self.db_type() == DbType::Postgres {
            let dialect: Arc<dyn Dialect> = Arc::new(PostgresDialect::with_schema(schema));
            self.update_settings(|s| s.dialect = dialect);
        }
    }

    // ---------------------------------------------------------------------
    // Pool
    // ---------------------------------------------------------------------

    fn configure_pool(&self, f: impl FnOnce(&mut PoolConfig)) {
        let mut config = self.inner.driver.pool_config();
        f(&mut config);
        self.inner.driver.configure(config);
    }

    pub fn set_max_open_conns(&self, n: u32) {
        self.configure_pool(|c| c.max_open = n);
    }

    pub fn set_max_idle_conns(&self, n: u32) {
        self.configure_pool(|c| c.max_idle = n);
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Option<Duration>) {
        self.configure_pool(|c| c.max_lifetime = lifetime);
    }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.driver.stats()
    }

    /// # Errors
    ///
    /// Fails when the database does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.inner.driver.ping().await
    }

    /// Closes the pool. Sessions created afterwards fail to connect.
    pub async fn close(&self) {
        self.inner.driver.close().await;
    }

    // ---------------------------------------------------------------------
    // Table registry
    // ---------------------------------------------------------------------

    /// Table metadata of `T`, parsed on first use.
    ///
    /// # Errors
    ///
    /// Fails when the record's tags are ill-formed.
    pub fn table_info<T: Record>(&self) -> Result<Arc<Table>> {
        self.table_info_of(T::descriptor())
    }

    /// Table metadata of a record descriptor, parsed on first use.
    ///
    /// # Errors
    ///
    /// Fails when the record's tags are ill-formed.
    pub fn table_info_of(&self, desc: &'static RecordDescriptor) -> Result<Arc<Table>> {
        let key = (desc.type_id)();
        if let Some(table) = self
            .inner
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(table));
        }
        let parser = self.settings().parser.clone();
        let table = Arc::new(parser.parse(desc)?);
        let mut tables = self
            .inner
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(tables.entry(key).or_insert(table)))
    }

    /// Mapped table name of a record.
    #[must_use]
    pub fn table_name_of(&self, desc: &'static RecordDescriptor) -> String {
        self.table_info_of(desc)
            .map_or_else(|_| self.settings().parser.table_name(desc), |t| t.name.clone())
    }

    /// Mapped table name of `T`.
    #[must_use]
    pub fn table_name<T: Record>(&self) -> String {
        self.table_name_of(T::descriptor())
    }

    /// Forgets the parsed metadata of `T`; the next use parses it again.
    pub fn unmap<T: Record>(&self) {
        let key = (T::descriptor().type_id)();
        self.inner
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    fn clear_tables(&self) {
        self.inner
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ---------------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------------

    /// A session that stays open across operations until
    /// [`Session::close`] or drop. Needed for transactions.
    #[must_use]
    pub fn new_session(&self) -> Session {
        Session::new(self.clone(), false)
    }

    /// A session that closes after its first terminal operation.
    pub(crate) fn auto_session(&self) -> Session {
        Session::new(self.clone(), true)
    }

    /// Runs `f` in a `Required` transaction on a fresh session.
    ///
    /// ```ignore
    /// let id = engine
    ///     .transaction(|s| Box::pin(async move {
    ///         s.insert(&mut order).await?;
    ///         s.insert(&mut line).await?;
    ///         Ok(order.id)
    ///     }))
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// The error of `f`, after rolling back, or of the commit.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
    {
        let mut session = self.new_session();
        let result = session.transaction(Propagation::Required, f).await;
        session.close();
        result
    }

    session_verbs! {
        /// Selects rows by primary key.
        fn id(pk: impl Into<Pk>);
        fn where_(sql: &str, args: Vec<SqlValue>);
        fn and(sql: &str, args: Vec<SqlValue>);
        fn or(sql: &str, args: Vec<SqlValue>);
        fn cond(cond: Cond);
        fn in_(column: &str, values: impl Into<InValues>);
        fn not_in(column: &str, values: impl Into<InValues>);
        fn cols(names: &[&str]);
        fn omit(names: &[&str]);
        fn must_cols(names: &[&str]);
        fn nullable(names: &[&str]);
        fn all_cols();
        fn use_bool(names: &[&str]);
        fn select(projection: &str);
        fn distinct(names: &[&str]);
        fn join(op: &str, table: &str, on: &str, args: Vec<SqlValue>);
        fn order_by(clause: &str);
        fn asc(names: &[&str]);
        fn desc(names: &[&str]);
        fn group_by(names: &str);
        fn having(clause: &str);
        fn limit(limit: u64, offset: u64);
        fn top(n: u64);
        fn alias(alias: &str);
        /// Overrides the table name of the next operation.
        fn table(name: &str);
        fn table_for<U: Record>();
        /// Runs raw SQL in place of the built statement.
        fn sql(sql: &str, args: Vec<SqlValue>);
        fn incr(column: &str, n: impl ToSqlValue);
        fn decr(column: &str, n: impl ToSqlValue);
        fn set_expr(column: &str, expr: &str);
        fn no_auto_condition();
        fn unscoped();
        fn no_versioning();
        fn no_auto_time();
        fn no_cache();
        fn cascade(enabled: bool);
        fn buffer_size(size: usize);
    }

    // ---------------------------------------------------------------------
    // Terminal shortcuts
    // ---------------------------------------------------------------------

    /// Loads the row matching `bean`'s non-zero fields into `bean`.
    ///
    /// # Errors
    ///
    /// See [`Session::get`].
    pub async fn get<T: Record>(&self, bean: &mut T) -> Result<bool> {
        self.auto_session().get(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::find`].
    pub async fn find<T: Record>(&self) -> Result<Vec<T>> {
        self.auto_session().find().await
    }

    /// # Errors
    ///
    /// See [`Session::count`].
    pub async fn count<T: Record>(&self) -> Result<u64> {
        self.auto_session().count::<T>().await
    }

    /// # Errors
    ///
    /// See [`Session::exist_by`].
    pub async fn exist<T: Record>(&self, bean: &T) -> Result<bool> {
        self.auto_session().exist_by(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::insert`].
    pub async fn insert<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.auto_session().insert(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::insert_multi`].
    pub async fn insert_multi<T: Record>(&self, beans: &mut [T]) -> Result<u64> {
        self.auto_session().insert_multi(beans).await
    }

    /// # Errors
    ///
    /// See [`Session::update`].
    pub async fn update<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.auto_session().update(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::delete`].
    pub async fn delete<T: Record>(&self, bean: &mut T) -> Result<u64> {
        self.auto_session().delete(bean).await
    }

    /// # Errors
    ///
    /// See [`Session::query`].
    pub async fn query(&self, sql: &str, args: Vec<SqlValue>) -> Result<Rows> {
        self.auto_session().query(sql, args).await
    }

    /// # Errors
    ///
    /// See [`Session::query_string`].
    pub async fn query_string(
        &self,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> Result<Vec<HashMap<String, String>>> {
        self.auto_session().query_string(sql, args, None).await
    }

    /// # Errors
    ///
    /// See [`Session::exec`].
    pub async fn exec(&self, sql: &str, args: Vec<SqlValue>) -> Result<ExecResult> {
        self.auto_session().exec(sql, args).await
    }

    /// # Errors
    ///
    /// See [`Session::sync`].
    pub async fn sync<T: Record>(&self) -> Result<()> {
        self.auto_session().sync::<T>().await
    }

    /// # Errors
    ///
    /// See [`Session::sync_tables`].
    pub async fn sync_tables(&self, records: &[&'static RecordDescriptor]) -> Result<()> {
        self.auto_session().sync_tables(records).await
    }

    /// # Errors
    ///
    /// See [`Session::create_tables`].
    pub async fn create_tables(&self, records: &[&'static RecordDescriptor]) -> Result<()> {
        self.auto_session().create_tables(records).await
    }

    /// # Errors
    ///
    /// See [`Session::drop_tables`].
    pub async fn drop_tables(&self, records: &[&'static RecordDescriptor]) -> Result<()> {
        self.auto_session().drop_tables(records).await
    }

    /// # Errors
    ///
    /// See [`Session::is_table_exist`].
    pub async fn is_table_exist<T: Record>(&self) -> Result<bool> {
        self.auto_session().is_table_exist::<T>().await
    }

    /// # Errors
    ///
    /// See [`Session::db_metas`].
    pub async fn db_metas(&self) -> Result<Vec<Table>> {
        self.auto_session().db_metas().await
    }
}

/// Opens the pool for a driver name.
pub(crate) async fn open_driver(
    driver_name: &str,
    dsn: &str,
    pool: PoolConfig,
) -> Result<Arc<dyn Driver>> {
    let db_type: DbType = driver_name
        .parse()
        .map_err(|_| OrmError::UnsupportedDriver(driver_name.to_string()))?;
    match db_type {
        DbType::Sqlite => Ok(Arc::new(SqliteDriver::open(dsn, pool).await?)),
        other => Err(OrmError::UnsupportedDriver(other.name().to_string())),
    }
}

fn offset(seconds: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(seconds)
        .ok_or_else(|| OrmError::Config(format!("timezone offset {seconds}s out of range")))
}
