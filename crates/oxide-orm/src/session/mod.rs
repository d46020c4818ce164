//! Sessions: builder verbs, statement execution and connection leasing.
//!
//! A [`Session`] owns a [`Statement`] filled by its fluent verbs and an
//! optional leased connection. Terminal operations (`get`, `find`,
//! `insert`, ...) turn the statement into SQL, run it and reset the
//! statement. Outside a transaction the connection goes back to the pool
//! when a terminal operation returns.
//!
//! ```ignore
//! let mut user = User::default();
//! let found = engine.new_session().id(1).get(&mut user).await?;
//!
//! let adults: Vec<User> = engine
//!     .new_session()
//!     .where_("age > ?", args![18])
//!     .desc(&["id"])
//!     .limit(10, 0)
//!     .find()
//!     .await?;
//! ```

mod cursor;
mod delete;
mod insert;
mod query;
mod raw;
mod scan;
mod schema;
mod update;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use oxide_sql_core::dialect::{apply_filters, count_placeholders, Page};
use oxide_sql_core::{Dialect, Pk, Record, SqlValue, ToSqlValue};

pub use cursor::Cursor;

use crate::context::Context;
use crate::driver::{Connection, ExecResult, Rows};
use crate::engine::Engine;
use crate::error::{OrmError, Result};
use crate::logger::SqlContext;
use crate::statement::{split_names, Cond, InValues, Join, Order, SqlCx, Statement};
use crate::tx::TxState;

/// Callback receiving the record of a write operation.
pub type BeanClosure = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// A unit of work: builder state plus a connection lease.
pub struct Session {
    engine: Engine,
    id: u64,
    conn: Option<Box<dyn Connection>>,
    pub(crate) statement: Statement,
    pub(crate) tx: TxState,
    ctx: Option<Context>,
    before: Vec<BeanClosure>,
    after: Vec<BeanClosure>,
    auto_close: bool,
    closed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected", &self.conn.is_some())
            .field("in_transaction", &self.tx.is_active())
            .field("auto_close", &self.auto_close)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(engine: Engine, auto_close: bool) -> Self {
        let id = engine.next_session_id();
        Self {
            engine,
            id,
            conn: None,
            statement: Statement::default(),
            tx: TxState::default(),
            ctx: None,
            before: Vec::new(),
            after: Vec::new(),
            auto_close,
            closed: false,
        }
    }

    /// The engine this session runs on.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Session id, unique per engine.
    #[must_use]
    pub const fn session_id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the connection and refuses further work. An open
    /// transaction is rolled back by the driver.
    pub fn close(&mut self) {
        if self.tx.is_active() {
            self.engine.log(
                crate::logger::LogLevel::Warn,
                &format!("session {} closed with an open transaction", self.id),
            );
        }
        self.conn = None;
        self.tx = TxState::default();
        self.statement.reset();
        self.closed = true;
    }

    // ---------------------------------------------------------------------
    // Conditions
    // ---------------------------------------------------------------------

    /// Primary-key predicate: a scalar, a tuple for composite keys, or a
    /// [`Pk`].
    pub fn id(&mut self, pk: impl Into<Pk>) -> &mut Self {
        self.statement.id = Some(pk.into());
        self
    }

    /// Adds a hand-written condition with `?` placeholders.
    pub fn where_(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.statement.and(Cond::expr(sql, args));
        self
    }

    /// Same as [`where_`](Self::where_).
    pub fn and(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.where_(sql, args)
    }

    /// ORs a hand-written condition with everything before it.
    pub fn or(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.statement.or(Cond::expr(sql, args));
        self
    }

    /// Adds a condition tree with AND.
    pub fn cond(&mut self, cond: Cond) -> &mut Self {
        self.statement.and(cond);
        self
    }

    /// ORs a condition tree with everything before it.
    pub fn or_cond(&mut self, cond: Cond) -> &mut Self {
        self.statement.or(cond);
        self
    }

    /// `column IN (...)`, from a value list or a [`SubQuery`](crate::SubQuery).
    pub fn in_(&mut self, column: &str, values: impl Into<InValues>) -> &mut Self {
        self.statement.and(Cond::in_list(column, values));
        self
    }

    pub fn not_in(&mut self, column: &str, values: impl Into<InValues>) -> &mut Self {
        self.statement.and(Cond::not_in_list(column, values));
        self
    }

    // ---------------------------------------------------------------------
    // Columns
    // ---------------------------------------------------------------------

    /// Restricts SELECT projections and UPDATE/INSERT columns.
    pub fn cols(&mut self, names: &[&str]) -> &mut Self {
        self.statement.columns.cols.extend(split_names(names));
        self
    }

    /// Excludes columns.
    pub fn omit(&mut self, names: &[&str]) -> &mut Self {
        self.statement.columns.omit.extend(split_names(names));
        self
    }

    /// Columns used even when their field holds the zero value.
    pub fn must_cols(&mut self, names: &[&str]) -> &mut Self {
        self.statement.columns.must.extend(split_names(names));
        self
    }

    /// Zero fields of these nullable columns are written as NULL on UPDATE.
    pub fn nullable(&mut self, names: &[&str]) -> &mut Self {
        self.statement.columns.nullable.extend(split_names(names));
        self
    }

    /// Every column takes part in the UPDATE.
    pub fn all_cols(&mut self) -> &mut Self {
        self.statement.columns.all_cols = true;
        self
    }

    /// Bool columns used as conditions and update values even when false;
    /// no names means every bool column.
    pub fn use_bool(&mut self, names: &[&str]) -> &mut Self {
        self.statement
            .columns
            .use_bool
            .get_or_insert_with(Vec::new)
            .extend(split_names(names));
        self
    }

    /// Replaces the SELECT projection.
    pub fn select(&mut self, projection: &str) -> &mut Self {
        self.statement.select = Some(projection.to_string());
        self
    }

    /// `SELECT DISTINCT` over the given columns.
    pub fn distinct(&mut self, names: &[&str]) -> &mut Self {
        self.statement.distinct = Some(split_names(names));
        self
    }

    // ---------------------------------------------------------------------
    // Shape
    // ---------------------------------------------------------------------

    /// Appends `<op> JOIN <table> ON <on>`; `table` may carry an alias
    /// (`"post p"` or `"post AS p"`).
    pub fn join(&mut self, op: &str, table: &str, on: &str, args: Vec<SqlValue>) -> &mut Self {
        let words: Vec<&str> = table
            .split_whitespace()
            .filter(|w| !w.eq_ignore_ascii_case("AS"))
            .collect();
        let (name, alias) = match words.as_slice() {
            [name, alias, ..] => ((*name).to_string(), Some((*alias).to_string())),
            _ => (table.trim().to_string(), None),
        };
        self.statement.joins.push(Join {
            op: op.to_string(),
            table: name,
            alias,
            on: on.to_string(),
            args,
        });
        self
    }

    /// Joins the table of record type `U`.
    pub fn join_record<U: Record>(
        &mut self,
        op: &str,
        alias: Option<&str>,
        on: &str,
        args: Vec<SqlValue>,
    ) -> &mut Self {
        let table = self.engine.table_name_of(U::descriptor());
        self.statement.joins.push(Join {
            op: op.to_string(),
            table,
            alias: alias.map(str::to_string),
            on: on.to_string(),
            args,
        });
        self
    }

    /// Hand-written ORDER BY clause.
    pub fn order_by(&mut self, clause: &str) -> &mut Self {
        self.statement.order_by.push(Order::Raw(clause.to_string()));
        self
    }

    pub fn asc(&mut self, names: &[&str]) -> &mut Self {
        self.statement
            .order_by
            .extend(split_names(names).into_iter().map(Order::Asc));
        self
    }

    pub fn desc(&mut self, names: &[&str]) -> &mut Self {
        self.statement
            .order_by
            .extend(split_names(names).into_iter().map(Order::Desc));
        self
    }

    pub fn group_by(&mut self, names: &str) -> &mut Self {
        self.statement.group_by = Some(names.to_string());
        self
    }

    pub fn having(&mut self, clause: &str) -> &mut Self {
        self.statement.having = Some(clause.to_string());
        self
    }

    /// At most `limit` rows after skipping `offset`.
    pub fn limit(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.statement.page = Some(Page { limit, offset });
        self
    }

    /// First `n` rows.
    pub fn top(&mut self, n: u64) -> &mut Self {
        self.limit(n, 0)
    }

    /// Locks selected rows until the transaction ends.
    pub fn for_update(&mut self) -> &mut Self {
        self.statement.for_update = true;
        self
    }

    /// Table alias used in generated SQL.
    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.statement.alias = Some(alias.to_string());
        self
    }

    /// Overrides the table name of the next operation.
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.statement.table = Some(name.to_string());
        self
    }

    /// Overrides the table with the one mapped for record type `U`.
    pub fn table_for<U: Record>(&mut self) -> &mut Self {
        self.statement.table = Some(self.engine.table_name_of(U::descriptor()));
        self
    }

    /// Raw SQL replacing generation for the next query.
    pub fn sql(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.statement.raw = Some((sql.to_string(), args));
        self
    }

    // ---------------------------------------------------------------------
    // Update modifiers
    // ---------------------------------------------------------------------

    /// `col = col + n` on the next UPDATE.
    pub fn incr(&mut self, column: &str, n: impl ToSqlValue) -> &mut Self {
        self.statement
            .incr
            .push((column.to_string(), n.to_sql_value()));
        self
    }

    /// `col = col - n` on the next UPDATE.
    pub fn decr(&mut self, column: &str, n: impl ToSqlValue) -> &mut Self {
        self.statement
            .decr
            .push((column.to_string(), n.to_sql_value()));
        self
    }

    /// `col = <expr>` on the next UPDATE.
    pub fn set_expr(&mut self, column: &str, expr: &str) -> &mut Self {
        self.statement
            .exprs
            .push((column.to_string(), expr.to_string()));
        self
    }

    // ---------------------------------------------------------------------
    // Flags
    // ---------------------------------------------------------------------

    /// Non-zero fields of passed records no longer become conditions.
    pub fn no_auto_condition(&mut self) -> &mut Self {
        self.statement.no_auto_condition = true;
        self
    }

    /// Includes soft-deleted rows and makes DELETE physical.
    pub fn unscoped(&mut self) -> &mut Self {
        self.statement.unscoped = true;
        self
    }

    /// Skips the version check and bump on UPDATE.
    pub fn no_versioning(&mut self) -> &mut Self {
        self.statement.no_versioning = true;
        self
    }

    /// Leaves created/updated columns alone.
    pub fn no_auto_time(&mut self) -> &mut Self {
        self.statement.no_auto_time = true;
        self
    }

    /// Bypasses the cache for the next query.
    pub fn no_cache(&mut self) -> &mut Self {
        self.statement.no_cache = true;
        self
    }

    /// Loads cascade fields (default from the engine).
    pub fn cascade(&mut self, enabled: bool) -> &mut Self {
        self.statement.cascade = Some(enabled);
        self
    }

    /// Rows fetched per round trip by [`iterate`](Self::iterate); zero
    /// streams everything through one query.
    pub fn buffer_size(&mut self, size: usize) -> &mut Self {
        self.statement.buffer_size = size;
        self
    }

    /// Cancellation context for every following statement.
    pub fn context(&mut self, ctx: Context) -> &mut Self {
        self.ctx = Some(ctx);
        self
    }

    /// Runs before the next write, once per record.
    pub fn before(&mut self, f: impl Fn(&dyn Any) + Send + Sync + 'static) -> &mut Self {
        self.before.push(Arc::new(f));
        self
    }

    /// Runs after the next write succeeds, once per record; deferred to
    /// commit inside a transaction.
    pub fn after(&mut self, f: impl Fn(&dyn Any) + Send + Sync + 'static) -> &mut Self {
        self.after.push(Arc::new(f));
        self
    }

    // ---------------------------------------------------------------------
    // Execution plumbing
    // ---------------------------------------------------------------------

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(OrmError::SessionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn sql_cx<'d>(&self, dialect: &'d dyn Dialect) -> SqlCx<'d> {
        SqlCx::new(
            dialect,
            self.engine.quoter(),
            self.engine.convert_context(),
        )
    }

    /// Ends a terminal operation: resets the builder and, outside a
    /// transaction, returns the connection.
    pub(crate) fn finish(&mut self) {
        self.statement.reset();
        self.before.clear();
        self.after.clear();
        if !self.tx.is_active() {
            self.conn = None;
            if self.auto_close {
                self.closed = true;
            }
        }
    }

    pub(crate) async fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        if self.conn.is_none() {
            let conn = self.engine.driver().acquire().await?;
            self.conn = Some(conn);
        }
        self.conn.as_mut().ok_or(OrmError::SessionClosed)
    }

    pub(crate) fn take_connection(&mut self) -> Option<Box<dyn Connection>> {
        self.conn.take()
    }

    pub(crate) fn put_connection(&mut self, conn: Option<Box<dyn Connection>>) {
        self.conn = conn;
    }

    fn prepare(&self, sql: &str, args: Vec<SqlValue>) -> Result<(String, Vec<SqlValue>)> {
        self.check_open()?;
        let expected = count_placeholders(sql);
        if expected > args.len() {
            return Err(OrmError::NeedMoreArguments {
                expected,
                got: args.len(),
            });
        }
        let sql = apply_filters(&self.engine.dialect().filters(), sql);
        let cx = self.engine.convert_context();
        Ok((sql, args.into_iter().map(|a| cx.normalize(a)).collect()))
    }

    pub(crate) fn log_sql(
        &self,
        sql: &str,
        args: &[SqlValue],
        elapsed: Option<std::time::Duration>,
        error: Option<&str>,
    ) {
        let Some((logger, with_id)) = self.engine.sql_logger() else {
            return;
        };
        let ctx = SqlContext {
            sql,
            args,
            elapsed,
            session_id: with_id.then_some(self.id),
            error,
        };
        if elapsed.is_none() {
            logger.before_sql(&ctx);
        } else {
            logger.after_sql(&ctx);
        }
    }

    /// Runs a statement that returns no rows.
    pub(crate) async fn exec_sql(&mut self, sql: &str, args: Vec<SqlValue>) -> Result<ExecResult> {
        let (sql, args) = self.prepare(sql, args)?;
        self.log_sql(&sql, &args, None, None);
        let ctx = self.ctx.clone().unwrap_or_default();
        let start = Instant::now();
        let conn = self.connection().await?;
        let result = ctx.run(conn.execute(&sql, &args)).await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.log_sql(&sql, &args, Some(start.elapsed()), error.as_deref());
        result.map_err(|e| e.with_sql(&sql, &args))
    }

    /// Runs a query and buffers its rows.
    pub(crate) async fn query_sql(&mut self, sql: &str, args: Vec<SqlValue>) -> Result<Rows> {
        let (sql, args) = self.prepare(sql, args)?;
        self.log_sql(&sql, &args, None, None);
        let ctx = self.ctx.clone().unwrap_or_default();
        let start = Instant::now();
        let conn = self.connection().await?;
        let result = ctx.run(conn.query(&sql, &args)).await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.log_sql(&sql, &args, Some(start.elapsed()), error.as_deref());
        result.map_err(|e| e.with_sql(&sql, &args))
    }

    // ---------------------------------------------------------------------
    // Hooks
    // ---------------------------------------------------------------------

    pub(crate) fn run_before_closures(&self, bean: &dyn Any) {
        for f in &self.before {
            f(bean);
        }
    }

    /// Runs `hook` and the after-closures on a copy of `bean`, now or at
    /// commit.
    pub(crate) fn queue_after<T: Record>(&mut self, bean: &T, hook: fn(&T)) {
        let bean = bean.clone();
        let closures = self.after.clone();
        let job = Box::new(move || {
            hook(&bean);
            for f in &closures {
                f(&bean);
            }
        });
        if self.tx.is_active() {
            self.tx.defer(job);
        } else {
            job();
        }
    }
}
