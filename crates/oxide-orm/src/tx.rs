//! Transactions with propagation policies.
//!
//! A session owns at most one database transaction. Nested logical
//! transactions either join it, suspend it (the session moves to a fresh
//! connection and restores the old one afterwards) or mark a savepoint in
//! it, depending on the [`Propagation`] they are started with.
//!
//! ```ignore
//! let mut session = engine.new_session();
//! let outer = session.begin_tx(Propagation::Required).await?;
//! session.insert(&mut order).await?;
//!
//! let inner = session.begin_tx(Propagation::Nested).await?;
//! if session.insert(&mut line).await.is_err() {
//!     // `line` is undone when `outer` commits; `order` is kept
//!     session.rollback_tx(inner).await?;
//! } else {
//!     session.commit_tx(inner).await?;
//! }
//! session.commit_tx(outer).await?;
//! ```

use std::fmt;
use std::mem;
use std::str::FromStr;
use std::time::Instant;

use futures::future::BoxFuture;

use crate::driver::Connection;
use crate::error::{OrmError, Result};
use crate::logger::LogLevel;
use crate::session::Session;

/// A deferred after-hook.
pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// How a logical transaction relates to one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the running transaction or begin one.
    #[default]
    Required,
    /// Join the running transaction, or run without one.
    Supports,
    /// Join the running transaction; fail without one.
    Mandatory,
    /// Suspend the running transaction and begin a new one.
    RequiresNew,
    /// Suspend the running transaction and run without one.
    NotSupported,
    /// Fail when a transaction is running.
    Never,
    /// Mark a savepoint in the running transaction, or begin one.
    Nested,
}

impl Propagation {
    const ALL: [Self; 7] = [
        Self::Required,
        Self::Supports,
        Self::Mandatory,
        Self::RequiresNew,
        Self::NotSupported,
        Self::Never,
        Self::Nested,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Supports => "SUPPORTS",
            Self::Mandatory => "MANDATORY",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Never => "NEVER",
            Self::Nested => "NESTED",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for Propagation {
    type Error = OrmError;

    fn try_from(value: i32) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| OrmError::TransactionDefinition(value.to_string()))
    }
}

impl FromStr for Propagation {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_uppercase().replace('-', "_");
        let name = name.strip_prefix("PROPAGATION_").unwrap_or(&name);
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| OrmError::TransactionDefinition(s.to_string()))
    }
}

#[derive(Debug)]
struct Savepoint {
    name: String,
    seq: u64,
    /// Deferred hooks queued before the savepoint.
    hooks_len: usize,
}

/// Transaction bookkeeping of one session.
#[derive(Default)]
pub(crate) struct TxState {
    active: bool,
    rollback_only: bool,
    savepoints: Vec<Savepoint>,
    /// Earliest rolled-back savepoint, rolled back to on commit.
    pending: Option<Savepoint>,
    hooks: Vec<Job>,
    seq: u64,
}

impl fmt::Debug for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxState")
            .field("active", &self.active)
            .field("rollback_only", &self.rollback_only)
            .field("savepoints", &self.savepoints)
            .field("pending", &self.pending)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl TxState {
    pub(crate) const fn is_active(&self) -> bool {
        self.active
    }

    /// Queues an after-hook until commit.
    pub(crate) fn defer(&mut self, job: Job) {
        self.hooks.push(job);
    }
}

/// An outer transaction parked while an inner scope runs.
struct Suspended {
    conn: Option<Box<dyn Connection>>,
    state: TxState,
}

enum Kind {
    /// Began the database transaction.
    Owner { resume: Option<Suspended> },
    /// Joined a running transaction.
    Joined,
    /// Runs without a transaction.
    NonTransactional { resume: Option<Suspended> },
    Savepoint { name: String },
}

/// Handle of a logical transaction started by [`Session::begin_tx`]; pass
/// it back to [`Session::commit_tx`] or [`Session::rollback_tx`].
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction {
    propagation: Propagation,
    kind: Kind,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Owner { .. } => "owner",
            Kind::Joined => "joined",
            Kind::NonTransactional { .. } => "non-transactional",
            Kind::Savepoint { .. } => "savepoint",
        };
        f.debug_struct("Transaction")
            .field("propagation", &self.propagation)
            .field("kind", &kind)
            .finish()
    }
}

impl Transaction {
    #[must_use]
    pub const fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Savepoint name, for nested transactions.
    #[must_use]
    pub fn savepoint(&self) -> Option<&str> {
        match &self.kind {
            Kind::Savepoint { name } => Some(name),
            _ => None,
        }
    }
}

impl Session {
    /// Whether a database transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_active()
    }

    async fn run_tx_statement(&mut self, sql: &str, op: TxOp) -> Result<()> {
        self.check_open()?;
        self.log_sql(sql, &[], None, None);
        let start = Instant::now();
        let conn = self.connection().await?;
        let result = match op {
            TxOp::Begin => conn.begin(sql).await,
            TxOp::Commit => conn.commit(sql).await,
            TxOp::Rollback => conn.rollback(sql).await,
            TxOp::Exec => conn.execute(sql, &[]).await.map(|_| ()),
        };
        let error = result.as_ref().err().map(ToString::to_string);
        self.log_sql(sql, &[], Some(start.elapsed()), error.as_deref());
        result.map_err(|e| e.with_sql(sql, &[]))
    }

    /// Begins a database transaction; a no-op when one is open.
    ///
    /// # Errors
    ///
    /// Fails when the session is closed or the driver refuses.
    pub async fn begin(&mut self) -> Result<()> {
        if self.tx.is_active() {
            return Ok(());
        }
        let sql = self.engine().dialect().begin_sql();
        self.run_tx_statement(sql, TxOp::Begin).await?;
        self.tx = TxState {
            active: true,
            ..TxState::default()
        };
        Ok(())
    }

    /// Commits the open transaction and runs the queued after-hooks; a
    /// no-op outside a transaction. A pending nested rollback is applied
    /// first, discarding everything done since its savepoint.
    ///
    /// # Errors
    ///
    /// [`OrmError::RollbackOnly`] when a joined scope rolled back; the
    /// transaction is rolled back instead.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.tx.is_active() {
            return Ok(());
        }
        if self.tx.rollback_only {
            self.rollback().await?;
            return Err(OrmError::RollbackOnly);
        }
        if let Some(savepoint) = self.tx.pending.take() {
            let sql = self
                .engine()
                .dialect()
                .rollback_to_savepoint_sql(&savepoint.name);
            if let Err(e) = self.run_tx_statement(&sql, TxOp::Exec).await {
                if let Err(rollback) = self.rollback().await {
                    self.engine()
                        .log(LogLevel::Error, &format!("rollback failed: {rollback}"));
                }
                return Err(e);
            }
            self.tx.hooks.truncate(savepoint.hooks_len);
        }
        let sql = self.engine().dialect().commit_sql();
        let result = self.run_tx_statement(sql, TxOp::Commit).await;
        let state = mem::take(&mut self.tx);
        self.finish();
        result?;
        for job in state.hooks {
            job();
        }
        Ok(())
    }

    /// Rolls back the open transaction and drops the queued after-hooks;
    /// a no-op outside a transaction.
    ///
    /// # Errors
    ///
    /// Fails when the driver refuses.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.tx.is_active() {
            return Ok(());
        }
        let sql = self.engine().dialect().rollback_sql();
        let result = self.run_tx_statement(sql, TxOp::Rollback).await;
        self.tx = TxState::default();
        self.finish();
        result
    }

    fn suspend(&mut self) -> Suspended {
        Suspended {
            conn: self.take_connection(),
            state: mem::take(&mut self.tx),
        }
    }

    fn resume(&mut self, suspended: Option<Suspended>) {
        if let Some(s) = suspended {
            self.put_connection(s.conn);
            self.tx = s.state;
        }
    }

    /// Starts a logical transaction under `propagation`.
    ///
    /// # Errors
    ///
    /// [`OrmError::NotInTransaction`] for `Mandatory` without a running
    /// transaction, [`OrmError::NestedTransaction`] for `Never` inside
    /// one, or driver errors.
    pub async fn begin_tx(&mut self, propagation: Propagation) -> Result<Transaction> {
        self.check_open()?;
        let active = self.tx.is_active();
        let kind = match (propagation, active) {
            (Propagation::Required | Propagation::Supports | Propagation::Mandatory, true) => {
                Kind::Joined
            }
            (Propagation::Required | Propagation::Nested, false) => {
                self.begin().await?;
                Kind::Owner { resume: None }
            }
            (Propagation::Supports | Propagation::NotSupported | Propagation::Never, false) => {
                Kind::NonTransactional { resume: None }
            }
            (Propagation::Mandatory, false) => return Err(OrmError::NotInTransaction),
            (Propagation::RequiresNew, _) => {
                let resume = active.then(|| self.suspend());
                if let Err(e) = self.begin().await {
                    self.resume(resume);
                    return Err(e);
                }
                Kind::Owner { resume }
            }
            (Propagation::NotSupported, true) => Kind::NonTransactional {
                resume: Some(self.suspend()),
            },
            (Propagation::Never, true) => {
                return Err(OrmError::NestedTransaction(propagation.name().into()))
            }
            (Propagation::Nested, true) => {
                self.tx.seq += 1;
                let name = format!("sp_{}_{}", self.tx.savepoints.len() + 1, self.tx.seq);
                let sql = self.engine().dialect().savepoint_sql(&name);
                self.run_tx_statement(&sql, TxOp::Exec).await?;
                self.tx.savepoints.push(Savepoint {
                    name: name.clone(),
                    seq: self.tx.seq,
                    hooks_len: self.tx.hooks.len(),
                });
                Kind::Savepoint { name }
            }
        };
        Ok(Transaction { propagation, kind })
    }

    /// Completes a logical transaction.
    ///
    /// Owners commit, savepoints are released, joined scopes leave the
    /// decision to the owner. A suspended outer transaction is restored.
    ///
    /// # Errors
    ///
    /// Commit failures, including [`OrmError::RollbackOnly`].
    pub async fn commit_tx(&mut self, tx: Transaction) -> Result<()> {
        match tx.kind {
            Kind::Owner { resume } => {
                let result = self.commit().await;
                self.resume(resume);
                result
            }
            Kind::Joined => Ok(()),
            Kind::NonTransactional { resume } => {
                self.resume(resume);
                Ok(())
            }
            Kind::Savepoint { name } => {
                let Some(pos) = self.tx.savepoints.iter().position(|s| s.name == name) else {
                    // Already rolled back.
                    return Ok(());
                };
                // Releasing would also drop the pending savepoint.
                if self.tx.pending.is_none() {
                    if let Some(sql) = self.engine().dialect().release_savepoint_sql(&name) {
                        self.run_tx_statement(&sql, TxOp::Exec).await?;
                    }
                }
                self.tx.savepoints.truncate(pos);
                Ok(())
            }
        }
    }

    /// Abandons a logical transaction.
    ///
    /// Owners roll back and joined scopes mark the transaction
    /// rollback-only. A savepoint becomes pending: the owner's commit rolls
    /// back to it before committing, so work done after it is discarded. A
    /// suspended outer transaction is restored.
    ///
    /// # Errors
    ///
    /// Rollback failures.
    pub async fn rollback_tx(&mut self, tx: Transaction) -> Result<()> {
        match tx.kind {
            Kind::Owner { resume } => {
                let result = self.rollback().await;
                self.resume(resume);
                result
            }
            Kind::Joined => {
                if self.tx.is_active() {
                    self.tx.rollback_only = true;
                }
                Ok(())
            }
            Kind::NonTransactional { resume } => {
                self.resume(resume);
                Ok(())
            }
            Kind::Savepoint { name } => {
                let Some(pos) = self.tx.savepoints.iter().position(|s| s.name == name) else {
                    return Ok(());
                };
                let Some(savepoint) = self.tx.savepoints.drain(pos..).next() else {
                    return Ok(());
                };
                self.tx.hooks.truncate(savepoint.hooks_len);
                if !self.tx.pending.as_ref().is_some_and(|p| p.seq < savepoint.seq) {
                    self.tx.pending = Some(savepoint);
                }
                Ok(())
            }
        }
    }

    /// Runs `f` inside a logical transaction, committing on `Ok` and
    /// rolling back on `Err`.
    ///
    /// # Errors
    ///
    /// The error of `f`, or of the commit.
    pub async fn transaction<T, F>(&mut self, propagation: Propagation, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Self) -> BoxFuture<'s, Result<T>>,
    {
        let tx = self.begin_tx(propagation).await?;
        match f(&mut *self).await {
            Ok(value) => {
                self.commit_tx(tx).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_tx(tx).await {
                    self.engine()
                        .log(LogLevel::Error, &format!("rollback failed: {rollback}"));
                }
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum TxOp {
    Begin,
    Commit,
    Rollback,
    Exec,
}
