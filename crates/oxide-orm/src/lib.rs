//! # oxide-orm
//!
//! A tag-driven ORM: records declare their columns through
//! `#[derive(Record)]` tags, an [`Engine`] maps them to tables, and
//! [`Session`]s build, run and scan SQL for them.
//!
//! This crate provides:
//! - [`Engine`]: connection pool, dialect, name mappers, logger and caches
//! - [`Session`]: fluent statement builder plus CRUD, raw SQL and cursors
//! - Nested transactions with [`Propagation`] policies and savepoints
//! - A second-level cache of beans and id lists ([`Cacher`], [`LruCacher`])
//! - [`EngineGroup`]: primary/replica routing with pluggable policies
//! - Schema synchronization and introspection
//!
//! ## Quick Start
//!
//! ```ignore
//! use oxide_orm::{args, Engine, Record};
//!
//! #[derive(Debug, Clone, Default, Record)]
//! struct User {
//!     #[orm("pk autoincr")]
//!     id: i64,
//!     #[orm("varchar(64) notnull unique")]
//!     name: String,
//!     age: i32,
//!     #[orm("version")]
//!     version: i32,
//!     #[orm("created")]
//!     created_at: Option<chrono::NaiveDateTime>,
//! }
//!
//! async fn example() -> oxide_orm::Result<()> {
//!     let engine = Engine::open("sqlite", "sqlite::memory:").await?;
//!     engine.sync::<User>().await?;
//!
//!     let mut ada = User { name: "ada".into(), age: 36, ..User::default() };
//!     engine.insert(&mut ada).await?;          // ada.id, version and created_at are set
//!
//!     let adults: Vec<User> = engine
//!         .where_("age > ?", args![18])
//!         .desc(&["id"])
//!         .limit(10, 0)
//!         .find()
//!         .await?;
//!
//!     ada.age = 37;
//!     engine.id(ada.id).update(&mut ada).await?; // checks and bumps the version
//!     Ok(())
//! }
//! ```
//!
//! ## Transactions
//!
//! ```ignore
//! use oxide_orm::Propagation;
//!
//! let mut session = engine.new_session();
//! let tx = session.begin_tx(Propagation::Required).await?;
//! session.insert(&mut order).await?;
//! session.commit_tx(tx).await?;  // after-hooks run here
//! ```
//!
//! ## Caching
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxide_orm::LruCacher;
//!
//! engine.set_default_cacher(Some(Arc::new(LruCacher::new(1000))));
//! ```

pub mod cache;
mod config;
mod context;
pub mod driver;
mod engine;
mod error;
pub mod group;
pub mod logger;
mod session;
pub mod statement;
mod tx;

pub use cache::{Cacher, LruCacher};
pub use config::EngineConfig;
pub use context::Context;
pub use driver::{Connection, Driver, ExecResult, PoolConfig, PoolStats, Row, Rows, SqliteDriver};
pub use engine::Engine;
pub use error::{OrmError, Result};
pub use group::{EngineGroup, GroupPolicy};
pub use logger::{LogLevel, Logger, SqlContext, TracingLogger};
pub use session::{BeanClosure, Cursor, Session};
pub use statement::{Cond, InValues};
pub use tx::{Propagation, Transaction};

// Re-export commonly used types from oxide-sql-core
pub use oxide_sql_core::{
    args, ConvertContext, DbType, Dialect, HookError, Hooks, NameMapper, Pk, QuotePolicy, Record,
    RecordDescriptor, SqlValue, Table, ToSqlValue,
};
pub use oxide_sql_derive::Record;
