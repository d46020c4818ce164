//! # oxide-sql-core
//!
//! Record metadata and SQL dialects for the oxide ORM.
//!
//! This crate provides:
//! - The [`Record`] capability traits implemented by `#[derive(Record)]`
//! - A tag grammar and [`TableParser`] turning record descriptors into
//!   [`Table`] schemas
//! - Name mappers between Rust identifiers and SQL identifiers
//! - Five SQL [`Dialect`]s (MySQL, PostgreSQL, SQL Server, SQLite, Oracle)
//!
//! Nothing here performs I/O; the `oxide-orm` crate executes the SQL.
//!
//! ## Tags
//!
//! A column tag is a space-separated list of tokens:
//!
//! ```rust
//! use oxide_sql_core::schema::tags::{parse_tag, TagToken};
//!
//! let tokens = parse_tag("'user_name' varchar(64) notnull unique").unwrap();
//! assert_eq!(tokens[0], TagToken::Name("user_name".into()));
//! assert!(tokens.contains(&TagToken::NotNull));
//! ```
//!
//! ## Dialects
//!
//! Dialects render identifiers, paging and DDL for their backend:
//!
//! ```rust
//! use oxide_sql_core::dialect::{DbType, Page, SelectParts};
//!
//! let dialect = DbType::Sqlite.dialect();
//! let q = dialect.quoter();
//! let parts = SelectParts {
//!     columns: q.quote("id"),
//!     table: q.quote("user"),
//!     ..SelectParts::default()
//! };
//! let sql = dialect.render_select(&parts, Some(Page { limit: 2, offset: 3 }));
//! assert_eq!(sql, "SELECT \"id\" FROM \"user\" LIMIT 2 OFFSET 3");
//! ```

pub mod dialect;
pub mod error;
pub mod mapper;
pub mod record;
pub mod schema;
pub mod value;

pub use dialect::{DbType, Dialect, QuotePolicy, Quoter};
pub use error::{ConvertError, SchemaError};
pub use mapper::{
    mapper_by_name, GonicMapper, NameMapper, PrefixMapper, SameMapper, SharedMapper, SnakeMapper,
    SuffixMapper,
};
pub use record::{
    ColumnCodec, Conversion, FieldDescriptor, FieldKind, FieldType, HookError, Hooks, Record,
    RecordDescriptor,
};
pub use schema::{Column, Direction, Index, IndexType, SqlType, Table, TableParser};
pub use value::{ConvertContext, Pk, SqlValue, ToSqlValue};
