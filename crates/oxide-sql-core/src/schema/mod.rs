//! Table metadata derived from record descriptors.
//!
//! [`TableParser`] turns a [`RecordDescriptor`](crate::record::RecordDescriptor)
//! into a [`Table`]: physical column names, SQL types, roles and indexes.

pub mod parser;
pub mod tags;
pub mod types;

use serde::Serialize;

pub use parser::TableParser;
pub use types::{names, SqlType};

use crate::record::{ColumnCodec, FieldKind, RecordDescriptor};

/// Which way values flow for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    #[default]
    Both,
    /// Written on INSERT/UPDATE, never read back.
    OnlyToDb,
    /// Read from SELECT results, never written.
    OnlyFromDb,
}

/// Index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexType {
    Index,
    Unique,
}

/// A named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    /// Logical name (the tag group, or the column name).
    pub name: String,
    pub index_type: IndexType,
    /// Column names in declaration order.
    pub columns: Vec<String>,
}

impl Index {
    /// Creates an index.
    #[must_use]
    pub fn new(name: &str, index_type: IndexType) -> Self {
        Self {
            name: name.to_string(),
            index_type,
            columns: Vec::new(),
        }
    }

    /// Physical index name: `IDX_<table>_<name>` or `UQE_<table>_<name>`.
    #[must_use]
    pub fn x_name(&self, table: &str) -> String {
        let table = table.replace(['"', '`', '[', ']'], "").replace('.', "_");
        if self.name.starts_with("UQE_") || self.name.starts_with("IDX_") {
            return self.name.clone();
        }
        match self.index_type {
            IndexType::Unique => format!("UQE_{table}_{}", self.name),
            IndexType::Index => format!("IDX_{table}_{}", self.name),
        }
    }

    /// Same kind over the same columns (order-sensitive).
    #[must_use]
    pub fn equal_shape(&self, other: &Self) -> bool {
        self.index_type == other.index_type
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// One mapped column.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Physical column name.
    pub name: String,
    /// Dotted field path inside the record.
    pub field_path: String,
    pub sql_type: SqlType,
    /// Kind of the backing field.
    #[serde(skip)]
    pub kind: FieldKind,
    #[serde(skip)]
    pub codec: ColumnCodec,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub direction: Direction,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
    pub is_version: bool,
    pub is_created: bool,
    pub is_updated: bool,
    pub is_deleted: bool,
    /// Store and read times as UTC regardless of the engine's database zone.
    pub utc: bool,
    /// Referenced record, for cascade columns.
    #[serde(skip)]
    pub cascade: Option<fn() -> &'static RecordDescriptor>,
    /// Names of the indexes this column belongs to.
    pub indexes: Vec<String>,
}

impl Column {
    /// Creates a plain column of the given type.
    #[must_use]
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            field_path: String::new(),
            sql_type,
            kind: FieldKind::String,
            codec: ColumnCodec::Primitive,
            nullable: true,
            default: None,
            comment: None,
            direction: Direction::Both,
            is_primary_key: false,
            is_auto_increment: false,
            is_version: false,
            is_created: false,
            is_updated: false,
            is_deleted: false,
            utc: false,
            cascade: None,
            indexes: Vec::new(),
        }
    }

    /// Whether the column takes part in INSERT/UPDATE.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.direction != Direction::OnlyFromDb
    }

    /// Whether the column is read back from SELECT results.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.direction != Direction::OnlyToDb
    }

    /// Whether the column's value is produced by the engine (created/updated/deleted).
    #[must_use]
    pub fn is_time_role(&self) -> bool {
        self.is_created || self.is_updated || self.is_deleted
    }
}

/// A mapped relation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    pub name: String,
    /// Rust type the table was parsed from; empty for introspected tables.
    pub type_name: String,
    pub columns: Vec<Column>,
    /// Primary-key column names in declaration order.
    pub primary_keys: Vec<String>,
    pub indexes: Vec<Index>,
    pub auto_increment: Option<String>,
    pub version: Option<String>,
    pub created: Vec<String>,
    pub updated: Option<String>,
    pub deleted: Option<String>,
    /// Per-table cache policy from `cache` / `nocache` tags.
    pub cache: Option<bool>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Case-insensitive column lookup.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column backed by the given field path.
    #[must_use]
    pub fn column_by_path(&self, path: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field_path == path)
    }

    /// Primary-key columns in declaration order.
    pub fn pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_keys.iter().filter_map(|name| self.column(name))
    }

    /// Field paths of the primary-key columns.
    #[must_use]
    pub fn pk_paths(&self) -> Vec<String> {
        self.pk_columns().map(|c| c.field_path.clone()).collect()
    }

    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.auto_increment.as_deref().and_then(|n| self.column(n))
    }

    pub fn version_column(&self) -> Option<&Column> {
        self.version.as_deref().and_then(|n| self.column(n))
    }

    pub fn updated_column(&self) -> Option<&Column> {
        self.updated.as_deref().and_then(|n| self.column(n))
    }

    pub fn deleted_column(&self) -> Option<&Column> {
        self.deleted.as_deref().and_then(|n| self.column(n))
    }

    /// Index by logical name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Adds a column and records its roles.
    pub fn add_column(&mut self, column: Column) {
        if column.is_primary_key {
            self.primary_keys.push(column.name.clone());
        }
        if column.is_auto_increment {
            self.auto_increment = Some(column.name.clone());
        }
        if column.is_version {
            self.version = Some(column.name.clone());
        }
        if column.is_created {
            self.created.push(column.name.clone());
        }
        if column.is_updated {
            self.updated = Some(column.name.clone());
        }
        if column.is_deleted {
            self.deleted = Some(column.name.clone());
        }
        self.columns.push(column);
    }

    /// Adds an index.
    pub fn add_index(&mut self, index: Index) {
        self.indexes.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_physical_names() {
        let idx = Index::new("name_email", IndexType::Unique);
        assert_eq!(idx.x_name("user"), "UQE_user_name_email");
        let idx = Index::new("created", IndexType::Index);
        assert_eq!(idx.x_name("public.user"), "IDX_public_user_created");
    }

    #[test]
    fn test_table_roles_follow_columns() {
        let mut table = Table::new("user");
        let mut id = Column::new("id", SqlType::new("BIGINT"));
        id.is_primary_key = true;
        id.is_auto_increment = true;
        table.add_column(id);
        let mut ver = Column::new("ver", SqlType::new("INT"));
        ver.is_version = true;
        table.add_column(ver);

        assert_eq!(table.primary_keys, vec!["id"]);
        assert_eq!(table.auto_increment.as_deref(), Some("id"));
        assert!(table.version_column().is_some());
        assert!(table.column("VER").is_some());
    }
}
