//! Record descriptor to [`Table`] translation.

use std::sync::Arc;

use super::tags::{parse_tag, TagToken};
use super::types::SqlType;
use super::{Column, Direction, Index, IndexType, Table};
use crate::error::SchemaError;
use crate::mapper::{SharedMapper, SnakeMapper};
use crate::record::{ColumnCodec, FieldKind, RecordDescriptor};

/// Builds [`Table`]s using a table-name mapper and a column-name mapper.
#[derive(Debug, Clone)]
pub struct TableParser {
    pub table_mapper: SharedMapper,
    pub column_mapper: SharedMapper,
}

impl Default for TableParser {
    fn default() -> Self {
        Self {
            table_mapper: Arc::new(SnakeMapper),
            column_mapper: Arc::new(SnakeMapper),
        }
    }
}

impl TableParser {
    /// Creates a parser from both mappers.
    #[must_use]
    pub fn new(table_mapper: SharedMapper, column_mapper: SharedMapper) -> Self {
        Self {
            table_mapper,
            column_mapper,
        }
    }

    /// Table name of a record: the `table_name` hook, then the `table`
    /// attribute, then the table mapper.
    #[must_use]
    pub fn table_name(&self, desc: &RecordDescriptor) -> String {
        (desc.hook_table_name)()
            .or_else(|| desc.table_name.map(str::to_string))
            .unwrap_or_else(|| self.table_mapper.obj2table(desc.type_name))
    }

    /// Parses a record descriptor.
    ///
    /// # Errors
    ///
    /// Fails on ill-formed tags and on table-shape violations.
    pub fn parse(&self, desc: &RecordDescriptor) -> Result<Table, SchemaError> {
        let mut table = Table::new(&self.table_name(desc));
        table.type_name = desc.type_name.to_string();
        self.parse_fields(desc, "", "", &mut table)?;

        if table.primary_keys.is_empty() {
            promote_id(&mut table);
        }
        Ok(table)
    }

    fn parse_fields(
        &self,
        desc: &RecordDescriptor,
        path_prefix: &str,
        column_prefix: &str,
        table: &mut Table,
    ) -> Result<(), SchemaError> {
        for field in desc.fields {
            let path = format!("{path_prefix}{}", field.name);
            let tokens = parse_tag(field.tag).map_err(|reason| SchemaError::InvalidTag {
                field: path.clone(),
                reason,
            })?;
            if tokens.contains(&TagToken::Skip) {
                continue;
            }

            if let Some(inner) = field.embedded {
                let extra = tokens
                    .iter()
                    .find_map(|t| match t {
                        TagToken::Extends(prefix) => prefix.clone(),
                        _ => None,
                    })
                    .unwrap_or_default();
                self.parse_fields(
                    inner(),
                    &format!("{path}."),
                    &format!("{column_prefix}{extra}"),
                    table,
                )?;
                continue;
            }

            let mut name = None;
            let mut sql_type = None;
            let mut column = Column::new("", SqlType::new("TEXT"));
            let mut unique_groups = Vec::new();
            let mut index_groups = Vec::new();

            for token in tokens {
                match token {
                    TagToken::Name(n) => name = Some(n),
                    TagToken::Type(t) => sql_type = Some(t),
                    TagToken::PrimaryKey => column.is_primary_key = true,
                    TagToken::AutoIncrement => column.is_auto_increment = true,
                    TagToken::Version => column.is_version = true,
                    TagToken::Created => column.is_created = true,
                    TagToken::Updated => column.is_updated = true,
                    TagToken::Deleted => column.is_deleted = true,
                    TagToken::NotNull => column.nullable = false,
                    TagToken::Null => column.nullable = true,
                    TagToken::Unique(group) => unique_groups.push(group),
                    TagToken::Index(group) => index_groups.push(group),
                    TagToken::Default(expr) => column.default = Some(expr),
                    TagToken::Comment(text) => column.comment = Some(text),
                    TagToken::Cache => table.cache = Some(true),
                    TagToken::NoCache => table.cache = Some(false),
                    TagToken::Utc => column.utc = true,
                    TagToken::OnlyToDb => column.direction = Direction::OnlyToDb,
                    TagToken::OnlyFromDb => column.direction = Direction::OnlyFromDb,
                    TagToken::Skip | TagToken::Extends(_) => {}
                }
            }

            column.name = format!(
                "{column_prefix}{}",
                name.unwrap_or_else(|| self.column_mapper.obj2table(field.name))
            );
            column.field_path = path;
            column.kind = field.kind;
            column.codec = field.codec;
            column.cascade = field.related;
            column.sql_type = sql_type.unwrap_or_else(|| default_type(field.kind, field.related));
            if column.is_auto_increment {
                column.is_primary_key = true;
            }
            if column.is_primary_key {
                column.nullable = false;
            }

            let roles = [column.is_created, column.is_updated, column.is_deleted]
                .iter()
                .filter(|r| **r)
                .count();
            if roles > 1 {
                return Err(SchemaError::ConflictingTimeRole(column.name));
            }
            if table.column(&column.name).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name,
                });
            }
            if column.is_auto_increment && table.auto_increment.is_some() {
                return Err(SchemaError::MultipleAutoIncrement(table.name.clone()));
            }
            if column.is_version && table.version.is_some() {
                return Err(SchemaError::MultipleVersion(table.name.clone()));
            }

            for (groups, index_type) in [(unique_groups, IndexType::Unique), (index_groups, IndexType::Index)] {
                for group in groups {
                    let index_name = group.unwrap_or_else(|| column.name.clone());
                    add_to_index(table, &index_name, index_type, &column.name);
                    column.indexes.push(index_name);
                }
            }
            table.add_column(column);
        }
        Ok(())
    }
}

fn default_type(kind: FieldKind, related: Option<fn() -> &'static RecordDescriptor>) -> SqlType {
    let Some(related) = related else {
        return SqlType::from_kind(kind);
    };
    let target = related();
    target
        .primary_key_paths()
        .first()
        .and_then(|path| target.field(path))
        .map_or_else(|| SqlType::from_kind(kind), |f| SqlType::from_kind(f.kind))
}

fn add_to_index(table: &mut Table, name: &str, index_type: IndexType, column: &str) {
    if let Some(index) = table
        .indexes
        .iter_mut()
        .find(|i| i.name == name && i.index_type == index_type)
    {
        index.columns.push(column.to_string());
        return;
    }
    let mut index = Index::new(name, index_type);
    index.columns.push(column.to_string());
    table.add_index(index);
}

/// An integer `id` column becomes the auto-increment primary key when no
/// primary key is declared.
fn promote_id(table: &mut Table) {
    let has_autoincr = table.auto_increment.is_some();
    let Some(column) = table.columns.iter_mut().find(|c| {
        c.name.eq_ignore_ascii_case("id") && c.kind.is_integer() && c.codec == ColumnCodec::Primitive
    }) else {
        return;
    };
    column.is_primary_key = true;
    column.nullable = false;
    table.primary_keys.push(column.name.clone());
    if !has_autoincr {
        column.is_auto_increment = true;
        table.auto_increment = Some(column.name.clone());
    }
}
