//! Record capability traits.
//!
//! A record is a plain struct whose fields map onto table columns. The
//! `#[derive(Record)]` macro implements [`Record`] for it, producing a static
//! [`RecordDescriptor`] plus accessors addressed by field path. Paths of
//! flattened sub-records are dotted (`"audit.created_at"`).

mod codec;
mod field;

use std::any::TypeId;

pub use codec::{
    conversion_decode, conversion_encode, json_decode, json_encode, json_is_zero, related_assign,
    related_decode, related_encode, ColumnCodec, Conversion,
};
pub use field::{FieldKind, FieldType};

use crate::error::ConvertError;
use crate::schema::tags::{parse_tag, TagToken};
use crate::value::{ConvertContext, Pk, SqlValue};

/// Error type returned by user hooks and conversions.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Compile-time description of one struct field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// Raw column tag.
    pub tag: &'static str,
    /// Field kind.
    pub kind: FieldKind,
    /// Whether the Rust type can hold NULL.
    pub nullable: bool,
    /// How values move between the field and its column.
    pub codec: ColumnCodec,
    /// Descriptor of the flattened sub-record, for `extends` fields.
    pub embedded: Option<fn() -> &'static RecordDescriptor>,
    /// Descriptor of the referenced record, for cascade fields.
    pub related: Option<fn() -> &'static RecordDescriptor>,
}

/// Compile-time description of a record type.
#[derive(Debug, Clone, Copy)]
pub struct RecordDescriptor {
    /// Rust type name.
    pub type_name: &'static str,
    /// Table name fixed by `#[orm(table = "...")]`.
    pub table_name: Option<&'static str>,
    /// Mapped fields in declaration order.
    pub fields: &'static [FieldDescriptor],
    /// Type identity, used as registry key.
    pub type_id: fn() -> TypeId,
    /// Name reported by [`Hooks::table_name`] on a default value.
    pub hook_table_name: fn() -> Option<String>,
}

impl RecordDescriptor {
    /// Field paths of primary-key fields, in declaration order.
    ///
    /// Falls back to an integer field named `id` when no field is tagged `pk`.
    #[must_use]
    pub fn primary_key_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_pk_paths("", &mut paths);
        if paths.is_empty() {
            if let Some(field) = self
                .fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case("id") && f.kind.is_integer())
            {
                paths.push(field.name.to_string());
            }
        }
        paths
    }

    fn collect_pk_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for field in self.fields {
            let path = format!("{prefix}{}", field.name);
            if let Some(inner) = field.embedded {
                inner().collect_pk_paths(&format!("{path}."), out);
                continue;
            }
            let is_pk = parse_tag(field.tag)
                .map(|tokens| tokens.contains(&TagToken::PrimaryKey))
                .unwrap_or(false);
            if is_pk {
                out.push(path);
            }
        }
    }

    /// Looks up a field by path, descending into flattened sub-records.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&'static FieldDescriptor> {
        match path.split_once('.') {
            Some((head, rest)) => {
                let field = self.fields.iter().find(|f| f.name == head)?;
                field.embedded.and_then(|inner| inner().field(rest))
            }
            None => self.fields.iter().find(|f| f.name == path),
        }
    }
}

/// Optional lifecycle capabilities of a record.
///
/// `#[derive(Record)]` emits an empty implementation unless the struct is
/// annotated with `#[orm(hooks)]`, in which case the user writes it.
#[allow(unused_variables)]
pub trait Hooks {
    /// Overrides the mapped table name.
    fn table_name(&self) -> Option<String> {
        None
    }

    /// Runs before the INSERT is built.
    ///
    /// # Errors
    ///
    /// An error aborts the insert.
    fn before_insert(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the INSERT succeeded (on commit inside a transaction).
    fn after_insert(&self) {}

    /// Runs before the UPDATE is built.
    ///
    /// # Errors
    ///
    /// An error aborts the update.
    fn before_update(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the UPDATE succeeded.
    fn after_update(&self) {}

    /// Runs before the DELETE is built.
    ///
    /// # Errors
    ///
    /// An error aborts the delete.
    fn before_delete(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the DELETE succeeded.
    fn after_delete(&self) {}

    /// Runs before a column value is assigned during row scanning.
    fn before_set(&mut self, column: &str, value: &SqlValue) {}

    /// Runs after a column value was assigned during row scanning.
    fn after_set(&mut self, column: &str, value: &SqlValue) {}

    /// Runs once a row has been fully materialized.
    fn after_load(&mut self) {}
}

/// A struct mapped onto a table.
pub trait Record: Hooks + Default + Clone + Send + Sync + 'static {
    /// Static description of the record's fields.
    fn descriptor() -> &'static RecordDescriptor;

    /// Reads a field as a SQL value.
    ///
    /// # Errors
    ///
    /// Fails for unknown paths or when the codec cannot encode the value.
    fn get_field(&self, path: &str, cx: &ConvertContext) -> Result<SqlValue, ConvertError>;

    /// Assigns a SQL value to a field.
    ///
    /// # Errors
    ///
    /// Fails for unknown paths or when the value cannot be converted.
    fn set_field(
        &mut self,
        path: &str,
        value: SqlValue,
        cx: &ConvertContext,
    ) -> Result<(), ConvertError>;

    /// Whether the field holds the zero value of its type.
    fn is_zero_field(&self, path: &str) -> bool;

    /// Fills a cascade field from the related row's `(field path, value)` pairs.
    ///
    /// # Errors
    ///
    /// Fails when `path` is not a cascade field.
    fn set_related(
        &mut self,
        path: &str,
        values: &[(String, SqlValue)],
        cx: &ConvertContext,
    ) -> Result<(), ConvertError> {
        let _ = (values, cx);
        Err(ConvertError::UnknownField(path.to_string()))
    }

    /// Reads the primary-key tuple at the given field paths.
    ///
    /// # Errors
    ///
    /// Propagates field read failures.
    fn pk_at(&self, paths: &[String], cx: &ConvertContext) -> Result<Pk, ConvertError> {
        paths
            .iter()
            .map(|p| self.get_field(p, cx).map(|v| cx.normalize(v)))
            .collect::<Result<Vec<_>, _>>()
            .map(Pk::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Audit;

    static AUDIT_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor {
        name: "tenant",
        tag: "pk",
        kind: FieldKind::I64,
        nullable: false,
        codec: ColumnCodec::Primitive,
        embedded: None,
        related: None,
    }];

    static AUDIT: RecordDescriptor = RecordDescriptor {
        type_name: "Audit",
        table_name: None,
        fields: &AUDIT_FIELDS,
        type_id: TypeId::of::<Audit>,
        hook_table_name: || None,
    };

    fn audit() -> &'static RecordDescriptor {
        &AUDIT
    }

    static ROW_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor {
            name: "audit",
            tag: "extends",
            kind: FieldKind::Embedded,
            nullable: false,
            codec: ColumnCodec::Embedded,
            embedded: Some(audit),
            related: None,
        },
        FieldDescriptor {
            name: "code",
            tag: "pk 'code'",
            kind: FieldKind::String,
            nullable: false,
            codec: ColumnCodec::Primitive,
            embedded: None,
            related: None,
        },
    ];

    static ROW: RecordDescriptor = RecordDescriptor {
        type_name: "Row",
        table_name: None,
        fields: &ROW_FIELDS,
        type_id: TypeId::of::<Audit>,
        hook_table_name: || None,
    };

    #[test]
    fn test_pk_paths_descend_into_embedded() {
        assert_eq!(ROW.primary_key_paths(), vec!["audit.tenant", "code"]);
        assert_eq!(ROW.field("audit.tenant").map(|f| f.kind), Some(FieldKind::I64));
        assert!(ROW.field("audit.missing").is_none());
    }

    static ID_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor {
        name: "Id",
        tag: "",
        kind: FieldKind::I64,
        nullable: false,
        codec: ColumnCodec::Primitive,
        embedded: None,
        related: None,
    }];

    #[test]
    fn test_pk_falls_back_to_integer_id() {
        let desc = RecordDescriptor {
            type_name: "Plain",
            table_name: None,
            fields: &ID_FIELDS,
            type_id: TypeId::of::<Audit>,
            hook_table_name: || None,
        };
        assert_eq!(desc.primary_key_paths(), vec!["Id"]);
    }
}
