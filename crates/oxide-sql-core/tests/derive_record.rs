//! Tests for the `#[derive(Record)]` macro output.
//!
//! These tests verify that the derive macro generates:
//! - A static descriptor the table parser understands
//! - Field accessors for every codec (primitive, JSON, conversion,
//!   cascade, embedded)
//! - An empty `Hooks` implementation unless `#[orm(hooks)]` is given

mod common;

use common::{column_names, cx, table_of};
use oxide_sql_core::{
    ColumnCodec, Conversion, FieldKind, HookError, Hooks, IndexType, Record, SqlValue, TableParser,
};
use oxide_sql_derive::Record;

// =============================================================================
// Plain record
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct User {
    #[orm("pk autoincr")]
    pub id: i64,
    #[orm("varchar(64) notnull unique")]
    pub name: String,
    pub email: Option<String>,
    #[orm("version")]
    pub ver: i32,
    pub active: bool,
    #[orm("-")]
    pub scratch: String,
}

#[test]
fn test_user_descriptor() {
    let desc = User::descriptor();
    assert_eq!(desc.type_name, "User");
    assert_eq!(desc.table_name, None);
    let names: Vec<&str> = desc.fields.iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["id", "name", "email", "ver", "active"]);
    assert_eq!(desc.fields[0].kind, FieldKind::I64);
    assert!(desc.fields[2].nullable);
    assert!(!desc.fields[1].nullable);
    assert_eq!(desc.primary_key_paths(), vec!["id"]);
}

#[test]
fn test_user_table() {
    let table = table_of::<User>();
    assert_eq!(table.name, "user");
    assert_eq!(column_names(&table), vec!["id", "name", "email", "ver", "active"]);
    assert_eq!(table.primary_keys, vec!["id"]);
    assert_eq!(table.auto_increment.as_deref(), Some("id"));
    assert_eq!(table.version.as_deref(), Some("ver"));

    let name = table.column("name").unwrap();
    assert_eq!(name.sql_type.to_string(), "VARCHAR(64)");
    assert!(!name.nullable);
    let index = table.index("name").unwrap();
    assert_eq!(index.index_type, IndexType::Unique);
    assert_eq!(index.x_name(&table.name), "UQE_user_name");
}

#[test]
fn test_user_accessors() {
    let cx = cx();
    let mut user = User::default();
    assert!(user.is_zero_field("id"));
    assert!(user.is_zero_field("active"));

    user.set_field("id", SqlValue::Int(7), &cx).unwrap();
    user.set_field("name", SqlValue::Text("lunny".into()), &cx).unwrap();
    user.set_field("email", SqlValue::Null, &cx).unwrap();
    user.set_field("active", SqlValue::Int(1), &cx).unwrap();

    assert_eq!(user.id, 7);
    assert_eq!(user.name, "lunny");
    assert_eq!(user.email, None);
    assert!(user.active);
    assert!(!user.is_zero_field("id"));
    assert!(user.is_zero_field("email"));

    assert_eq!(user.get_field("name", &cx).unwrap(), SqlValue::Text("lunny".into()));
    assert_eq!(user.get_field("email", &cx).unwrap(), SqlValue::Null);
    assert!(user.get_field("scratch", &cx).is_err());
    assert!(user.set_field("missing", SqlValue::Null, &cx).is_err());

    let pk = user.pk_at(&["id".to_string()], &cx).unwrap();
    assert_eq!(pk.values(), &[SqlValue::Int(7)]);
}

// =============================================================================
// Embedded record, JSON field and table attribute
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Audit {
    #[orm("'by'")]
    pub created_by: String,
    #[orm("index")]
    pub tenant: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[orm(table = "docs")]
pub struct Doc {
    #[orm("pk")]
    pub code: String,
    #[orm("extends('a_')")]
    pub audit: Audit,
    #[orm("json")]
    pub tags: Vec<String>,
}

#[test]
fn test_embedded_columns_are_prefixed() {
    let table = table_of::<Doc>();
    assert_eq!(table.name, "docs");
    assert_eq!(column_names(&table), vec!["code", "a_by", "a_tenant", "tags"]);
    assert_eq!(table.column("a_tenant").unwrap().field_path, "audit.tenant");
    assert_eq!(table.column("tags").unwrap().codec, ColumnCodec::Json);
    assert!(table.index("a_tenant").is_some());
}

#[test]
fn test_embedded_and_json_accessors() {
    let cx = cx();
    let mut doc = Doc::default();
    assert!(doc.is_zero_field("tags"));
    doc.set_field("audit.tenant", SqlValue::Int(3), &cx).unwrap();
    doc.set_field("tags", SqlValue::Text("[\"a\",\"b\"]".into()), &cx)
        .unwrap();

    assert_eq!(doc.audit.tenant, 3);
    assert_eq!(doc.tags, vec!["a", "b"]);
    assert_eq!(doc.get_field("audit.tenant", &cx).unwrap(), SqlValue::Int(3));
    assert_eq!(
        doc.get_field("tags", &cx).unwrap(),
        SqlValue::Text("[\"a\",\"b\"]".into())
    );
    assert!(doc.is_zero_field("audit.created_by"));
    assert!(!doc.is_zero_field("audit.tenant"));
}

// =============================================================================
// Cascade reference
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Post {
    #[orm("pk autoincr")]
    pub id: i64,
    #[orm(tag = "'author_id'", cascade)]
    pub author: Option<User>,
}

#[test]
fn test_cascade_column_takes_related_pk_type() {
    let table = table_of::<Post>();
    let author = table.column("author_id").unwrap();
    assert_eq!(author.sql_type.name, "BIGINT");
    assert_eq!(author.codec, ColumnCodec::Related);
    assert!(author.cascade.is_some());
}

#[test]
fn test_cascade_accessors() {
    let cx = cx();
    let mut post = Post::default();
    assert_eq!(post.get_field("author", &cx).unwrap(), SqlValue::Null);

    post.set_field("author", SqlValue::Int(9), &cx).unwrap();
    assert_eq!(post.author.as_ref().map(|u| u.id), Some(9));
    assert_eq!(post.get_field("author", &cx).unwrap(), SqlValue::Int(9));

    post.set_related(
        "author",
        &[
            ("id".to_string(), SqlValue::Int(9)),
            ("name".to_string(), SqlValue::Text("lunny".into())),
        ],
        &cx,
    )
    .unwrap();
    assert_eq!(post.author.as_ref().map(|u| u.name.as_str()), Some("lunny"));
    assert!(post.set_related("id", &[], &cx).is_err());
}

// =============================================================================
// User conversion and hooks
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Langs(Vec<String>);

impl Conversion for Langs {
    fn to_db(&self) -> Result<Vec<u8>, HookError> {
        Ok(self.0.join(",").into_bytes())
    }

    fn from_db(data: &[u8]) -> Result<Self, HookError> {
        let text = std::str::from_utf8(data)?;
        Ok(Self(text.split(',').map(String::from).collect()))
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[orm(hooks)]
pub struct Profile {
    #[orm("pk")]
    pub id: i64,
    #[orm(tag = "TEXT", conversion)]
    pub langs: Langs,
}

impl Hooks for Profile {
    fn table_name(&self) -> Option<String> {
        Some("profiles_v2".to_string())
    }
}

#[test]
fn test_conversion_field() {
    let cx = cx();
    let mut profile = Profile::default();
    assert!(profile.is_zero_field("langs"));
    profile
        .set_field("langs", SqlValue::Text("en,fr".into()), &cx)
        .unwrap();
    assert_eq!(profile.langs, Langs(vec!["en".into(), "fr".into()]));
    assert_eq!(
        profile.get_field("langs", &cx).unwrap(),
        SqlValue::Text("en,fr".into())
    );
    // NULL leaves a non-optional conversion field untouched.
    profile.set_field("langs", SqlValue::Null, &cx).unwrap();
    assert_eq!(profile.langs.0.len(), 2);
}

#[test]
fn test_table_name_hook_wins() {
    let parser = TableParser::default();
    assert_eq!(parser.table_name(Profile::descriptor()), "profiles_v2");
    assert_eq!(parser.table_name(Doc::descriptor()), "docs");
    assert_eq!(parser.table_name(User::descriptor()), "user");
}
