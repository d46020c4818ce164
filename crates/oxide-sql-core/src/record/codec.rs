//! Column codecs used by generated record accessors.
//!
//! `#[derive(Record)]` picks one codec per field when the descriptor is
//! built, so row scanning never has to rediscover how a field is encoded.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{HookError, Record};
use crate::error::ConvertError;
use crate::value::{ConvertContext, SqlValue};

/// How a field is moved between the record and its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnCodec {
    /// Direct assignment through [`FieldType`](super::FieldType).
    Primitive,
    /// JSON text.
    Json,
    /// User [`Conversion`].
    Conversion,
    /// Cascade reference stored as the related record's primary key.
    Related,
    /// Flattened sub-record; contributes its own columns.
    Embedded,
}

/// User-controlled serialization of a field.
pub trait Conversion: Sized {
    /// Serializes the value for storage.
    ///
    /// # Errors
    ///
    /// Any error aborts the statement.
    fn to_db(&self) -> Result<Vec<u8>, HookError>;

    /// Restores the value from stored bytes.
    ///
    /// # Errors
    ///
    /// Any error aborts the row scan.
    fn from_db(data: &[u8]) -> Result<Self, HookError>;

    /// Value assigned when the column is NULL; `None` leaves the field untouched.
    fn from_null() -> Option<Self> {
        None
    }

    /// Zero check used for condition records and partial updates.
    fn is_zero(&self) -> bool {
        false
    }
}

impl<T: Conversion> Conversion for Option<T> {
    fn to_db(&self) -> Result<Vec<u8>, HookError> {
        match self {
            Some(v) => v.to_db(),
            None => Ok(Vec::new()),
        }
    }

    fn from_db(data: &[u8]) -> Result<Self, HookError> {
        T::from_db(data).map(Some)
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

/// Encodes a field as JSON text.
///
/// # Errors
///
/// Fails when the value cannot be serialized.
pub fn json_encode<T: Serialize>(value: &T) -> Result<SqlValue, ConvertError> {
    let json = serde_json::to_value(value)?;
    if json.is_null() {
        return Ok(SqlValue::Null);
    }
    Ok(SqlValue::Text(json.to_string()))
}

/// Decodes a JSON column; NULL and empty text yield the default value.
///
/// # Errors
///
/// Fails when the stored text is not valid JSON for `T`.
pub fn json_decode<T: DeserializeOwned + Default>(value: SqlValue) -> Result<T, ConvertError> {
    match value {
        SqlValue::Null => Ok(T::default()),
        SqlValue::Text(s) if s.trim().is_empty() => Ok(T::default()),
        SqlValue::Text(s) => Ok(serde_json::from_str(&s)?),
        SqlValue::Blob(b) if b.is_empty() => Ok(T::default()),
        SqlValue::Blob(b) => Ok(serde_json::from_slice(&b)?),
        other => Ok(serde_json::from_str(&other.to_text(None))?),
    }
}

/// JSON fields are zero when they serialize to null or an empty collection.
pub fn json_is_zero<T: Serialize>(value: &T) -> bool {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Null) | Err(_) => true,
        Ok(serde_json::Value::Array(a)) => a.is_empty(),
        Ok(serde_json::Value::Object(o)) => o.is_empty(),
        Ok(serde_json::Value::String(s)) => s.is_empty(),
        Ok(_) => false,
    }
}

/// Encodes a field through its [`Conversion`].
///
/// # Errors
///
/// Propagates the user conversion error.
pub fn conversion_encode<T: Conversion>(value: &T) -> Result<SqlValue, ConvertError> {
    let bytes = value.to_db().map_err(ConvertError::Conversion)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Blob(e.into_bytes()),
    })
}

/// Decodes a field through its [`Conversion`]; `None` leaves the field untouched.
///
/// # Errors
///
/// Propagates the user conversion error.
pub fn conversion_decode<T: Conversion>(value: SqlValue) -> Result<Option<T>, ConvertError> {
    let bytes = match value {
        SqlValue::Null => return Ok(T::from_null()),
        SqlValue::Blob(b) => b,
        SqlValue::Text(s) => s.into_bytes(),
        other => other.to_text(None).into_bytes(),
    };
    T::from_db(&bytes).map(Some).map_err(ConvertError::Conversion)
}

/// Primary-key field path of a related record type.
fn related_pk<T: Record>(path: &str) -> Result<String, ConvertError> {
    let mut pks = T::descriptor().primary_key_paths();
    if pks.len() == 1 {
        Ok(pks.remove(0))
    } else {
        Err(ConvertError::UnsupportedCascade(path.to_string()))
    }
}

/// Encodes a cascade field as the related record's primary key.
///
/// # Errors
///
/// Fails for related records without exactly one primary key.
pub fn related_encode<T: Record>(
    value: &Option<T>,
    path: &str,
    cx: &ConvertContext,
) -> Result<SqlValue, ConvertError> {
    match value {
        None => Ok(SqlValue::Null),
        Some(related) => related.get_field(&related_pk::<T>(path)?, cx),
    }
}

/// Decodes a cascade column into a record holding only its primary key.
///
/// # Errors
///
/// Fails for related records without exactly one primary key.
pub fn related_decode<T: Record>(
    value: SqlValue,
    path: &str,
    cx: &ConvertContext,
) -> Result<Option<T>, ConvertError> {
    if value.is_null() {
        return Ok(None);
    }
    let mut related = T::default();
    related.set_field(&related_pk::<T>(path)?, value, cx)?;
    Ok(Some(related))
}

/// Builds a related record from `(field path, value)` pairs.
///
/// # Errors
///
/// Fails when any pair cannot be assigned.
pub fn related_assign<T: Record>(
    values: &[(String, SqlValue)],
    cx: &ConvertContext,
) -> Result<T, ConvertError> {
    let mut related = T::default();
    for (path, value) in values {
        related.set_field(path, value.clone(), cx)?;
    }
    Ok(related)
}
