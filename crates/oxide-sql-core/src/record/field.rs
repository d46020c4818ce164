//! Primitive field types and their SQL conversions.
//!
//! Conversions are lenient on read: a value whose kind does not match the
//! field is stringified and parsed, integers assigned to time fields are
//! read as Unix epoch seconds, and NULL yields the zero value for
//! non-optional fields.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::ConvertError;
use crate::value::{parse_db_time, ConvertContext, SqlValue};

/// Kind of a mapped field, known at descriptor-build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    DateTime,
    Date,
    Json,
    /// User `Conversion` codec.
    Custom,
    /// Cascade reference to another record.
    Related,
    /// Flattened sub-record.
    Embedded,
}

impl FieldKind {
    /// Signed or unsigned integer kinds.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    /// Date and date-time kinds.
    #[must_use]
    pub const fn is_time(self) -> bool {
        matches!(self, Self::DateTime | Self::Date)
    }

    /// Human-readable kind name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Json => "json",
            Self::Custom => "custom",
            Self::Related => "related record",
            Self::Embedded => "embedded record",
        }
    }
}

/// A Rust type that maps directly onto one column.
pub trait FieldType: Sized {
    /// Kind reported to the metadata parser.
    const KIND: FieldKind;
    /// Whether the type can hold NULL.
    const NULLABLE: bool = false;

    /// Encodes the value for binding.
    fn to_sql(&self, cx: &ConvertContext) -> Result<SqlValue, ConvertError>;

    /// Decodes a driver value.
    fn from_sql(value: SqlValue, cx: &ConvertContext) -> Result<Self, ConvertError>;

    /// Whether the value is the zero value of its type.
    fn is_zero(&self) -> bool;
}

fn parse_text<T: std::str::FromStr>(text: &str, target: &'static str) -> Result<T, ConvertError> {
    text.trim().parse().map_err(|_| ConvertError::Parse {
        value: text.to_string(),
        target,
    })
}

fn blob_text(bytes: Vec<u8>, target: &'static str) -> Result<String, ConvertError> {
    String::from_utf8(bytes).map_err(|e| ConvertError::Parse {
        value: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        target,
    })
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Bool(*self))
    }

    fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
        match value {
            SqlValue::Null => Ok(false),
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(n) => Ok(n != 0),
            SqlValue::Float(f) => Ok(f != 0.0),
            SqlValue::Text(s) => parse_bool(&s),
            SqlValue::Blob(b) => parse_bool(&blob_text(b, "bool")?),
            other => Err(ConvertError::Unsupported {
                from: other.kind_name(),
                to: "bool",
            }),
        }
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

fn parse_bool(text: &str) -> Result<bool, ConvertError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Ok(true),
        "0" | "f" | "false" | "n" | "no" | "" => Ok(false),
        _ => Err(ConvertError::Parse {
            value: text.to_string(),
            target: "bool",
        }),
    }
}

macro_rules! integer_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                const KIND: FieldKind = FieldKind::$kind;

                fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
                    i64::try_from(*self)
                        .map(SqlValue::Int)
                        .map_err(|_| ConvertError::Overflow {
                            value: self.to_string(),
                            target: "i64",
                        })
                }

                #[allow(clippy::cast_possible_truncation)]
                fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
                    let wide: i64 = match value {
                        SqlValue::Null => return Ok(0),
                        SqlValue::Int(n) => n,
                        SqlValue::Bool(b) => i64::from(b),
                        SqlValue::Float(f) => f.trunc() as i64,
                        SqlValue::Text(s) => return parse_text(&s, stringify!($ty)),
                        SqlValue::Blob(b) => {
                            return parse_text(&blob_text(b, stringify!($ty))?, stringify!($ty))
                        }
                        other => {
                            return Err(ConvertError::Unsupported {
                                from: other.kind_name(),
                                to: stringify!($ty),
                            })
                        }
                    };
                    <$ty>::try_from(wide).map_err(|_| ConvertError::Overflow {
                        value: wide.to_string(),
                        target: stringify!($ty),
                    })
                }

                fn is_zero(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}

integer_field!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

macro_rules! float_field {
    ($($ty:ty => $kind:ident),*) => {
        $(
            impl FieldType for $ty {
                const KIND: FieldKind = FieldKind::$kind;

                fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
                    Ok(SqlValue::Float(f64::from(*self)))
                }

                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
                    match value {
                        SqlValue::Null => Ok(0.0),
                        SqlValue::Float(f) => Ok(f as $ty),
                        SqlValue::Int(n) => Ok(n as $ty),
                        SqlValue::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
                        SqlValue::Text(s) => parse_text(&s, stringify!($ty)),
                        SqlValue::Blob(b) => parse_text(&blob_text(b, stringify!($ty))?, stringify!($ty)),
                        other => Err(ConvertError::Unsupported {
                            from: other.kind_name(),
                            to: stringify!($ty),
                        }),
                    }
                }

                fn is_zero(&self) -> bool {
                    *self == 0.0
                }
            }
        )*
    };
}

float_field!(f32 => F32, f64 => F64);

impl FieldType for String {
    const KIND: FieldKind = FieldKind::String;

    fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Text(self.clone()))
    }

    fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
        match value {
            SqlValue::Blob(b) => blob_text(b, "string"),
            other => Ok(other.to_text(None)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl FieldType for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Blob(self.clone()))
    }

    fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
        match value {
            SqlValue::Null => Ok(Vec::new()),
            SqlValue::Blob(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(ConvertError::Unsupported {
                from: other.kind_name(),
                to: "bytes",
            }),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

/// Reads any time-like driver value as an application time.
fn read_time(value: SqlValue, cx: &ConvertContext) -> Result<Option<DateTime<FixedOffset>>, ConvertError> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Time(naive) => Ok(Some(cx.from_database(naive))),
        SqlValue::TimeTz(t) => Ok(Some(t.with_timezone(&cx.tz_location))),
        SqlValue::Int(secs) => cx.from_epoch(secs).map(Some).ok_or(ConvertError::Overflow {
            value: secs.to_string(),
            target: "datetime",
        }),
        SqlValue::Text(s) => parse_time_text(&s, cx).map(Some),
        SqlValue::Blob(b) => parse_time_text(&blob_text(b, "datetime")?, cx).map(Some),
        other => Err(ConvertError::Unsupported {
            from: other.kind_name(),
            to: "datetime",
        }),
    }
}

fn parse_time_text(text: &str, cx: &ConvertContext) -> Result<DateTime<FixedOffset>, ConvertError> {
    if text.trim().is_empty() {
        return Ok(cx.from_database(epoch().naive_utc()));
    }
    match parse_db_time(text) {
        Some((naive, Some(_))) => Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
            .with_timezone(&cx.tz_location)),
        Some((naive, None)) => Ok(cx.from_database(naive)),
        None => Err(ConvertError::Parse {
            value: text.to_string(),
            target: "datetime",
        }),
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

fn epoch_zero<Tz: chrono::TimeZone>(t: &DateTime<Tz>) -> bool {
    t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::DateTime;

    fn to_sql(&self, cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Time(cx.to_database(&self.fixed_offset())))
    }

    fn from_sql(value: SqlValue, cx: &ConvertContext) -> Result<Self, ConvertError> {
        Ok(read_time(value, cx)?.map_or_else(epoch, |t| t.with_timezone(&Utc)))
    }

    fn is_zero(&self) -> bool {
        epoch_zero(self)
    }
}

impl FieldType for DateTime<FixedOffset> {
    const KIND: FieldKind = FieldKind::DateTime;

    fn to_sql(&self, cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Time(cx.to_database(self)))
    }

    fn from_sql(value: SqlValue, cx: &ConvertContext) -> Result<Self, ConvertError> {
        Ok(read_time(value, cx)?
            .unwrap_or_else(|| epoch().with_timezone(&cx.tz_location)))
    }

    fn is_zero(&self) -> bool {
        epoch_zero(self)
    }
}

/// Naive times are wall-clock values in the application zone.
impl FieldType for NaiveDateTime {
    const KIND: FieldKind = FieldKind::DateTime;

    fn to_sql(&self, cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        let utc = *self - TimeDelta::seconds(i64::from(cx.tz_location.local_minus_utc()));
        let zoned = DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc).fixed_offset();
        Ok(SqlValue::Time(cx.to_database(&zoned)))
    }

    fn from_sql(value: SqlValue, cx: &ConvertContext) -> Result<Self, ConvertError> {
        Ok(read_time(value, cx)?.map_or_else(|| epoch().naive_utc(), |t| t.naive_local()))
    }

    fn is_zero(&self) -> bool {
        epoch_zero(&self.and_utc())
    }
}

impl FieldType for NaiveDate {
    const KIND: FieldKind = FieldKind::Date;

    fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Text(self.format("%Y-%m-%d").to_string()))
    }

    fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
        let epoch = epoch().date_naive();
        match value {
            SqlValue::Null => Ok(epoch),
            SqlValue::Time(t) => Ok(t.date()),
            SqlValue::TimeTz(t) => Ok(t.date_naive()),
            SqlValue::Text(s) => parse_db_time(&s).map(|(t, _)| t.date()).ok_or(ConvertError::Parse {
                value: s,
                target: "date",
            }),
            SqlValue::Int(secs) => DateTime::from_timestamp(secs, 0)
                .map(|t| t.date_naive())
                .ok_or(ConvertError::Overflow {
                    value: secs.to_string(),
                    target: "date",
                }),
            other => Err(ConvertError::Unsupported {
                from: other.kind_name(),
                to: "date",
            }),
        }
    }

    fn is_zero(&self) -> bool {
        *self == epoch().date_naive()
    }
}

impl FieldType for serde_json::Value {
    const KIND: FieldKind = FieldKind::Json;

    fn to_sql(&self, _cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        Ok(SqlValue::Text(self.to_string()))
    }

    fn from_sql(value: SqlValue, _cx: &ConvertContext) -> Result<Self, ConvertError> {
        match value {
            SqlValue::Null => Ok(Self::Null),
            SqlValue::Text(s) if s.is_empty() => Ok(Self::Null),
            SqlValue::Text(s) => Ok(serde_json::from_str(&s)?),
            SqlValue::Blob(b) => Ok(serde_json::from_slice(&b)?),
            SqlValue::Int(n) => Ok(Self::from(n)),
            SqlValue::Float(f) => Ok(Self::from(f)),
            SqlValue::Bool(b) => Ok(Self::from(b)),
            other => Ok(Self::String(other.to_text(None))),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Array(a) => a.is_empty(),
            Self::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_sql(&self, cx: &ConvertContext) -> Result<SqlValue, ConvertError> {
        match self {
            Some(v) => v.to_sql(cx),
            None => Ok(SqlValue::Null),
        }
    }

    fn from_sql(value: SqlValue, cx: &ConvertContext) -> Result<Self, ConvertError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other, cx).map(Some),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    fn cx() -> ConvertContext {
        ConvertContext::default()
    }

    #[test]
    fn test_integer_fallback_parsing() {
        assert_eq!(i32::from_sql(SqlValue::Text(" 42 ".into()), &cx()).unwrap(), 42);
        assert_eq!(u8::from_sql(SqlValue::Float(7.9), &cx()).unwrap(), 7);
        assert_eq!(i64::from_sql(SqlValue::Null, &cx()).unwrap(), 0);
        assert!(matches!(
            u8::from_sql(SqlValue::Int(300), &cx()),
            Err(ConvertError::Overflow { .. })
        ));
        assert!(matches!(
            i64::from_sql(SqlValue::Text("abc".into()), &cx()),
            Err(ConvertError::Parse { .. })
        ));
    }

    #[test]
    fn test_u64_overflow_on_write() {
        assert!(u64::MAX.to_sql(&cx()).is_err());
        assert_eq!(7_u64.to_sql(&cx()).unwrap(), SqlValue::Int(7));
    }

    #[test]
    fn test_bool_sources() {
        assert!(bool::from_sql(SqlValue::Int(1), &cx()).unwrap());
        assert!(!bool::from_sql(SqlValue::Text("false".into()), &cx()).unwrap());
        assert!(false.is_zero());
    }

    #[test]
    fn test_epoch_seconds_into_time() {
        let t = DateTime::<Utc>::from_sql(SqlValue::Int(86_400), &cx()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_time_from_text_in_database_zone() {
        let plus1 = FixedOffset::east_opt(3600).unwrap();
        let cx = ConvertContext::new(Utc.fix(), plus1);
        let t = DateTime::<Utc>::from_sql(SqlValue::Text("2024-01-01 01:00:00".into()), &cx).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_time_round_trip_through_zones() {
        let plus3 = FixedOffset::east_opt(3 * 3600).unwrap();
        let cx = ConvertContext::new(plus3, Utc.fix());
        let local = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let stored = local.to_sql(&cx).unwrap();
        assert_eq!(stored, SqlValue::Time(local - TimeDelta::hours(3)));
        assert_eq!(NaiveDateTime::from_sql(stored, &cx).unwrap(), local);
    }

    #[test]
    fn test_option_is_nullable() {
        assert!(<Option<i32> as FieldType>::NULLABLE);
        assert_eq!(Option::<i32>::from_sql(SqlValue::Null, &cx()).unwrap(), None);
        assert!(!Some(0).is_zero());
        assert!(None::<i32>.is_zero());
    }

    #[test]
    fn test_json_value_field() {
        let v = serde_json::Value::from_sql(SqlValue::Text("{\"a\":1}".into()), &cx()).unwrap();
        assert_eq!(v["a"], 1);
        assert!(serde_json::json!([]).is_zero());
    }
}
