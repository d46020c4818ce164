//! SQL values, primary-key tuples and time-zone aware conversion context.
//!
//! Every value crossing the boundary between a record and the driver is a
//! [`SqlValue`]. Builders always bind values as parameters; `to_sql_inline`
//! exists for logging and for the rare dialect form that cannot bind.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Layout used when a time value is rendered as text for the database.
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A SQL value that can be used as a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// Wall-clock time as stored by the database (already in the database zone).
    Time(NaiveDateTime),
    /// Zoned time; normalized to the database zone before it is bound.
    TimeTz(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Returns the SQL representation for inline use (escaped).
    ///
    /// **Warning**: Prefer using parameterized queries instead.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => format!("{f}"),
            Self::Text(s) => {
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Time(t) => format!("'{}'", format_db_time(t)),
            Self::TimeTz(t) => format!("'{}'", t.to_rfc3339()),
        }
    }

    /// Short name of the value kind, used in conversion errors.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Time(_) | Self::TimeTz(_) => "time",
        }
    }

    /// Returns true for [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as an integer when it is one, or text holding one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a float when it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Renders the value as plain text; times use `time_format` (a chrono
    /// `strftime` layout) when given.
    #[must_use]
    pub fn to_text(&self, time_format: Option<&str>) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Time(t) => match time_format {
                Some(layout) => t.format(layout).to_string(),
                None => format_db_time(t),
            },
            Self::TimeTz(t) => match time_format {
                Some(layout) => t.format(layout).to_string(),
                None => t.to_rfc3339(),
            },
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_inline())
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

macro_rules! int_to_sql_value {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(self) -> SqlValue {
                    SqlValue::Int(i64::from(self))
                }
            }
        )*
    };
}

int_to_sql_value!(i8, i16, i32, i64, u8, u16, u32);

impl ToSqlValue for u64 {
    fn to_sql_value(self) -> SqlValue {
        i64::try_from(self).map_or_else(|_| SqlValue::Text(self.to_string()), SqlValue::Int)
    }
}

impl ToSqlValue for usize {
    fn to_sql_value(self) -> SqlValue {
        i64::try_from(self).map_or_else(|_| SqlValue::Text(self.to_string()), SqlValue::Int)
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for &String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Time(self)
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Time(self.and_time(chrono::NaiveTime::MIN))
    }
}

impl ToSqlValue for DateTime<Utc> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::TimeTz(self.fixed_offset())
    }
}

impl ToSqlValue for DateTime<FixedOffset> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::TimeTz(self)
    }
}

impl ToSqlValue for serde_json::Value {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

/// Builds a `Vec<SqlValue>` from heterogeneous arguments.
///
/// ```
/// use oxide_sql_core::{args, SqlValue};
///
/// let values = args![1, "lunny", true];
/// assert_eq!(values[1], SqlValue::Text("lunny".into()));
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::ToSqlValue::to_sql_value($value)),+]
    };
}

/// An ordered primary-key tuple.
///
/// Equality and hashing go through [`Pk::key_string`], so tuples holding
/// floats still behave as map keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pk(pub Vec<SqlValue>);

impl Pk {
    /// Creates a tuple from its values in primary-key declaration order.
    #[must_use]
    pub const fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Number of values in the tuple.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the tuple holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The values, in primary-key declaration order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    /// Consumes the tuple.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.0
    }

    /// Stable string form used as cache key.
    #[must_use]
    pub fn key_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl PartialEq for Pk {
    fn eq(&self, other: &Self) -> bool {
        self.key_string() == other.key_string()
    }
}

impl Eq for Pk {}

impl Hash for Pk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_string().hash(state);
    }
}

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_text(None)).collect();
        write!(f, "({})", parts.join(", "))
    }
}

impl From<Vec<SqlValue>> for Pk {
    fn from(values: Vec<SqlValue>) -> Self {
        Self(values)
    }
}

macro_rules! scalar_pk {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Pk {
                fn from(value: $ty) -> Self {
                    Self(vec![value.to_sql_value()])
                }
            }
        )*
    };
}

scalar_pk!(i8, i16, i32, i64, u8, u16, u32, u64, usize, String, &str, SqlValue);

impl<A: ToSqlValue, B: ToSqlValue> From<(A, B)> for Pk {
    fn from((a, b): (A, B)) -> Self {
        Self(vec![a.to_sql_value(), b.to_sql_value()])
    }
}

impl<A: ToSqlValue, B: ToSqlValue, C: ToSqlValue> From<(A, B, C)> for Pk {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(vec![a.to_sql_value(), b.to_sql_value(), c.to_sql_value()])
    }
}

/// Time-zone settings applied when times cross the record boundary.
///
/// `tz_location` is the zone values are presented in to the application,
/// `database_tz` the zone wall-clock values are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertContext {
    /// Zone of times handed to the application.
    pub tz_location: FixedOffset,
    /// Zone of times stored in the database.
    pub database_tz: FixedOffset,
}

impl Default for ConvertContext {
    fn default() -> Self {
        Self {
            tz_location: Utc.fix(),
            database_tz: Utc.fix(),
        }
    }
}

impl ConvertContext {
    /// Creates a context from both zones.
    #[must_use]
    pub const fn new(tz_location: FixedOffset, database_tz: FixedOffset) -> Self {
        Self {
            tz_location,
            database_tz,
        }
    }

    /// Context for a column tagged `utc`: storage is forced to UTC.
    #[must_use]
    pub fn with_utc_storage(self) -> Self {
        Self {
            database_tz: Utc.fix(),
            ..self
        }
    }

    /// Converts an application time into database wall-clock time.
    #[must_use]
    pub fn to_database(&self, time: &DateTime<FixedOffset>) -> NaiveDateTime {
        time.with_timezone(&self.database_tz).naive_local()
    }

    /// Interprets a database wall-clock time and presents it in `tz_location`.
    #[must_use]
    pub fn from_database(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        let utc = naive - TimeDelta::seconds(i64::from(self.database_tz.local_minus_utc()));
        DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc).with_timezone(&self.tz_location)
    }

    /// Converts a Unix epoch second into an application time.
    #[must_use]
    pub fn from_epoch(&self, secs: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp(secs, 0).map(|t| t.with_timezone(&self.tz_location))
    }

    /// Current instant as a database wall-clock value.
    #[must_use]
    pub fn now(&self) -> SqlValue {
        SqlValue::Time(self.to_database(&Utc::now().fixed_offset()))
    }

    /// Resolves zoned values into database wall-clock values.
    #[must_use]
    pub fn normalize(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::TimeTz(t) => SqlValue::Time(self.to_database(&t)),
            other => other,
        }
    }
}

/// Formats a database wall-clock time, keeping sub-second digits only when present.
#[must_use]
pub fn format_db_time(time: &NaiveDateTime) -> String {
    use chrono::Timelike;
    if time.nanosecond() == 0 {
        time.format(DB_TIME_FORMAT).to_string()
    } else {
        time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Parses the textual time forms drivers hand back.
///
/// Zoned forms (RFC 3339) are returned together with their offset.
#[must_use]
pub fn parse_db_time(text: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some((t.naive_utc(), Some(Utc.fix())));
    }
    for layout in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, layout) {
            return Some((t, None));
        }
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(t) = DateTime::parse_from_str(text, layout) {
            return Some((t.naive_utc(), Some(Utc.fix())));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| (d.and_time(chrono::NaiveTime::MIN), None))
}
