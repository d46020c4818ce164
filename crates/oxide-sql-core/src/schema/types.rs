//! Portable SQL type tokens.
//!
//! Tags name column types with a portable vocabulary (`VARCHAR(64)`,
//! `BIGINT`, `JSON`, ...); each dialect maps these to its native names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::FieldKind;

/// Portable type names understood by every dialect.
pub mod names {
    pub const BIT: &str = "BIT";
    pub const TINYINT: &str = "TINYINT";
    pub const SMALLINT: &str = "SMALLINT";
    pub const MEDIUMINT: &str = "MEDIUMINT";
    pub const INT: &str = "INT";
    pub const INTEGER: &str = "INTEGER";
    pub const BIGINT: &str = "BIGINT";
    pub const CHAR: &str = "CHAR";
    pub const VARCHAR: &str = "VARCHAR";
    pub const NCHAR: &str = "NCHAR";
    pub const NVARCHAR: &str = "NVARCHAR";
    pub const TINYTEXT: &str = "TINYTEXT";
    pub const TEXT: &str = "TEXT";
    pub const NTEXT: &str = "NTEXT";
    pub const CLOB: &str = "CLOB";
    pub const MEDIUMTEXT: &str = "MEDIUMTEXT";
    pub const LONGTEXT: &str = "LONGTEXT";
    pub const UUID: &str = "UUID";
    pub const ENUM: &str = "ENUM";
    pub const SET: &str = "SET";
    pub const DATE: &str = "DATE";
    pub const DATETIME: &str = "DATETIME";
    pub const TIME: &str = "TIME";
    pub const TIMESTAMP: &str = "TIMESTAMP";
    pub const TIMESTAMPZ: &str = "TIMESTAMPZ";
    pub const YEAR: &str = "YEAR";
    pub const DECIMAL: &str = "DECIMAL";
    pub const NUMERIC: &str = "NUMERIC";
    pub const MONEY: &str = "MONEY";
    pub const REAL: &str = "REAL";
    pub const FLOAT: &str = "FLOAT";
    pub const DOUBLE: &str = "DOUBLE";
    pub const BINARY: &str = "BINARY";
    pub const VARBINARY: &str = "VARBINARY";
    pub const TINYBLOB: &str = "TINYBLOB";
    pub const BLOB: &str = "BLOB";
    pub const MEDIUMBLOB: &str = "MEDIUMBLOB";
    pub const LONGBLOB: &str = "LONGBLOB";
    pub const BYTEA: &str = "BYTEA";
    pub const BOOL: &str = "BOOL";
    pub const BOOLEAN: &str = "BOOLEAN";
    pub const SERIAL: &str = "SERIAL";
    pub const BIGSERIAL: &str = "BIGSERIAL";
    pub const JSON: &str = "JSON";
    pub const JSONB: &str = "JSONB";
    pub const XML: &str = "XML";
}

const KNOWN: &[&str] = &[
    names::BIT,
    names::TINYINT,
    names::SMALLINT,
    names::MEDIUMINT,
    names::INT,
    names::INTEGER,
    names::BIGINT,
    names::CHAR,
    names::VARCHAR,
    names::NCHAR,
    names::NVARCHAR,
    names::TINYTEXT,
    names::TEXT,
    names::NTEXT,
    names::CLOB,
    names::MEDIUMTEXT,
    names::LONGTEXT,
    names::UUID,
    names::ENUM,
    names::SET,
    names::DATE,
    names::DATETIME,
    names::TIME,
    names::TIMESTAMP,
    names::TIMESTAMPZ,
    names::YEAR,
    names::DECIMAL,
    names::NUMERIC,
    names::MONEY,
    names::REAL,
    names::FLOAT,
    names::DOUBLE,
    names::BINARY,
    names::VARBINARY,
    names::TINYBLOB,
    names::BLOB,
    names::MEDIUMBLOB,
    names::LONGBLOB,
    names::BYTEA,
    names::BOOL,
    names::BOOLEAN,
    names::SERIAL,
    names::BIGSERIAL,
    names::JSON,
    names::JSONB,
    names::XML,
];

/// A column type: portable name plus optional length / precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlType {
    /// Upper-case type name.
    pub name: String,
    /// Length or precision.
    pub len1: Option<u32>,
    /// Scale.
    pub len2: Option<u32>,
}

impl SqlType {
    /// Creates a type without length.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            len1: None,
            len2: None,
        }
    }

    /// Creates a type with a length.
    #[must_use]
    pub fn with_len(name: &str, len: u32) -> Self {
        Self {
            len1: Some(len),
            ..Self::new(name)
        }
    }

    /// Creates a type with precision and scale.
    #[must_use]
    pub fn with_precision(name: &str, precision: u32, scale: u32) -> Self {
        Self {
            len1: Some(precision),
            len2: Some(scale),
            ..Self::new(name)
        }
    }

    /// Whether `name` (any case) is a portable type token.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        let upper = name.to_ascii_uppercase();
        KNOWN.contains(&upper.as_str())
    }

    /// Parses `NAME`, `NAME(n)` or `NAME(n,m)`; `None` for unknown names.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, args) = match text.find('(') {
            Some(open) => {
                let close = text.rfind(')')?;
                (&text[..open], Some(&text[open + 1..close]))
            }
            None => (text, None),
        };
        let name = name.trim();
        if !Self::is_known(name) {
            return None;
        }
        let mut ty = Self::new(name);
        if let Some(args) = args {
            let mut parts = args.split(',').map(str::trim);
            ty.len1 = parts.next().and_then(|p| p.parse().ok());
            ty.len2 = parts.next().and_then(|p| p.parse().ok());
        }
        Some(ty)
    }

    /// Default column type for a field kind.
    #[must_use]
    pub fn from_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool => Self::new(names::BOOL),
            FieldKind::I8 | FieldKind::U8 => Self::new(names::TINYINT),
            FieldKind::I16 | FieldKind::U16 => Self::new(names::SMALLINT),
            FieldKind::I32 | FieldKind::U32 => Self::new(names::INT),
            FieldKind::I64 | FieldKind::U64 | FieldKind::Related => Self::new(names::BIGINT),
            FieldKind::F32 => Self::new(names::FLOAT),
            FieldKind::F64 => Self::new(names::DOUBLE),
            FieldKind::String => Self::with_len(names::VARCHAR, 255),
            FieldKind::Bytes => Self::new(names::BLOB),
            FieldKind::DateTime => Self::new(names::DATETIME),
            FieldKind::Date => Self::new(names::DATE),
            FieldKind::Json | FieldKind::Custom | FieldKind::Embedded => Self::new(names::TEXT),
        }
    }

    /// Integer family.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self.name.as_str(),
            names::BIT
                | names::TINYINT
                | names::SMALLINT
                | names::MEDIUMINT
                | names::INT
                | names::INTEGER
                | names::BIGINT
                | names::SERIAL
                | names::BIGSERIAL
        )
    }

    /// Character family.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(
            self.name.as_str(),
            names::CHAR
                | names::VARCHAR
                | names::NCHAR
                | names::NVARCHAR
                | names::TINYTEXT
                | names::TEXT
                | names::NTEXT
                | names::CLOB
                | names::MEDIUMTEXT
                | names::LONGTEXT
                | names::UUID
                | names::ENUM
                | names::SET
                | names::XML
        )
    }

    /// Binary family.
    #[must_use]
    pub fn is_blob(&self) -> bool {
        matches!(
            self.name.as_str(),
            names::BINARY
                | names::VARBINARY
                | names::TINYBLOB
                | names::BLOB
                | names::MEDIUMBLOB
                | names::LONGBLOB
                | names::BYTEA
        )
    }

    /// Date / time family.
    #[must_use]
    pub fn is_time(&self) -> bool {
        matches!(
            self.name.as_str(),
            names::DATE
                | names::DATETIME
                | names::TIME
                | names::TIMESTAMP
                | names::TIMESTAMPZ
                | names::YEAR
        )
    }

    /// Fixed or floating point family.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self.name.as_str(),
                names::DECIMAL | names::NUMERIC | names::MONEY | names::REAL | names::FLOAT | names::DOUBLE
            )
    }

    /// JSON family.
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self.name.as_str(), names::JSON | names::JSONB)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.len1, self.len2) {
            (Some(a), Some(b)) => write!(f, "{}({a},{b})", self.name),
            (Some(a), None) => write!(f, "{}({a})", self.name),
            _ => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameterized() {
        assert_eq!(SqlType::parse("varchar(64)"), Some(SqlType::with_len("VARCHAR", 64)));
        assert_eq!(
            SqlType::parse("DECIMAL(10, 2)"),
            Some(SqlType::with_precision("DECIMAL", 10, 2))
        );
        assert_eq!(SqlType::parse("whatever"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlType::with_precision("DECIMAL", 10, 2).to_string(), "DECIMAL(10,2)");
        assert_eq!(SqlType::new("text").to_string(), "TEXT");
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(SqlType::from_kind(FieldKind::String).to_string(), "VARCHAR(255)");
        assert_eq!(SqlType::from_kind(FieldKind::I64).name, "BIGINT");
        assert!(SqlType::from_kind(FieldKind::U8).is_integer());
    }
}
