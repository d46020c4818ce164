//! Engine configuration.
//!
//! [`EngineConfig`] deserializes with serde (every field has a default) or
//! is read from the process environment:
//!
//! | Variable              | Field               |
//! |-----------------------|---------------------|
//! | `DATABASE_URL`        | `dsn`               |
//! | `ORM_DRIVER`          | `driver`            |
//! | `ORM_MAX_OPEN_CONNS`  | `pool.max_open`     |
//! | `ORM_MAX_IDLE_CONNS`  | `pool.max_idle`     |
//! | `ORM_SHOW_SQL`        | `show_sql`          |
//! | `ORM_LOG_LEVEL`       | `log_level`         |

use std::str::FromStr;

use oxide_sql_core::QuotePolicy;
use serde::{Deserialize, Serialize};

use crate::driver::PoolConfig;
use crate::error::{OrmError, Result};
use crate::logger::LogLevel;

/// Settings used by [`Engine::from_config`](crate::Engine::from_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Driver name, e.g. `sqlite`.
    pub driver: String,
    pub dsn: String,
    pub pool: PoolConfig,
    pub show_sql: bool,
    pub log_level: LogLevel,
    /// Name mapper for both tables and columns: `snake`, `same` or `gonic`.
    pub mapper: String,
    pub quote_policy: QuotePolicy,
    /// Offset in seconds east of UTC of times handed to the application.
    pub tz_offset: i32,
    /// Offset in seconds east of UTC of times stored in the database.
    pub database_tz_offset: i32,
    /// Load cascade fields by default.
    pub cascade: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            dsn: "sqlite::memory:".to_string(),
            pool: PoolConfig::default(),
            show_sql: false,
            log_level: LogLevel::Info,
            mapper: "snake".to_string(),
            quote_policy: QuotePolicy::Always,
            tz_offset: 0,
            database_tz_offset: 0,
            cascade: true,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from environment variables, falling back to
    /// the defaults for unset ones.
    ///
    /// # Errors
    ///
    /// [`OrmError::Config`] when a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dsn) = lookup("DATABASE_URL") {
            config.dsn = dsn;
        }
        if let Some(driver) = lookup("ORM_DRIVER") {
            config.driver = driver;
        }
        if let Some(n) = parse_var(&lookup, "ORM_MAX_OPEN_CONNS")? {
            config.pool.max_open = n;
        }
        if let Some(n) = parse_var(&lookup, "ORM_MAX_IDLE_CONNS")? {
            config.pool.max_idle = n;
        }
        if let Some(show) = lookup("ORM_SHOW_SQL") {
            config.show_sql = parse_bool(&show)
                .ok_or_else(|| OrmError::Config(format!("ORM_SHOW_SQL: `{show}` is not a boolean")))?;
        }
        if let Some(level) = parse_var(&lookup, "ORM_LOG_LEVEL")? {
            config.log_level = level;
        }
        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| OrmError::Config(format!("{key}: {e}")))
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_reads_variables() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://app.db"),
            ("ORM_MAX_OPEN_CONNS", "4"),
            ("ORM_MAX_IDLE_CONNS", "1"),
            ("ORM_SHOW_SQL", "yes"),
            ("ORM_LOG_LEVEL", "warn"),
        ]))
        .unwrap();
        assert_eq!(config.dsn, "sqlite://app.db");
        assert_eq!(config.pool.max_open, 4);
        assert_eq!(config.pool.max_idle, 1);
        assert!(config.show_sql);
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EngineConfig::from_lookup(lookup(&[("ORM_MAX_OPEN_CONNS", "many")])).unwrap_err();
        assert!(matches!(err, OrmError::Config(msg) if msg.starts_with("ORM_MAX_OPEN_CONNS")));
        assert!(EngineConfig::from_lookup(lookup(&[("ORM_SHOW_SQL", "maybe")])).is_err());
    }

    #[test]
    fn test_deserializes_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"dsn":"sqlite://x.db","quote_policy":"reserved"}"#).unwrap();
        assert_eq!(config.dsn, "sqlite://x.db");
        assert_eq!(config.quote_policy, QuotePolicy::Reserved);
        assert_eq!(config.mapper, "snake");
    }
}
