//! Engine logging.
//!
//! A [`Logger`] receives free-form messages filtered by [`LogLevel`] and a
//! pair of callbacks around every executed statement. [`TracingLogger`]
//! forwards everything to `tracing`.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use oxide_sql_core::SqlValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Log levels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Nothing is logged.
    Off,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

/// One executed statement, as seen by the logger.
#[derive(Debug, Clone, Copy)]
pub struct SqlContext<'a> {
    pub sql: &'a str,
    pub args: &'a [SqlValue],
    /// Set for [`Logger::after_sql`].
    pub elapsed: Option<Duration>,
    /// Set when session ids are logged.
    pub session_id: Option<u64>,
    /// Error text when the statement failed.
    pub error: Option<&'a str>,
}

/// Receives engine messages and executed statements.
pub trait Logger: Send + Sync + Debug {
    /// A message at `level`; the engine has already applied its level filter.
    fn log(&self, level: LogLevel, msg: &str);

    /// Called before a statement runs.
    fn before_sql(&self, ctx: &SqlContext<'_>);

    /// Called after a statement ran.
    fn after_sql(&self, ctx: &SqlContext<'_>);
}

/// Forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Debug => debug!("{msg}"),
            LogLevel::Info => info!("{msg}"),
            LogLevel::Warn => warn!("{msg}"),
            LogLevel::Error => error!("{msg}"),
            LogLevel::Off => {}
        }
    }

    fn before_sql(&self, ctx: &SqlContext<'_>) {
        debug!(
            sql = %ctx.sql,
            args = ?ctx.args,
            session_id = ctx.session_id,
            "executing"
        );
    }

    fn after_sql(&self, ctx: &SqlContext<'_>) {
        let elapsed_ms = ctx.elapsed.map(|d| d.as_secs_f64() * 1000.0);
        match ctx.error {
            Some(err) => warn!(
                sql = %ctx.sql,
                args = ?ctx.args,
                elapsed_ms,
                session_id = ctx.session_id,
                error = %err,
                "statement failed"
            ),
            None => info!(
                sql = %ctx.sql,
                args = ?ctx.args,
                elapsed_ms,
                session_id = ctx.session_id,
                "executed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_parsing() {
        assert!(LogLevel::Debug < LogLevel::Warn);
        assert!(LogLevel::Error < LogLevel::Off);
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
