#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use oxide_orm::{Engine, LogLevel, Logger, SqlContext};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes engine logs to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Captures every executed statement.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    statements: Mutex<Vec<String>>,
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Statements starting with `prefix` (case-insensitive).
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_uppercase();
        self.statements()
            .into_iter()
            .filter(|sql| sql.to_ascii_uppercase().starts_with(&prefix))
            .collect()
    }

    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
        self.messages.lock().unwrap().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, msg: &str) {
        self.messages.lock().unwrap().push((level, msg.to_string()));
    }

    fn before_sql(&self, ctx: &SqlContext<'_>) {
        self.statements.lock().unwrap().push(ctx.sql.to_string());
    }

    fn after_sql(&self, _ctx: &SqlContext<'_>) {}
}

/// Engine on a private in-memory database.
pub async fn engine() -> Engine {
    init_tracing();
    Engine::open("sqlite", "sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite")
}

/// Engine whose statements are recorded.
pub async fn recorded_engine() -> (Engine, Arc<RecordingLogger>) {
    let engine = engine().await;
    let logger = Arc::new(RecordingLogger::default());
    engine.set_logger(logger.clone());
    engine.show_sql(true);
    (engine, logger)
}

/// Engine on a database file, for tests that need several connections.
pub async fn file_engine() -> (Engine, TempDir) {
    init_tracing();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let dsn = format!("sqlite://{}", dir.path().join("test.db").display());
    let engine = Engine::open("sqlite", &dsn)
        .await
        .expect("Failed to open sqlite file");
    (engine, dir)
}
