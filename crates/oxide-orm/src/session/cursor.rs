//! Lazy row cursors.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use futures::stream::{BoxStream, Stream, StreamExt};
use oxide_sql_core::{Record, SqlValue, Table};

use super::scan::{column_mapping, scan_values};
use super::Session;
use crate::driver::Connection;
use crate::error::Result;
use crate::logger::SqlContext;

/// The connection a cursor reads from.
enum Source<'s> {
    /// The session's transaction connection.
    Borrowed(&'s mut Box<dyn Connection>),
    /// A connection leased for this cursor alone, released when it drops.
    Owned(Box<dyn Connection>),
}

impl Source<'_> {
    fn conn(&mut self) -> &mut dyn Connection {
        match self {
            Self::Borrowed(conn) => &mut ***conn,
            Self::Owned(conn) => &mut **conn,
        }
    }
}

/// A stream of records read one row at a time.
///
/// Cascade fields are not loaded; `after_load` runs for every record.
///
/// ```ignore
/// use futures::TryStreamExt;
///
/// let mut session = engine.new_session();
/// let mut cursor = session.where_("age > ?", args![18]).rows::<User>().await?;
/// while let Some(user) = cursor.try_next().await? {
///     println!("{}", user.name);
/// }
/// ```
pub struct Cursor<'s, T> {
    inner: BoxStream<'s, Result<T>>,
}

impl<T> std::fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

impl<T> Stream for Cursor<'_, T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Session {
    fn cursor_sql<T: Record>(&self) -> Result<(Arc<Table>, String, Vec<SqlValue>)> {
        self.check_open()?;
        let table = self.engine().table_info::<T>()?;
        let (sql, args) = if let Some(raw) = self.statement.raw.clone() {
            raw
        } else {
            let dialect = self.engine().dialect();
            let cx = self.sql_cx(dialect.as_ref());
            let plan = self.statement.select_plan::<T>(&table, None, &cx)?;
            (plan.sql(&cx), plan.args)
        };
        let (sql, args) = self.prepare(&sql, args)?;
        Ok((table, sql, args))
    }

    /// Streams the matching records.
    ///
    /// Outside a transaction the cursor holds its own connection until it
    /// is dropped; inside one it reads through the session's connection.
    ///
    /// # Errors
    ///
    /// Fails when the statement cannot be built or no connection is
    /// available; row errors are yielded by the stream.
    pub async fn rows<T: Record>(&mut self) -> Result<Cursor<'_, T>> {
        let prepared = self.cursor_sql::<T>();
        let (table, sql, args) = match prepared {
            Ok(p) => p,
            Err(e) => {
                self.finish();
                return Err(e);
            }
        };
        let ctx = self.ctx.clone().unwrap_or_default();
        let convert = self.engine().convert_context();
        let logger = self.engine().sql_logger();
        let session_id = logger.as_ref().and_then(|(_, with_id)| with_id.then_some(self.id));
        self.log_sql(&sql, &args, None, None);

        let mut source = if self.tx.is_active() {
            self.finish();
            Source::Borrowed(self.connection().await?)
        } else {
            let conn = match self.take_connection() {
                Some(conn) => Ok(conn),
                None => self.engine().driver().acquire().await,
            };
            self.finish();
            Source::Owned(conn?)
        };

        let stream = async_stream::try_stream! {
            let start = Instant::now();
            let mut rows = source.conn().fetch(sql.clone(), args.clone());
            let mut mapping = None;
            loop {
                let Some(row) = ctx.run(async { Ok(rows.next().await) }).await? else {
                    break;
                };
                let row = row.map_err(|e| e.with_sql(&sql, &args))?;
                let mapping = mapping.get_or_insert_with(|| column_mapping(&table, &row.columns));
                let (mut bean, _) = scan_values::<T>(&table, mapping, row.values, convert, false)?;
                bean.after_load();
                yield bean;
            }
            if let Some((logger, _)) = &logger {
                logger.after_sql(&SqlContext {
                    sql: &sql,
                    args: &args,
                    elapsed: Some(start.elapsed()),
                    session_id,
                    error: None,
                });
            }
        };
        Ok(Cursor {
            inner: stream.boxed(),
        })
    }
}
