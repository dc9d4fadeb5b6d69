//! Command execution with guaranteed connection release
//!
//! An [`Executor`] owns one connection for one operation. Every operation
//! opens the connection when needed, runs the command, drops the cursor and
//! the command, and then closes the connection on every exit path: success,
//! driver or mapping errors, and cancellation through the executor's
//! [`CancellationToken`]. If the operation future itself is dropped, the
//! connection is released synchronously via [`Connection::close_now`].
//!
//! Errors are returned unchanged after the close. A failure to close is
//! logged and never replaces the operation's own result.

use super::command::{Command, CommandBehavior};
use super::connection::{Connection, ConnectionState};
use super::error::{DatabaseError, Result};
use super::value::{DbValue, Row};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Future returned by asynchronous row callbacks and mappers
pub type RowFuture<'r, T> = BoxFuture<'r, Result<T>>;

/// Race one driver step against the cancellation token
async fn cancellable<T, F>(token: &CancellationToken, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DatabaseError::Cancelled),
        result = step => result,
    }
}

/// Exclusive ownership of a connection for the length of one operation
struct ConnectionScope<C: Connection> {
    connection: C,
    released: bool,
}

impl<C: Connection> ConnectionScope<C> {
    fn new(connection: C) -> Self {
        Self {
            connection,
            released: false,
        }
    }

    /// Close the connection once, even after a failed open; close errors are
    /// logged, not returned
    async fn release(&mut self, failed: bool) {
        trace!(state = ?self.connection.state(), "closing connection");
        if let Err(e) = self.connection.close().await {
            warn!(error = %e, operation_failed = failed, "failed to close connection");
        }
        self.released = true;
    }
}

impl<C: Connection> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        if !self.released {
            warn!("operation dropped before completion, closing connection");
            self.connection.close_now();
        }
    }
}

/// Receives the rows of a reader one at a time
#[async_trait]
trait RowSink: Send {
    async fn accept(&mut self, row: &dyn Row) -> Result<()>;
}

struct Callback<F>(F);

#[async_trait]
impl<F> RowSink for Callback<F>
where
    F: FnMut(&dyn Row) -> Result<()> + Send,
{
    async fn accept(&mut self, row: &dyn Row) -> Result<()> {
        (self.0)(row)
    }
}

struct AsyncCallback<F>(F);

#[async_trait]
impl<F> RowSink for AsyncCallback<F>
where
    F: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, ()> + Send,
{
    async fn accept(&mut self, row: &dyn Row) -> Result<()> {
        (self.0)(row).await
    }
}

struct Collect<F, T> {
    mapper: F,
    rows: Vec<T>,
}

#[async_trait]
impl<F, T> RowSink for Collect<F, T>
where
    F: FnMut(&dyn Row) -> Result<T> + Send,
    T: Send,
{
    async fn accept(&mut self, row: &dyn Row) -> Result<()> {
        let mapped = (self.mapper)(row)?;
        self.rows.push(mapped);
        Ok(())
    }
}

struct CollectAsync<F, T> {
    mapper: F,
    rows: Vec<T>,
}

#[async_trait]
impl<F, T> RowSink for CollectAsync<F, T>
where
    F: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, T> + Send,
    T: Send,
{
    async fn accept(&mut self, row: &dyn Row) -> Result<()> {
        let mapped = (self.mapper)(row).await?;
        self.rows.push(mapped);
        Ok(())
    }
}

/// Runs one command against one connection
///
/// # Example
///
/// ```no_run
/// use rust_data_access::prelude::*;
///
/// # async fn run(connection: SqliteConnection) -> Result<()> {
/// let command = build_command(
///     "SELECT * FROM users WHERE id = @id",
///     [1i32.to_param("@id")],
/// );
/// let name = Executor::new(connection)
///     .query_one(command, |row| get_string(row, "name"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Executor<C: Connection> {
    scope: ConnectionScope<C>,
    cancel: CancellationToken,
}

impl<C: Connection> Executor<C> {
    /// Take ownership of a connection for one operation
    pub fn new(connection: C) -> Self {
        Self {
            scope: ConnectionScope::new(connection),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the operation when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run a statement and return the affected row count (-1 when not applicable)
    pub async fn execute_non_query(mut self, command: Command) -> Result<i64> {
        let outcome = self.non_query(command).await;
        self.finish("execute_non_query", outcome).await
    }

    /// Return the first column of the first row, [`DbValue::Null`] when there are no rows
    pub async fn execute_scalar(mut self, command: Command) -> Result<DbValue> {
        let outcome = self.scalar(command).await;
        self.finish("execute_scalar", outcome).await
    }

    /// Stream every row through `on_row`
    ///
    /// The row reference is only valid for the duration of the call. The
    /// first error from the callback stops the read and is returned.
    pub async fn execute_reader<F>(mut self, command: Command, on_row: F) -> Result<()>
    where
        F: FnMut(&dyn Row) -> Result<()> + Send,
    {
        let mut sink = Callback(on_row);
        let outcome = self.read(command, None, &mut sink).await;
        self.finish("execute_reader", outcome).await
    }

    /// Stream every row through an asynchronous callback
    pub async fn execute_reader_async<F>(mut self, command: Command, on_row: F) -> Result<()>
    where
        F: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, ()> + Send,
    {
        let mut sink = AsyncCallback(on_row);
        let outcome = self.read(command, None, &mut sink).await;
        self.finish("execute_reader_async", outcome).await
    }

    /// Map the first row, `None` when the query returns no rows
    pub async fn query_one<T, F>(mut self, command: Command, mapper: F) -> Result<Option<T>>
    where
        F: FnMut(&dyn Row) -> Result<T> + Send,
        T: Send,
    {
        let command = hint(command, CommandBehavior::SingleRow);
        let mut sink = Collect {
            mapper,
            rows: Vec::with_capacity(1),
        };
        let outcome = self.read(command, Some(1), &mut sink).await;
        let outcome = outcome.map(|()| sink.rows.into_iter().next());
        self.finish("query_one", outcome).await
    }

    /// Map the first row with an asynchronous mapper
    pub async fn query_one_async<T, F>(mut self, command: Command, mapper: F) -> Result<Option<T>>
    where
        F: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, T> + Send,
        T: Send,
    {
        let command = hint(command, CommandBehavior::SingleRow);
        let mut sink = CollectAsync {
            mapper,
            rows: Vec::with_capacity(1),
        };
        let outcome = self.read(command, Some(1), &mut sink).await;
        let outcome = outcome.map(|()| sink.rows.into_iter().next());
        self.finish("query_one_async", outcome).await
    }

    /// Map every row, preserving cursor order
    ///
    /// The whole result is materialized; an error on any row discards the
    /// rows mapped so far.
    pub async fn query_all<T, F>(mut self, command: Command, mapper: F) -> Result<Vec<T>>
    where
        F: FnMut(&dyn Row) -> Result<T> + Send,
        T: Send,
    {
        let command = hint(command, CommandBehavior::SingleResult);
        let mut sink = Collect {
            mapper,
            rows: Vec::new(),
        };
        let outcome = self.read(command, None, &mut sink).await;
        let outcome = outcome.map(|()| sink.rows);
        self.finish("query_all", outcome).await
    }

    /// Map every row with an asynchronous mapper
    pub async fn query_all_async<T, F>(mut self, command: Command, mapper: F) -> Result<Vec<T>>
    where
        F: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, T> + Send,
        T: Send,
    {
        let command = hint(command, CommandBehavior::SingleResult);
        let mut sink = CollectAsync {
            mapper,
            rows: Vec::new(),
        };
        let outcome = self.read(command, None, &mut sink).await;
        let outcome = outcome.map(|()| sink.rows);
        self.finish("query_all_async", outcome).await
    }

    async fn open(&mut self, command: &Command) -> Result<()> {
        debug!(
            command = command.text(),
            parameters = command.parameters().len(),
            behavior = ?command.behavior(),
            "binding command"
        );
        if self.scope.connection.state() != ConnectionState::Open {
            trace!("opening connection");
            cancellable(&self.cancel, self.scope.connection.open()).await?;
        }
        Ok(())
    }

    async fn non_query(&mut self, command: Command) -> Result<i64> {
        self.open(&command).await?;
        cancellable(&self.cancel, self.scope.connection.execute_non_query(&command)).await
    }

    async fn scalar(&mut self, command: Command) -> Result<DbValue> {
        self.open(&command).await?;
        cancellable(&self.cancel, self.scope.connection.execute_scalar(&command)).await
    }

    async fn read<S: RowSink>(
        &mut self,
        command: Command,
        limit: Option<usize>,
        sink: &mut S,
    ) -> Result<()> {
        self.open(&command).await?;
        let mut cursor =
            cancellable(&self.cancel, self.scope.connection.execute_reader(&command)).await?;

        let mut seen = 0usize;
        while limit.map_or(true, |max| seen < max)
            && cancellable(&self.cancel, cursor.advance()).await?
        {
            cancellable(&self.cancel, sink.accept(cursor.row())).await?;
            seen += 1;
        }
        trace!(rows = seen, "reader finished");

        // cursor before command, both before the connection closes
        drop(cursor);
        drop(command);
        Ok(())
    }

    async fn finish<T>(mut self, operation: &'static str, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => debug!(operation, "operation completed"),
            Err(e) => debug!(operation, error = %e, "operation failed"),
        }
        self.scope.release(outcome.is_err()).await;
        outcome
    }
}

/// Apply a result-shape hint unless the caller chose one
fn hint(command: Command, behavior: CommandBehavior) -> Command {
    if command.behavior() == CommandBehavior::Default {
        command.with_behavior(behavior)
    } else {
        command
    }
}
