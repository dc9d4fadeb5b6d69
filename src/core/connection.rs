//! Driver seam: connections, row cursors and connection factories
//!
//! A driver implements [`Connection`] and [`RowCursor`]; the executor drives
//! them and owns every connection for exactly one operation.

use super::command::Command;
use super::error::Result;
use super::value::{DbValue, Row};
use async_trait::async_trait;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not opened yet, or closed again
    #[default]
    Closed,
    Open,
}

/// A single driver connection
///
/// # Thread Safety
/// A connection is used by one operation at a time and is never shared; the
/// executor takes it by value.
#[async_trait]
pub trait Connection: Send {
    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Open the connection
    async fn open(&mut self) -> Result<()>;

    /// Close the connection; a no-op when already closed
    async fn close(&mut self) -> Result<()>;

    /// Release the connection without awaiting the driver
    ///
    /// Called when an operation future is dropped before it could close the
    /// connection through [`Connection::close`].
    fn close_now(&mut self);

    /// Run a statement and return the number of affected rows
    ///
    /// Drivers report -1 when the count does not apply.
    async fn execute_non_query(&mut self, command: &Command) -> Result<i64>;

    /// Run a query and return the first column of the first row,
    /// [`DbValue::Null`] when there are no rows
    async fn execute_scalar(&mut self, command: &Command) -> Result<DbValue>;

    /// Run a query and return a forward-only cursor over its rows
    async fn execute_reader(&mut self, command: &Command) -> Result<Box<dyn RowCursor>>;
}

/// Forward-only cursor over query results
#[async_trait]
pub trait RowCursor: Send {
    /// Move to the next row; `false` once the results are exhausted
    async fn advance(&mut self) -> Result<bool>;

    /// The current row; only meaningful after [`RowCursor::advance`] returned `true`
    fn row(&self) -> &dyn Row;
}

/// Produces fresh, unopened connections
pub trait ConnectionFactory: Send + Sync {
    type Connection: Connection + 'static;

    fn create(&self) -> Result<Self::Connection>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    fn state(&self) -> ConnectionState {
        (**self).state()
    }

    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn close_now(&mut self) {
        (**self).close_now()
    }

    async fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        (**self).execute_non_query(command).await
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<DbValue> {
        (**self).execute_scalar(command).await
    }

    async fn execute_reader(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        (**self).execute_reader(command).await
    }
}
