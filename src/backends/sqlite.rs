//! SQLite driver
//!
//! Each [`SqliteConnection`] opens its database file on [`Connection::open`]
//! and releases it on close. Blocking rusqlite calls run on the blocking
//! thread pool; reader results are streamed row by row through a bounded
//! channel so a query is never materialized by the driver.

use crate::core::{
    command::{Command, CommandBehavior, CommandKind},
    connection::{Connection, ConnectionFactory, ConnectionState, RowCursor},
    error::{DatabaseError, Result},
    parameter::{Parameter, PARAMETER_SIGILS},
    value::{DbRow, DbValue, Row},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Statement;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Rows buffered between the blocking reader and the cursor
const ROW_CHANNEL_CAPACITY: usize = 1;

/// Text layout used for timestamps bound as parameters
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

type Shared = Arc<Mutex<Option<rusqlite::Connection>>>;

/// SQLite connection to one database file
pub struct SqliteConnection {
    path: String,
    inner: Shared,
    state: ConnectionState,
}

impl SqliteConnection {
    /// Create an unopened connection to `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            inner: Arc::new(Mutex::new(None)),
            state: ConnectionState::Closed,
        }
    }

    /// Database file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner.lock();
            let conn = guard
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
            f(conn)
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> Result<()> {
        if self.state == ConnectionState::Open {
            return Ok(());
        }
        let path = self.path.clone();
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = rusqlite::Connection::open(&path)?;
            conn.execute("PRAGMA foreign_keys = ON", [])?;
            *inner.lock() = Some(conn);
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))??;

        self.state = ConnectionState::Open;
        trace!(path = %self.path, "sqlite connection opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || -> Result<()> {
            // waits for a reader still draining on the blocking pool
            let conn = inner.lock().take();
            match conn {
                Some(conn) => conn.close().map_err(|(_, e)| DatabaseError::from(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))??;

        trace!(path = %self.path, "sqlite connection closed");
        Ok(())
    }

    fn close_now(&mut self) {
        self.state = ConnectionState::Closed;
        // A reader task still holding the lock drops the last handle when it stops.
        if let Some(mut guard) = self.inner.try_lock() {
            guard.take();
        }
    }

    async fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        let command = command.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&statement_text(&command)?)?;
            bind_parameters(&mut stmt, &command)?;
            if stmt.column_count() > 0 {
                // row-returning statements run to completion and report no count
                let mut rows = stmt.raw_query();
                while rows.next()?.is_some() {}
                return Ok(-1);
            }
            let affected = stmt.raw_execute()?;
            Ok(affected as i64)
        })
        .await
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<DbValue> {
        let command = command.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&statement_text(&command)?)?;
            bind_parameters(&mut stmt, &command)?;
            let mut rows = stmt.raw_query();
            match rows.next()? {
                Some(row) => Ok(from_sql_value(row.get_ref(0)?)),
                None => Ok(DbValue::Null),
            }
        })
        .await
    }

    async fn execute_reader(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        if self.state != ConnectionState::Open {
            return Err(DatabaseError::connection("Not connected to database"));
        }
        let command = command.clone();
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);

        let task = tokio::task::spawn_blocking(move || {
            let guard = inner.lock();
            let streamed = match guard.as_ref() {
                Some(conn) => stream_rows(conn, &command, &tx),
                None => Err(DatabaseError::connection("Not connected to database")),
            };
            if let Err(e) = streamed {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(Box::new(SqliteCursor {
            rows: rx,
            task: Some(task),
            current: None,
            empty: DbRow::new(Arc::from(Vec::new()), Vec::new()),
        }))
    }
}

/// Produce rows until the results end or the cursor goes away
fn stream_rows(
    conn: &rusqlite::Connection,
    command: &Command,
    tx: &mpsc::Sender<Result<DbRow>>,
) -> Result<()> {
    let mut stmt = conn.prepare(&statement_text(command)?)?;
    bind_parameters(&mut stmt, command)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let limit = match command.behavior() {
        CommandBehavior::SingleRow => Some(1),
        CommandBehavior::SchemaOnly => Some(0),
        _ => None,
    };

    let mut rows = stmt.raw_query();
    let mut sent = 0usize;
    while limit.map_or(true, |max| sent < max) {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(from_sql_value(row.get_ref(idx)?));
        }
        if tx
            .blocking_send(Ok(DbRow::new(Arc::clone(&columns), values)))
            .is_err()
        {
            // cursor dropped
            break;
        }
        sent += 1;
    }
    Ok(())
}

struct SqliteCursor {
    rows: mpsc::Receiver<Result<DbRow>>,
    task: Option<JoinHandle<()>>,
    current: Option<DbRow>,
    empty: DbRow,
}

#[async_trait]
impl RowCursor for SqliteCursor {
    async fn advance(&mut self) -> Result<bool> {
        self.current = None;
        match self.rows.recv().await {
            Some(Ok(row)) => {
                self.current = Some(row);
                Ok(true)
            }
            Some(Err(e)) => Err(e),
            None => {
                // a panicking reader also closes the channel
                if let Some(task) = self.task.take() {
                    task.await
                        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?;
                }
                Ok(false)
            }
        }
    }

    fn row(&self) -> &dyn Row {
        match &self.current {
            Some(row) => row,
            None => &self.empty,
        }
    }
}

fn statement_text(command: &Command) -> Result<Cow<'_, str>> {
    match command.kind() {
        CommandKind::Text => Ok(Cow::Borrowed(command.text())),
        CommandKind::TableDirect => Ok(Cow::Owned(format!(
            "SELECT * FROM \"{}\"",
            command.text().replace('"', "\"\"")
        ))),
        CommandKind::StoredProcedure => Err(DatabaseError::query(
            "SQLite does not support stored procedures",
        )),
    }
}

fn bind_parameters(stmt: &mut Statement<'_>, command: &Command) -> Result<()> {
    for param in command.parameters() {
        let index = parameter_index(stmt, param)?.ok_or_else(|| {
            DatabaseError::query(format!(
                "parameter {} does not appear in the command text",
                param.name()
            ))
        })?;
        stmt.raw_bind_parameter(index, to_sql_value(param.name(), param.value())?)?;
    }
    Ok(())
}

/// Find a parameter by its own name, then by the same name under another sigil
fn parameter_index(stmt: &Statement<'_>, param: &Parameter) -> Result<Option<usize>> {
    if let Some(index) = stmt.parameter_index(param.name())? {
        return Ok(Some(index));
    }
    for sigil in PARAMETER_SIGILS {
        let name = format!("{}{}", sigil, param.bare_name());
        if let Some(index) = stmt.parameter_index(&name)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Convert a DbValue to an owned SQLite value
fn to_sql_value(name: &str, value: &DbValue) -> Result<Value> {
    Ok(match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(v) => Value::Integer(*v as i64),
        DbValue::Byte(v) => Value::Integer(*v as i64),
        DbValue::SByte(v) => Value::Integer(*v as i64),
        DbValue::Int16(v) => Value::Integer(*v as i64),
        DbValue::UInt16(v) => Value::Integer(*v as i64),
        DbValue::Int32(v) => Value::Integer(*v as i64),
        DbValue::UInt32(v) => Value::Integer(*v as i64),
        DbValue::Int64(v) => Value::Integer(*v),
        DbValue::UInt64(v) => Value::Integer(i64::try_from(*v).map_err(|_| {
            DatabaseError::unsupported_parameter(name, "u64 value exceeds SQLite INTEGER range")
        })?),
        DbValue::Single(v) => Value::Real(*v as f64),
        DbValue::Double(v) => Value::Real(*v),
        DbValue::Decimal(v) => Value::Text(v.to_string()),
        DbValue::DateTime(v) => Value::Text(v.format(DATE_TIME_FORMAT).to_string()),
        DbValue::DateTimeOffset(v) => Value::Text(v.to_rfc3339()),
        DbValue::TimeSpan(v) => Value::Integer(v.num_microseconds().ok_or_else(|| {
            DatabaseError::unsupported_parameter(name, "time span overflows microseconds")
        })?),
        DbValue::Guid(v) => Value::Text(v.to_string()),
        DbValue::String(v) => Value::Text(v.clone()),
        DbValue::Binary(v) => Value::Blob(v.clone()),
        DbValue::Json(v) => Value::Text(v.to_string()),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(v) => DbValue::Int64(v),
        ValueRef::Real(v) => DbValue::Double(v),
        ValueRef::Text(v) => match std::str::from_utf8(v) {
            Ok(text) => DbValue::String(text.to_string()),
            // text that is not valid UTF-8 keeps its raw bytes
            Err(_) => DbValue::Binary(v.to_vec()),
        },
        ValueRef::Blob(v) => DbValue::Binary(v.to_vec()),
    }
}

/// Creates [`SqliteConnection`]s for one database file
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    path: String,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    type Connection = SqliteConnection;

    fn create(&self) -> Result<SqliteConnection> {
        Ok(SqliteConnection::new(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parameter::ToParam;

    fn db_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("test.db").to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_sqlite_open_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        assert_eq!(conn.state(), ConnectionState::Closed);

        conn.open().await?;
        assert_eq!(conn.state(), ConnectionState::Open);

        conn.close().await?;
        assert_eq!(conn.state(), ConnectionState::Closed);

        // closing twice is a no-op
        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_execute_and_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        conn.open().await?;

        conn.execute_non_query(&Command::new(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)",
        ))
        .await?;
        let affected = conn
            .execute_non_query(
                &Command::new("INSERT INTO test (name) VALUES (@name)")
                    .with_param("Alice".to_param("@name")),
            )
            .await?;
        assert_eq!(affected, 1);

        let count = conn
            .execute_scalar(&Command::new("SELECT COUNT(*) FROM test"))
            .await?;
        assert_eq!(count, DbValue::Int64(1));

        let mut cursor = conn
            .execute_reader(&Command::new("SELECT id, name FROM test"))
            .await?;
        assert!(cursor.advance().await?);
        assert_eq!(
            cursor.row().value("name"),
            Some(&DbValue::String("Alice".to_string()))
        );
        assert!(!cursor.advance().await?);
        drop(cursor);

        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_unknown_parameter_is_driver_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        conn.open().await?;

        let result = conn
            .execute_scalar(&Command::new("SELECT @a").with_param(1i32.to_param("@b")))
            .await;
        assert!(matches!(result, Err(DatabaseError::QueryError(_))));

        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_binds_across_sigils() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        conn.open().await?;

        let value = conn
            .execute_scalar(&Command::new("SELECT :v + 1").with_param(41i64.to_param("@v")))
            .await?;
        assert_eq!(value, DbValue::Int64(42));

        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_non_query_on_row_statement() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        conn.open().await?;

        let affected = conn.execute_non_query(&Command::new("SELECT 1")).await?;
        assert_eq!(affected, -1);
        let affected = conn
            .execute_non_query(&Command::new("PRAGMA journal_mode"))
            .await?;
        assert_eq!(affected, -1);

        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_invalid_utf8_text_keeps_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut conn = SqliteConnection::new(db_path(&dir));
        conn.open().await?;

        let value = conn
            .execute_scalar(&Command::new("SELECT CAST(x'ff61' AS TEXT)"))
            .await?;
        assert_eq!(value, DbValue::Binary(vec![0xff, 0x61]));

        conn.close().await?;
        Ok(())
    }

    #[test]
    fn test_value_to_param() -> Result<()> {
        assert_eq!(to_sql_value("@v", &DbValue::Bool(true))?, Value::Integer(1));
        assert_eq!(
            to_sql_value("@v", &DbValue::Decimal("1.25".parse().unwrap()))?,
            Value::Text("1.25".to_string())
        );
        assert!(to_sql_value("@v", &DbValue::UInt64(u64::MAX)).is_err());
        Ok(())
    }

    #[test]
    fn test_statement_text() {
        let cmd = Command::new("users").with_kind(CommandKind::TableDirect);
        assert_eq!(statement_text(&cmd).unwrap(), "SELECT * FROM \"users\"");

        let cmd = Command::new("proc").with_kind(CommandKind::StoredProcedure);
        assert!(statement_text(&cmd).is_err());
    }
}
