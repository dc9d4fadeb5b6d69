//! Database facade and connection configuration
//!
//! [`Database`] hands every operation a fresh connection from its
//! [`ConnectionFactory`] and runs it through one [`Executor`]. Operations share
//! nothing but the factory and a root cancellation token, so a `Database` can
//! be used from many tasks at once.

use super::command::Command;
use super::connection::{Connection, ConnectionFactory};
use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use super::executor::{Executor, RowFuture};
use super::value::{DbValue, Row};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Entry point for running commands against a connection factory
pub struct Database<F: ConnectionFactory> {
    factory: F,
    cancel: Mutex<CancellationToken>,
}

impl<F: ConnectionFactory> Database<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// The factory connections are drawn from
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Cancel every operation currently in flight
    ///
    /// Cancelled operations still close their connections and report
    /// [`DatabaseError::Cancelled`]. Operations started afterwards are unaffected.
    pub fn cancel_all(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        debug!("cancelling in-flight operations");
        previous.cancel();
    }

    /// An executor over a fresh connection, cancelled by [`Database::cancel_all`]
    pub fn executor(&self) -> Result<Executor<F::Connection>> {
        let connection = self.factory.create()?;
        let token = self.cancel.lock().child_token();
        Ok(Executor::new(connection).with_cancellation(token))
    }

    pub async fn execute_non_query(&self, command: Command) -> Result<i64> {
        self.executor()?.execute_non_query(command).await
    }

    pub async fn execute_scalar(&self, command: Command) -> Result<DbValue> {
        self.executor()?.execute_scalar(command).await
    }

    pub async fn execute_reader<C>(&self, command: Command, on_row: C) -> Result<()>
    where
        C: FnMut(&dyn Row) -> Result<()> + Send,
    {
        self.executor()?.execute_reader(command, on_row).await
    }

    pub async fn execute_reader_async<C>(&self, command: Command, on_row: C) -> Result<()>
    where
        C: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, ()> + Send,
    {
        self.executor()?.execute_reader_async(command, on_row).await
    }

    pub async fn query_one<T, M>(&self, command: Command, mapper: M) -> Result<Option<T>>
    where
        M: FnMut(&dyn Row) -> Result<T> + Send,
        T: Send,
    {
        self.executor()?.query_one(command, mapper).await
    }

    pub async fn query_one_async<T, M>(&self, command: Command, mapper: M) -> Result<Option<T>>
    where
        M: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, T> + Send,
        T: Send,
    {
        self.executor()?.query_one_async(command, mapper).await
    }

    pub async fn query_all<T, M>(&self, command: Command, mapper: M) -> Result<Vec<T>>
    where
        M: FnMut(&dyn Row) -> Result<T> + Send,
        T: Send,
    {
        self.executor()?.query_all(command, mapper).await
    }

    pub async fn query_all_async<T, M>(&self, command: Command, mapper: M) -> Result<Vec<T>>
    where
        M: for<'r> FnMut(&'r dyn Row) -> RowFuture<'r, T> + Send,
        T: Send,
    {
        self.executor()?.query_all_async(command, mapper).await
    }
}

#[cfg(feature = "sqlite")]
impl Database<crate::backends::sqlite::SqliteConnectionFactory> {
    /// Facade over a SQLite database file
    pub fn connect_sqlite(path: impl Into<String>) -> Self {
        Self::new(crate::backends::sqlite::SqliteConnectionFactory::new(path))
    }
}

#[cfg(feature = "postgres")]
impl Database<crate::backends::postgres::PostgresConnectionFactory> {
    /// Facade over a PostgreSQL server
    pub fn connect_postgres(connection_string: impl Into<String>) -> Self {
        Self::new(crate::backends::postgres::PostgresConnectionFactory::new(
            connection_string,
        ))
    }
}

impl Database<BoxedConnectionFactory> {
    /// Facade over the driver a configuration selects
    pub fn from_config(config: &ConnectionBuilder) -> Result<Self> {
        Ok(Self::new(BoxedConnectionFactory::from_config(config)?))
    }
}

fn driver_disabled(db_type: DatabaseType) -> DatabaseError {
    DatabaseError::InvalidConnectionString(format!(
        "driver '{}' is not enabled in this build",
        db_type
    ))
}

type CreateFn = dyn Fn() -> Result<Box<dyn Connection>> + Send + Sync;

/// Factory whose driver is chosen at runtime
pub struct BoxedConnectionFactory {
    db_type: DatabaseType,
    create: Box<CreateFn>,
}

impl BoxedConnectionFactory {
    /// Wrap any factory, erasing its connection type
    pub fn new<F: ConnectionFactory + 'static>(db_type: DatabaseType, factory: F) -> Self {
        Self {
            db_type,
            create: Box::new(move || {
                let connection: Box<dyn Connection> = Box::new(factory.create()?);
                Ok(connection)
            }),
        }
    }

    /// Pick the built-in driver for `config`
    pub fn from_config(config: &ConnectionBuilder) -> Result<Self> {
        let db_type = config.database_type();
        if !db_type.is_enabled() {
            return Err(driver_disabled(db_type));
        }
        let connection_string = config.build_connection_string();
        match db_type {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Self::new(
                DatabaseType::Sqlite,
                crate::backends::sqlite::SqliteConnectionFactory::new(connection_string),
            )),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(Self::new(
                DatabaseType::Postgres,
                crate::backends::postgres::PostgresConnectionFactory::new(connection_string),
            )),
            #[allow(unreachable_patterns)]
            other => Err(driver_disabled(other)),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }
}

impl ConnectionFactory for BoxedConnectionFactory {
    type Connection = Box<dyn Connection>;

    fn create(&self) -> Result<Box<dyn Connection>> {
        (self.create)()
    }
}

/// Builder for database connection settings
///
/// Deserializes from configuration files with every field optional:
///
/// ```
/// use rust_data_access::{ConnectionBuilder, DatabaseType};
///
/// let config: ConnectionBuilder = serde_json::from_str(
///     r#"{ "type": "postgres", "host": "db", "database": "app" }"#,
/// ).unwrap();
/// assert_eq!(config.database_type(), DatabaseType::Postgres);
/// assert_eq!(config.build_connection_string(), "host=db dbname=app");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionBuilder {
    #[serde(rename = "type")]
    db_type: DatabaseType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: BTreeMap<String, String>,
}

impl ConnectionBuilder {
    /// Create a new connection builder for the specified database type
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            ..Default::default()
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Set the database host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the database port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (the file path for SQLite)
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a driver-specific option
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Build the connection string
    pub fn build_connection_string(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => self
                .database
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
            DatabaseType::Postgres => {
                let mut parts = Vec::new();
                if let Some(host) = &self.host {
                    parts.push(format!("host={}", quote_pg(host)));
                }
                if let Some(port) = self.port {
                    parts.push(format!("port={}", port));
                }
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", quote_pg(database)));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", quote_pg(username)));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", quote_pg(password)));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, quote_pg(value)));
                }
                parts.join(" ")
            }
        }
    }
}

/// Quote a key/value connection string value when it needs it
fn quote_pg(value: &str) -> String {
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '\'' || c == '\\')
    {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builder_sqlite() {
        let builder = ConnectionBuilder::new(DatabaseType::Sqlite).database("test.db");
        assert_eq!(builder.build_connection_string(), "test.db");

        let builder = ConnectionBuilder::new(DatabaseType::Sqlite);
        assert_eq!(builder.build_connection_string(), ":memory:");
    }

    #[test]
    fn test_connection_builder_postgres() {
        let builder = ConnectionBuilder::new(DatabaseType::Postgres)
            .host("localhost")
            .port(5432)
            .database("mydb")
            .username("user")
            .password("pass");

        assert_eq!(
            builder.build_connection_string(),
            "host=localhost port=5432 dbname=mydb user=user password=pass"
        );
    }

    #[test]
    fn test_connection_builder_quotes_values() {
        let builder = ConnectionBuilder::new(DatabaseType::Postgres)
            .password("it's secret")
            .option("application_name", "");

        assert_eq!(
            builder.build_connection_string(),
            "password='it\\'s secret' application_name=''"
        );
    }

    #[test]
    fn test_connection_builder_deserialize() {
        let builder: ConnectionBuilder = serde_json::from_str(
            r#"{ "type": "postgres", "host": "db", "port": 6432, "options": { "sslmode": "disable" } }"#,
        )
        .unwrap();
        assert_eq!(builder.database_type(), DatabaseType::Postgres);
        assert_eq!(
            builder.build_connection_string(),
            "host=db port=6432 sslmode=disable"
        );

        let empty: ConnectionBuilder = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ConnectionBuilder::new(DatabaseType::Sqlite));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_boxed_factory_from_config() {
        let config = ConnectionBuilder::new(DatabaseType::Sqlite).database("app.db");
        let factory = BoxedConnectionFactory::from_config(&config).unwrap();
        assert_eq!(factory.database_type(), DatabaseType::Sqlite);
        let connection = factory.create().unwrap();
        assert_eq!(
            connection.state(),
            crate::core::connection::ConnectionState::Closed
        );
    }

    #[test]
    fn test_from_config_only_selects_enabled_drivers() {
        for db_type in [DatabaseType::Sqlite, DatabaseType::Postgres] {
            let config = ConnectionBuilder::new(db_type).database("app");
            let factory = BoxedConnectionFactory::from_config(&config);
            assert_eq!(factory.is_ok(), db_type.is_enabled());
            if let Ok(factory) = factory {
                assert_eq!(factory.database_type(), db_type);
            }
        }
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_disabled_driver_is_rejected() {
        let config = ConnectionBuilder::new(DatabaseType::Postgres);
        assert!(matches!(
            BoxedConnectionFactory::from_config(&config),
            Err(DatabaseError::InvalidConnectionString(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_database_runs_each_call_on_fresh_connection() -> Result<()> {
        use crate::core::mapper::get_string;
        use crate::core::parameter::ToParam;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("facade.db");
        let db = Database::connect_sqlite(path.to_string_lossy());

        db.execute_non_query(Command::new(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
        ))
        .await?;
        db.execute_non_query(
            Command::new("INSERT INTO users (id, name) VALUES (@id, @name)")
                .with_param(1i32.to_param("@id"))
                .with_param("Alice".to_param("@name")),
        )
        .await?;

        let name = db
            .query_one(
                Command::new("SELECT name FROM users WHERE id = @id")
                    .with_param(1i32.to_param("@id")),
                |row| get_string(row, "name"),
            )
            .await?;
        assert_eq!(name.as_deref(), Some("Alice"));
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_cancel_all_only_affects_in_flight_operations() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::connect_sqlite(dir.path().join("c.db").to_string_lossy());

        let executor = db.executor()?;
        db.cancel_all();
        let cancelled = executor.execute_scalar(Command::new("SELECT 1")).await;
        assert!(matches!(cancelled, Err(DatabaseError::Cancelled)));

        let value = db.execute_scalar(Command::new("SELECT 1")).await?;
        assert_eq!(value, DbValue::Int64(1));
        Ok(())
    }
}
