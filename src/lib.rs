//! # Rust Data Access
//!
//! A thin, typed command execution layer over SQL drivers. Callers build a
//! [`Command`] from SQL text and named, typed [`Parameter`]s, hand it to an
//! [`Executor`] together with a connection, and map result rows with small
//! coercion helpers. The executor guarantees the connection is closed on every
//! exit path, including errors and cancellation.
//!
//! ## Features
//!
//! - **Typed parameters**: every native value knows its [`TypeTag`], nulls included
//! - **Scoped connections**: one connection per operation, always released
//! - **Streaming reads**: rows are visited one at a time through a forward-only cursor
//! - **Row coercion**: `get_string`, `get_int`, `get_guid` and friends with null defaults
//! - **Cancellation**: every operation can be aborted through a `CancellationToken`
//! - **Async Support**: async/await with Tokio, sync or async row mappers
//!
//! ## Supported Databases
//!
//! | Database | Feature | Driver |
//! |----------|---------|--------|
//! | SQLite | `sqlite` (default) | rusqlite, bundled |
//! | PostgreSQL | `postgres` | tokio-postgres |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_data_access::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let db = Database::connect_sqlite("app.db");
//!
//!     db.execute_non_query(Command::new(
//!         "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)",
//!     ))
//!     .await?;
//!
//!     db.execute_non_query(build_command(
//!         "INSERT INTO users (name) VALUES (@name)",
//!         ["Alice".to_param("@name")],
//!     ))
//!     .await?;
//!
//!     let names = db
//!         .query_all(Command::new("SELECT name FROM users"), |row| {
//!             get_string(row, "name")
//!         })
//!         .await?;
//!     println!("{:?}", names);
//!     Ok(())
//! }
//! ```
//!
//! ### One Executor, One Connection
//!
//! ```rust,no_run
//! use rust_data_access::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let connection = SqliteConnection::new("app.db");
//! let user = Executor::new(connection)
//!     .query_one(
//!         build_command("SELECT * FROM users WHERE id = @id", [7i32.to_param("@id")]),
//!         |row| Ok((get_int(row, "id")?, get_string(row, "name")?)),
//!     )
//!     .await?;
//! // the connection is closed here, whatever the outcome
//! # Ok(())
//! # }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── command.rs        # Commands and command builders
//! │   ├── connection.rs     # Driver seam
//! │   ├── database.rs       # Facade and connection configuration
//! │   ├── decimal.rs        # Exact decimal values
//! │   ├── executor.rs       # Scoped execution
//! │   ├── mapper.rs         # Row coercion helpers
//! │   ├── parameter.rs      # Typed parameters
//! │   ├── type_tag.rs       # Type tags and the type registry
//! │   └── value.rs          # Values and rows
//! ├── backends/
//! │   ├── sqlite.rs
//! │   └── postgres.rs
//! └── lib.rs
//! ```

/// Core data access types and traits
pub mod core;

/// Database driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_data_access::prelude::*;
///
/// let cmd = build_command("SELECT @id", [1i32.to_param("@id")]);
/// assert_eq!(cmd.parameters()[0].type_tag(), TypeTag::Int32);
/// ```
pub mod prelude {
    pub use crate::core::{
        build_command, build_command_inferred, build_command_with_kind, get, get_date,
        get_date_nullable, get_decimal, get_document, get_float, get_guid, get_guid_nullable,
        get_int, get_long, get_or, get_string, to_param, Command, CommandBehavior, CommandKind,
        Connection, ConnectionBuilder, ConnectionFactory, ConnectionState, Database,
        DatabaseError, DatabaseType, DbRow, DbValue, Decimal, Executor, Parameter,
        ParameterDirection, Result, Row, RowCursor, RowFuture, ToParam, TypeMapper, TypeTag,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::{SqliteConnection, SqliteConnectionFactory};

    #[cfg(feature = "postgres")]
    pub use crate::backends::{PostgresConnection, PostgresConnectionFactory};
}

// Re-export at root level for convenience
pub use crate::core::{
    BoxedConnectionFactory, Command, ConnectionBuilder, Database, DatabaseError, DatabaseType,
    DbValue, Decimal, Executor, Parameter, Result, TypeTag,
};

#[cfg(feature = "sqlite")]
pub use crate::backends::SqliteConnection;

#[cfg(feature = "postgres")]
pub use crate::backends::PostgresConnection;
