//! Database driver implementations
//!
//! Each driver implements the [`Connection`](crate::core::Connection) seam
//! and provides a [`ConnectionFactory`](crate::core::ConnectionFactory).

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteConnectionFactory};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnection, PostgresConnectionFactory};
