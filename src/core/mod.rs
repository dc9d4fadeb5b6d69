//! Core data access types and traits
//!
//! This module provides the building blocks every driver and caller shares:
//! values and type tags, parameters and commands, the connection seam, the
//! executor and the row coercion helpers.

pub mod command;
pub mod connection;
pub mod database;
pub mod database_types;
pub mod decimal;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod parameter;
pub mod type_tag;
pub mod value;

// Re-export commonly used types
pub use command::{
    build_command, build_command_inferred, build_command_with_kind, Command, CommandBehavior,
    CommandKind,
};
pub use connection::{Connection, ConnectionFactory, ConnectionState, RowCursor};
pub use database::{BoxedConnectionFactory, ConnectionBuilder, Database};
pub use database_types::DatabaseType;
pub use decimal::Decimal;
pub use error::{DatabaseError, Result};
pub use executor::{Executor, RowFuture};
pub use mapper::{
    get, get_date, get_date_nullable, get_decimal, get_document, get_float, get_guid,
    get_guid_nullable, get_int, get_long, get_or, get_string, FromDbValue,
};
pub use parameter::{to_param, Parameter, ParameterDirection, ParameterValue, ToParam};
pub use type_tag::{TypeMapper, TypeTag};
pub use value::{DbRow, DbValue, Row};
