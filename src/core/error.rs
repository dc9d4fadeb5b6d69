//! Error types for the data access layer
//!
//! Driver failures are carried unchanged; this layer only adds conversion,
//! cancellation and misuse errors of its own.

/// Result type alias for data access operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for data access operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection misuse or a driver that refused to connect
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Query failure reported by a driver as plain text
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// A column value could not be coerced into the requested type
    #[error("Cannot convert column '{column}' from {actual} to {target}")]
    Conversion {
        column: String,
        target: &'static str,
        actual: &'static str,
    },

    /// A parameter value cannot be represented by the driver
    #[error("Unsupported parameter '{name}': {message}")]
    UnsupportedParameter { name: String, message: String },

    /// A result column has a driver type with no value mapping
    #[error("Unsupported column type {type_name} for column '{column}'")]
    UnsupportedColumnType { column: String, type_name: String },

    /// No sigil-prefixed token was found to name an inferred parameter
    #[error("No parameter name found in command text: {0}")]
    ParameterNameNotFound(String),

    /// The operation was aborted through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid connection string or configuration
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a conversion error for a column
    pub fn conversion(column: &str, target: &'static str, actual: &'static str) -> Self {
        DatabaseError::Conversion {
            column: column.to_string(),
            target,
            actual,
        }
    }

    /// Create an unsupported parameter error
    pub fn unsupported_parameter(name: &str, message: impl Into<String>) -> Self {
        DatabaseError::UnsupportedParameter {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Whether this error came from a cancellation token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DatabaseError::Cancelled)
    }
}
