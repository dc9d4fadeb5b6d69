//! Database type definitions
//!
//! Identifies which built-in driver a configuration selects.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Built-in drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// SQLite database file
    #[default]
    Sqlite,
    /// PostgreSQL server
    Postgres,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
        }
    }

    /// Check whether the driver for this type was compiled in
    pub fn is_enabled(&self) -> bool {
        match self {
            DatabaseType::Sqlite => cfg!(feature = "sqlite"),
            DatabaseType::Postgres => cfg!(feature = "postgres"),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}
