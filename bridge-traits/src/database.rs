//! Database Abstraction Layer
//!
//! Row-level SQL contract used by the persistent content store. Each target
//! ships one implementation (native: sqlx/SQLite in `core-content`); the
//! repositories above it never see the driver.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::database::{DatabaseAdapter, QueryValue};
//!
//! let row = adapter
//!     .query_one_optional(
//!         "SELECT * FROM content_items WHERE id = ?",
//!         &[QueryValue::from("python-basics")],
//!     )
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{error::Result, platform::PlatformSendSync};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration for cross-platform initialization
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or connection string
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,

    /// Enable statement caching
    pub enable_cache: bool,

    /// Statement cache capacity
    pub cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.display());

        Self {
            database_url,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
            enable_cache: true,
            cache_capacity: 100,
        }
    }

    /// Create a configuration for an in-memory database
    ///
    /// Every SQLite connection to `:memory:` opens a separate database, so
    /// the pool is pinned to a single connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout_secs: 30,
            enable_cache: true,
            cache_capacity: 100,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// Query Result Types
// =============================================================================

/// Represents a single row from a database query as a map of column names to values
pub type QueryRow = std::collections::HashMap<String, QueryValue>;

/// Represents a database value that can be null, integer, real, text, or blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl QueryValue {
    /// Convert to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to f64 if possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QueryValue::Real(r) => Some(*r),
            QueryValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Convert to String if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert to String (owned) if possible
    pub fn as_string(&self) -> Option<String> {
        match self {
            QueryValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Convert to bytes if possible
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            QueryValue::Blob(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

// =============================================================================
// Database Adapter Trait
// =============================================================================

/// Database adapter trait for cross-platform database operations
///
/// ## Thread Safety
///
/// Implementations must be thread-safe on native targets (`Send + Sync`). On WASM,
/// the trait relaxes those bounds automatically.
///
/// ## Error Handling
///
/// Implementations map driver failures onto [`BridgeError`](crate::BridgeError):
/// a full medium becomes `StorageFull`, an integrity failure becomes
/// `StorageCorrupt`, everything else `DatabaseError`.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait DatabaseAdapter: PlatformSendSync {
    /// Check if the database connection is healthy
    async fn health_check(&self) -> Result<()>;

    /// Close all database connections
    async fn close(&self) -> Result<()>;

    /// Execute a raw SQL query and return rows
    ///
    /// Parameters are bound positionally; never concatenate user input into
    /// the query string.
    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>>;

    /// Execute a SQL statement that doesn't return rows (INSERT, UPDATE, DELETE)
    ///
    /// Returns the number of rows affected.
    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64>;

    /// Execute a query and return a single optional row
    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>>;

    /// Execute a query and return exactly one row
    ///
    /// Returns an error if no rows are returned.
    async fn query_one(&self, query: &str, params: &[QueryValue]) -> Result<QueryRow> {
        self.query_one_optional(query, params).await?.ok_or_else(|| {
            crate::BridgeError::DatabaseError("Query returned no rows".to_string())
        })
    }

    /// Execute multiple statements atomically
    ///
    /// Either every statement is applied or none is. Returns one row count
    /// per statement.
    async fn execute_batch(&self, statements: &[(&str, Vec<QueryValue>)]) -> Result<Vec<u64>>;

    /// Get the current schema version (0 for an empty database)
    async fn get_schema_version(&self) -> Result<i64>;
}
