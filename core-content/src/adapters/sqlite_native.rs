//! Native SQLite Database Adapter
//!
//! Implements the `DatabaseAdapter` trait over a `sqlx` SQLite pool. Driver
//! failures are classified so a full disk or a damaged file surfaces as a
//! distinct error instead of a generic database failure.

use async_trait::async_trait;
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use bridge_traits::error::{BridgeError, Result};
use sqlx::{Column, Pool, Row, Sqlite};
use std::collections::HashMap;
use tracing::{debug, info, warn};

// Primary SQLite result codes.
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_FULL: i32 = 13;
const SQLITE_NOTADB: i32 = 26;

/// Map a driver error onto the bridge taxonomy.
pub(crate) fn classify_sqlx_error(err: sqlx::Error, context: &str) -> BridgeError {
    if let sqlx::Error::Database(db) = &err {
        // sqlx reports the extended code; the low byte is the primary code.
        let primary = db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff);
        match primary {
            Some(SQLITE_FULL) => {
                return BridgeError::StorageFull(format!("{} failed: {}", context, db.message()))
            }
            Some(SQLITE_CORRUPT) | Some(SQLITE_NOTADB) => {
                return BridgeError::StorageCorrupt(format!(
                    "{} failed: {}",
                    context,
                    db.message()
                ))
            }
            _ => {}
        }
    }
    BridgeError::DatabaseError(format!("{} failed: {}", context, err))
}

/// Native SQLite implementation of DatabaseAdapter
///
/// Wraps a `sqlx::Pool<Sqlite>` that has already been opened and migrated by
/// [`crate::db`].
pub struct SqliteAdapter {
    pool: Pool<Sqlite>,
}

impl SqliteAdapter {
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Convert a sqlx Row to a QueryRow (HashMap)
    fn row_to_query_row(row: &sqlx::sqlite::SqliteRow) -> QueryRow {
        let mut result = HashMap::new();

        for column in row.columns() {
            let column_name = column.name().to_string();

            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(column.ordinal()) {
                v.map(QueryValue::Integer).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(column.ordinal()) {
                v.map(QueryValue::Real).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<String>, _>(column.ordinal()) {
                v.map(QueryValue::Text).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(column.ordinal()) {
                v.map(QueryValue::Blob).unwrap_or(QueryValue::Null)
            } else {
                QueryValue::Null
            };

            result.insert(column_name, value);
        }

        result
    }

    /// Convert QueryValue parameters to sqlx-compatible format
    fn bind_params<'q>(
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        params: &'q [QueryValue],
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let mut query = query;
        for param in params {
            query = match param {
                QueryValue::Null => query.bind(None::<i64>),
                QueryValue::Integer(i) => query.bind(i),
                QueryValue::Real(r) => query.bind(r),
                QueryValue::Text(s) => query.bind(s.as_str()),
                QueryValue::Blob(b) => query.bind(b.as_slice()),
            };
        }
        query
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Database health check failed");
                classify_sqlx_error(e, "Health check")
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing database connection pool");
        self.pool.close().await;
        Ok(())
    }

    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query");

        let rows = Self::bind_params(sqlx::query(query), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify_sqlx_error(e, "Query"))?;

        Ok(rows.iter().map(Self::row_to_query_row).collect())
    }

    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64> {
        debug!(statement = %statement, param_count = params.len(), "Executing statement");

        let result = Self::bind_params(sqlx::query(statement), params)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_sqlx_error(e, "Execute"))?;

        Ok(result.rows_affected())
    }

    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>> {
        let row = Self::bind_params(sqlx::query(query), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify_sqlx_error(e, "Query one optional"))?;

        Ok(row.as_ref().map(Self::row_to_query_row))
    }

    async fn execute_batch(&self, statements: &[(&str, Vec<QueryValue>)]) -> Result<Vec<u64>> {
        debug!(batch_size = statements.len(), "Executing batch");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify_sqlx_error(e, "Begin transaction"))?;

        let mut results = Vec::with_capacity(statements.len());
        for (statement, params) in statements {
            let done = Self::bind_params(sqlx::query(statement), params)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify_sqlx_error(e, "Batch statement"))?;
            results.push(done.rows_affected());
        }

        // Dropping `tx` on an early return rolls the batch back.
        tx.commit()
            .await
            .map_err(|e| classify_sqlx_error(e, "Commit"))?;

        Ok(results)
    }

    async fn get_schema_version(&self) -> Result<i64> {
        let exists = self
            .query_one(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
                &[],
            )
            .await?
            .get("n")
            .and_then(QueryValue::as_i64)
            .unwrap_or(0);
        if exists == 0 {
            return Ok(0);
        }

        let row = self
            .query_one(
                "SELECT COALESCE(MAX(version), 0) AS version FROM _sqlx_migrations WHERE success = 1",
                &[],
            )
            .await?;

        row.get("version")
            .and_then(QueryValue::as_i64)
            .ok_or_else(|| BridgeError::DatabaseError("Failed to read schema version".to_string()))
    }

}
