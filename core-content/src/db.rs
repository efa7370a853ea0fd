//! # Database Connection Pool Module
//!
//! Opens the SQLite pool behind the persistent store and applies the
//! embedded schema migrations.
//!
//! ## Features
//!
//! - **WAL Mode**: readers never block the single writer
//! - **Versioned Migrations**: additive `migrations/NNNN_*.sql` files embedded
//!   at compile time, applied before any repository is handed out
//! - **Downgrade Guard**: a database written by a newer build is refused
//!   instead of being silently reused
//!
//! ## Testing
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::adapters::classify_sqlx_error;
use crate::error::{Result, StorageError, StorageOp};
use bridge_traits::database::DatabaseConfig;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Schema migrations, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Highest schema version this build knows how to produce.
pub fn latest_schema_version() -> i64 {
    MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0)
}

fn open_error(err: sqlx::Error) -> StorageError {
    StorageError::from_bridge(
        classify_sqlx_error(err, "open"),
        "database",
        StorageOp::Open,
    )
}

/// Create a configured SQLite connection pool.
///
/// Migrations are not applied here; see [`run_migrations`].
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let mut connect_options =
        SqliteConnectOptions::from_str(&config.database_url).map_err(open_error)?;

    connect_options = connect_options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .pragma("cache_size", "-16000");

    if config.enable_cache {
        connect_options = connect_options.statement_cache_capacity(config.cache_capacity);
    }

    // An in-memory database lives exactly as long as its connection.
    let in_memory = config.database_url.contains(":memory:");
    let (max_lifetime, idle_timeout) = if in_memory {
        (None, None)
    } else {
        (
            Some(Duration::from_secs(1800)),
            Some(Duration::from_secs(600)),
        )
    };

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .max_lifetime(max_lifetime)
        .idle_timeout(idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            open_error(e)
        })?;

    debug!(connections = pool.size(), "Database connection pool created");
    Ok(pool)
}

/// Version recorded by the last successful migration, 0 for a fresh file.
pub async fn applied_schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let has_table: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await
    .and_then(|row| row.try_get("n"))
    .map_err(open_error)?;

    if has_table == 0 {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query("SELECT MAX(version) AS v FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .and_then(|row| row.try_get("v"))
            .map_err(open_error)?;

    Ok(version.unwrap_or(0))
}

/// Bring the schema up to [`latest_schema_version`].
///
/// Any failure here is fatal for the store: the caller must not hand out
/// repositories over a half-migrated database.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<i64> {
    let expected = latest_schema_version();
    let found = applied_schema_version(pool).await?;

    if found > expected {
        error!(found, expected, "Database schema is newer than this build");
        return Err(StorageError::SchemaMismatch {
            found,
            expected,
            reason: "database was written by a newer schema".to_string(),
        });
    }

    if found < expected {
        info!(from = found, to = expected, "Running database migrations");
    }

    MIGRATOR.run(pool).await.map_err(|e| {
        error!(error = %e, "Migration failed");
        StorageError::SchemaMismatch {
            found,
            expected,
            reason: e.to_string(),
        }
    })?;

    Ok(expected)
}

/// In-memory pool with migrations applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    let pool = create_pool(&DatabaseConfig::in_memory()).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_is_fully_migrated() {
        let pool = create_test_pool().await.unwrap();
        let version = applied_schema_version(&pool).await.unwrap();
        assert_eq!(version, latest_schema_version());
        assert!(version >= 3);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_test_pool().await.unwrap();
        let again = run_migrations(&pool).await.unwrap();
        assert_eq!(again, latest_schema_version());
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let pool = create_test_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
             VALUES (9999, 'from the future', 1, x'00', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = run_migrations(&pool).await.unwrap_err();
        match err {
            StorageError::SchemaMismatch { found, expected, .. } => {
                assert_eq!(found, 9999);
                assert_eq!(expected, latest_schema_version());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fresh_database_reports_zero() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        assert_eq!(applied_schema_version(&pool).await.unwrap(), 0);
    }
}
