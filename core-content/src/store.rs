//! Opened, migrated database with its repositories.

use crate::adapters::SqliteAdapter;
use crate::db;
use crate::error::{Result, StorageError, StorageOp};
use crate::repositories::{
    ContentRepository, IndexRepository, ProgressRepository, QuarantineRepository,
    SqliteContentRepository, SqliteIndexRepository, SqliteProgressRepository,
    SqliteQuarantineRepository,
};
use bridge_traits::database::{DatabaseAdapter, DatabaseConfig};
use std::sync::Arc;
use tracing::info;

/// Entry point to durable storage.
///
/// Construction runs every pending migration first; if that fails no
/// repository is ever handed out.
#[derive(Clone)]
pub struct PersistentStore {
    adapter: Arc<dyn DatabaseAdapter>,
    content: Arc<dyn ContentRepository>,
    progress: Arc<dyn ProgressRepository>,
    index: Arc<dyn IndexRepository>,
    quarantine: Arc<dyn QuarantineRepository>,
    schema_version: i64,
}

impl PersistentStore {
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        let schema_version = match db::run_migrations(&pool).await {
            Ok(version) => version,
            Err(err) => {
                pool.close().await;
                return Err(err);
            }
        };

        let adapter: Arc<dyn DatabaseAdapter> = Arc::new(SqliteAdapter::from_pool(pool));
        adapter
            .health_check()
            .await
            .map_err(|e| StorageError::from_bridge(e, "database", StorageOp::Open))?;

        info!(schema_version, url = %config.database_url, "Persistent store ready");
        Ok(Self::with_adapter(adapter, schema_version))
    }

    pub async fn in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory()).await
    }

    /// Wrap an adapter whose schema is already current.
    pub fn with_adapter(adapter: Arc<dyn DatabaseAdapter>, schema_version: i64) -> Self {
        Self {
            content: Arc::new(SqliteContentRepository::new(Arc::clone(&adapter))),
            progress: Arc::new(SqliteProgressRepository::new(Arc::clone(&adapter))),
            index: Arc::new(SqliteIndexRepository::new(Arc::clone(&adapter))),
            quarantine: Arc::new(SqliteQuarantineRepository::new(Arc::clone(&adapter))),
            adapter,
            schema_version,
        }
    }

    pub fn content(&self) -> Arc<dyn ContentRepository> {
        Arc::clone(&self.content)
    }

    pub fn progress(&self) -> Arc<dyn ProgressRepository> {
        Arc::clone(&self.progress)
    }

    pub fn index(&self) -> Arc<dyn IndexRepository> {
        Arc::clone(&self.index)
    }

    pub fn quarantine(&self) -> Arc<dyn QuarantineRepository> {
        Arc::clone(&self.quarantine)
    }

    pub fn adapter(&self) -> Arc<dyn DatabaseAdapter> {
        Arc::clone(&self.adapter)
    }

    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    pub async fn close(&self) -> Result<()> {
        self.adapter
            .close()
            .await
            .map_err(|e| StorageError::from_bridge(e, "database", StorageOp::Open))
    }
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}
