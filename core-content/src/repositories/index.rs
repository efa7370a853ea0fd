//! Persisted copy of the remote content index.

use super::{get_i64, get_string, get_timestamp, millis};
use crate::error::{Result, StorageError, StorageOp};
use crate::models::IndexEntry;
use bridge_traits::database::{DatabaseAdapter, QueryValue};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{instrument, warn};

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait IndexRepository: bridge_traits::platform::PlatformSendSync {
    /// Atomically swap the stored index for `entries`, keeping their order.
    async fn replace_all(&self, entries: &[IndexEntry], refreshed_at: DateTime<Utc>) -> Result<()>;

    async fn list(&self) -> Result<Vec<IndexEntry>>;

    /// When the stored index was last replaced, if ever.
    async fn refreshed_at(&self) -> Result<Option<DateTime<Utc>>>;
}

pub struct SqliteIndexRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteIndexRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl IndexRepository for SqliteIndexRepository {
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn replace_all(&self, entries: &[IndexEntry], refreshed_at: DateTime<Utc>) -> Result<()> {
        const INSERT: &str = "INSERT OR REPLACE INTO content_index (key, category, version, title, position, refreshed_at)
             VALUES (?, ?, ?, ?, ?, ?)";

        let mut statements = Vec::with_capacity(entries.len() + 1);
        statements.push(("DELETE FROM content_index", Vec::new()));
        for (position, entry) in entries.iter().enumerate() {
            statements.push((
                INSERT,
                vec![
                    QueryValue::from(entry.key.as_str()),
                    QueryValue::from(entry.category.as_str()),
                    QueryValue::Integer(entry.version),
                    QueryValue::from(entry.title.as_str()),
                    QueryValue::Integer(position as i64),
                    millis(refreshed_at),
                ],
            ));
        }

        self.db
            .execute_batch(&statements)
            .await
            .map_err(|e| StorageError::from_bridge(e, "index", StorageOp::Put))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<IndexEntry>> {
        let rows = self
            .db
            .query(
                "SELECT key, category, version, title FROM content_index ORDER BY position",
                &[],
            )
            .await
            .map_err(|e| StorageError::from_bridge(e, "index", StorageOp::Query))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = (|| {
                Ok::<_, String>(IndexEntry {
                    key: get_string(row, "key")?,
                    category: get_string(row, "category")?,
                    version: get_i64(row, "version")?,
                    title: get_string(row, "title")?,
                })
            })();
            match decoded {
                Ok(entry) => entries.push(entry),
                // The index is rebuilt wholesale on the next refresh.
                Err(reason) => warn!(reason = %reason, "Skipping unreadable index row"),
            }
        }
        Ok(entries)
    }

    async fn refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = self
            .db
            .query_one_optional("SELECT MAX(refreshed_at) AS at FROM content_index", &[])
            .await
            .map_err(|e| StorageError::from_bridge(e, "index", StorageOp::Query))?;
        Ok(row.and_then(|row| get_timestamp(&row, "at").ok()))
    }
}
