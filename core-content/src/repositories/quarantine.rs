//! Inspection and cleanup of quarantined rows.

use super::{get_i64, get_string, get_timestamp};
use crate::error::{Result, StorageError, StorageOp};
use bridge_traits::database::DatabaseAdapter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A row pulled out of a live table because it failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedRecord {
    pub id: i64,
    pub entity_kind: String,
    pub entity_id: String,
    /// The offending row rendered as JSON.
    pub raw: String,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait QuarantineRepository: bridge_traits::platform::PlatformSendSync {
    async fn list(&self) -> Result<Vec<QuarantinedRecord>>;

    /// Drop every quarantined row. Returns how many were removed.
    async fn purge(&self) -> Result<u64>;
}

pub struct SqliteQuarantineRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteQuarantineRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl QuarantineRepository for SqliteQuarantineRepository {
    async fn list(&self) -> Result<Vec<QuarantinedRecord>> {
        let rows = self
            .db
            .query(
                "SELECT id, entity_kind, entity_id, raw, reason, quarantined_at FROM quarantine ORDER BY id",
                &[],
            )
            .await
            .map_err(|e| StorageError::from_bridge(e, "quarantine", StorageOp::Query))?;

        rows.iter()
            .map(|row| {
                let decode = || -> std::result::Result<QuarantinedRecord, String> {
                    Ok(QuarantinedRecord {
                        id: get_i64(row, "id")?,
                        entity_kind: get_string(row, "entity_kind")?,
                        entity_id: get_string(row, "entity_id")?,
                        raw: get_string(row, "raw")?,
                        reason: get_string(row, "reason")?,
                        quarantined_at: get_timestamp(row, "quarantined_at")?,
                    })
                };
                decode().map_err(|detail| StorageError::corrupt("quarantine", StorageOp::Query, detail))
            })
            .collect()
    }

    async fn purge(&self) -> Result<u64> {
        self.db
            .execute("DELETE FROM quarantine", &[])
            .await
            .map_err(|e| StorageError::from_bridge(e, "quarantine", StorageOp::Delete))
    }
}
