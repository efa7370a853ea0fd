//! Learner progress repository
//!
//! Writes merge with whatever is already stored, so a late or duplicated
//! write can never move a record backwards.

use super::{
    get_optional_string, get_string, get_timestamp, millis, quarantine_params, QUARANTINE_INSERT,
};
use crate::error::{Result, StorageError, StorageOp};
use crate::locks::KeyedLocks;
use crate::models::{ProgressRecord, ProgressStatus, PutOutcome};
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const ENTITY_KIND: &str = "progress";

const SELECT_COLUMNS: &str =
    "SELECT content_id, completed_units, current_unit_id, status, updated_at FROM progress_records";

const UPSERT: &str = r#"
    INSERT INTO progress_records (content_id, completed_units, current_unit_id, status, updated_at)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT(content_id) DO UPDATE SET
        completed_units = excluded.completed_units,
        current_unit_id = excluded.current_unit_id,
        status = excluded.status,
        updated_at = excluded.updated_at
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressIndex {
    Status(ProgressStatus),
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ProgressRepository: bridge_traits::platform::PlatformSendSync {
    /// Merge `record` into the stored row and persist the result.
    async fn put(&self, record: &ProgressRecord) -> Result<PutOutcome>;

    async fn get(&self, content_id: &str) -> Result<Option<ProgressRecord>>;

    async fn query_by_index(&self, index: &ProgressIndex) -> Result<Vec<ProgressRecord>>;

    async fn list_all(&self) -> Result<Vec<ProgressRecord>>;

    async fn delete(&self, content_id: &str) -> Result<bool>;
}

pub struct SqliteProgressRepository {
    db: Arc<dyn DatabaseAdapter>,
    locks: KeyedLocks,
}

impl SqliteProgressRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            db,
            locks: KeyedLocks::new(),
        }
    }

    fn row_to_record(row: &QueryRow) -> std::result::Result<ProgressRecord, String> {
        let units_text = get_string(row, "completed_units")?;
        let completed_units: BTreeSet<String> = serde_json::from_str(&units_text)
            .map_err(|e| format!("completed_units is not a JSON string array: {}", e))?;
        let status = get_string(row, "status")?.parse::<ProgressStatus>()?;

        let record = ProgressRecord {
            content_id: get_string(row, "content_id")?,
            completed_units,
            current_unit_id: get_optional_string(row, "current_unit_id")?,
            status,
            updated_at: get_timestamp(row, "updated_at")?,
        };
        record.validate()?;
        Ok(record)
    }

    fn upsert_params(record: &ProgressRecord) -> Result<Vec<QueryValue>> {
        let units = serde_json::to_string(&record.completed_units)
            .map_err(|e| StorageError::invalid("completed_units", e.to_string()))?;
        Ok(vec![
            QueryValue::from(record.content_id.as_str()),
            QueryValue::Text(units),
            QueryValue::from(record.current_unit_id.clone()),
            QueryValue::from(record.status.as_str()),
            millis(record.updated_at),
        ])
    }

    async fn fetch_row(&self, content_id: &str, op: StorageOp) -> Result<Option<QueryRow>> {
        let sql = format!("{} WHERE content_id = ?", SELECT_COLUMNS);
        self.db
            .query_one_optional(&sql, &[QueryValue::from(content_id)])
            .await
            .map_err(|e| StorageError::from_bridge(e, content_id, op))
    }

    async fn decode_rows(&self, rows: &[QueryRow]) -> Result<Vec<ProgressRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::row_to_record(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    let id = get_string(row, "content_id").unwrap_or_default();
                    let _guard = self.locks.lock(&id).await;
                    self.move_to_quarantine(&id, row, &reason).await?;
                }
            }
        }
        Ok(records)
    }

    /// Caller holds the entity lock.
    async fn move_to_quarantine(&self, content_id: &str, row: &QueryRow, reason: &str) -> Result<()> {
        warn!(entity_id = %content_id, reason = %reason, "Quarantining corrupt progress row");
        self.db
            .execute_batch(&[
                (
                    QUARANTINE_INSERT,
                    quarantine_params(ENTITY_KIND, content_id, row, reason),
                ),
                (
                    "DELETE FROM progress_records WHERE content_id = ?",
                    vec![QueryValue::from(content_id)],
                ),
            ])
            .await
            .map_err(|e| StorageError::from_bridge(e, content_id, StorageOp::Quarantine))?;
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ProgressRepository for SqliteProgressRepository {
    #[instrument(skip(self, record), fields(content_id = %record.content_id, status = %record.status))]
    async fn put(&self, record: &ProgressRecord) -> Result<PutOutcome> {
        record
            .validate()
            .map_err(|message| StorageError::invalid("progress", message))?;

        let _guard = self.locks.lock(&record.content_id).await;
        let existing = self.fetch_row(&record.content_id, StorageOp::Put).await?;

        let (merged, outcome) = match existing {
            None => (record.clone(), PutOutcome::Inserted),
            Some(row) => match Self::row_to_record(&row) {
                Ok(mut stored) => {
                    if !stored.merge(record) {
                        debug!("Progress unchanged, skipping write");
                        return Ok(PutOutcome::Unchanged);
                    }
                    (stored, PutOutcome::Updated)
                }
                Err(reason) => {
                    self.move_to_quarantine(&record.content_id, &row, &reason)
                        .await?;
                    (record.clone(), PutOutcome::Inserted)
                }
            },
        };

        let params = Self::upsert_params(&merged)?;
        self.db
            .execute(UPSERT, &params)
            .await
            .map_err(|e| StorageError::from_bridge(e, record.content_id.as_str(), StorageOp::Put))?;

        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get(&self, content_id: &str) -> Result<Option<ProgressRecord>> {
        let Some(row) = self.fetch_row(content_id, StorageOp::Get).await? else {
            return Ok(None);
        };
        match Self::row_to_record(&row) {
            Ok(record) => Ok(Some(record)),
            Err(_) => {
                let _guard = self.locks.lock(content_id).await;
                // Re-check under the lock; a writer may have replaced the row.
                let Some(row) = self.fetch_row(content_id, StorageOp::Get).await? else {
                    return Ok(None);
                };
                match Self::row_to_record(&row) {
                    Ok(record) => Ok(Some(record)),
                    Err(reason) => {
                        self.move_to_quarantine(content_id, &row, &reason).await?;
                        Err(StorageError::corrupt(content_id, StorageOp::Get, reason))
                    }
                }
            }
        }
    }

    async fn query_by_index(&self, index: &ProgressIndex) -> Result<Vec<ProgressRecord>> {
        let ProgressIndex::Status(status) = index;
        let sql = format!("{} WHERE status = ? ORDER BY updated_at DESC, content_id", SELECT_COLUMNS);
        let rows = self
            .db
            .query(&sql, &[QueryValue::from(status.as_str())])
            .await
            .map_err(|e| StorageError::from_bridge(e, status.as_str(), StorageOp::Query))?;
        self.decode_rows(&rows).await
    }

    async fn list_all(&self) -> Result<Vec<ProgressRecord>> {
        let sql = format!("{} ORDER BY content_id", SELECT_COLUMNS);
        let rows = self
            .db
            .query(&sql, &[])
            .await
            .map_err(|e| StorageError::from_bridge(e, "progress_records", StorageOp::Query))?;
        self.decode_rows(&rows).await
    }

    async fn delete(&self, content_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(content_id).await;
        let removed = self
            .db
            .execute(
                "DELETE FROM progress_records WHERE content_id = ?",
                &[QueryValue::from(content_id)],
            )
            .await
            .map_err(|e| StorageError::from_bridge(e, content_id, StorageOp::Delete))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteAdapter;
    use crate::db::create_test_pool;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    async fn setup() -> (Arc<dyn DatabaseAdapter>, SqliteProgressRepository) {
        let pool = create_test_pool().await.unwrap();
        let db: Arc<dyn DatabaseAdapter> = Arc::new(SqliteAdapter::from_pool(pool));
        (Arc::clone(&db), SqliteProgressRepository::new(db))
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_db, repo) = setup().await;
        let mut record = ProgressRecord::new("rust-intro", at(0));
        record.record_unit("u1", at(1));

        assert_eq!(repo.put(&record).await.unwrap(), PutOutcome::Inserted);
        assert_eq!(repo.get("rust-intro").await.unwrap(), Some(record.clone()));
        assert_eq!(repo.put(&record).await.unwrap(), PutOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_stale_write_cannot_regress() {
        let (_db, repo) = setup().await;
        let mut done = ProgressRecord::new("c", at(0));
        done.record_unit("u1", at(1));
        done.record_unit("u2", at(2));
        done.mark_completed(at(3));
        repo.put(&done).await.unwrap();

        let mut late = ProgressRecord::new("c", at(0));
        late.record_unit("u1", at(1));
        repo.put(&late).await.unwrap();

        let stored = repo.get("c").await.unwrap().unwrap();
        assert_eq!(stored.status, ProgressStatus::Completed);
        assert_eq!(stored.completed_units.len(), 2);
        assert_eq!(stored.updated_at, at(3));
    }

    #[tokio::test]
    async fn test_query_by_status() {
        let (_db, repo) = setup().await;
        let mut a = ProgressRecord::new("a", at(0));
        a.record_unit("u1", at(1));
        let mut b = ProgressRecord::new("b", at(0));
        b.record_unit("u1", at(1));
        b.mark_completed(at(2));
        repo.put(&a).await.unwrap();
        repo.put(&b).await.unwrap();

        let completed = repo
            .query_by_index(&ProgressIndex::Status(ProgressStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].content_id, "b");
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_progress_is_quarantined() {
        let (db, repo) = setup().await;
        let mut record = ProgressRecord::new("c", at(0));
        record.record_unit("u1", at(1));
        repo.put(&record).await.unwrap();
        db.execute(
            "UPDATE progress_records SET status = 'paused' WHERE content_id = 'c'",
            &[],
        )
        .await
        .unwrap();

        assert!(repo.get("c").await.unwrap_err().is_corrupt());
        assert!(repo.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_db, repo) = setup().await;
        repo.put(&ProgressRecord::new("c", at(0))).await.unwrap();
        assert!(repo.delete("c").await.unwrap());
        assert!(repo.get("c").await.unwrap().is_none());
    }
}
