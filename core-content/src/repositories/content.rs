//! Content item repository
//!
//! Rows are validated on every read. A row that fails to decode or whose
//! checksum no longer matches its payload is moved to the quarantine table
//! and reported as [`StorageError::Corrupt`].

use super::{
    get_i64, get_string, get_timestamp, millis, quarantine_params, QUARANTINE_INSERT,
};
use crate::error::{Result, StorageError, StorageOp};
use crate::locks::KeyedLocks;
use crate::models::{ContentItem, PutOutcome};
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const ENTITY_KIND: &str = "content";

const SELECT_COLUMNS: &str =
    "SELECT rowid, id, category, version, payload, checksum, fetched_at, last_accessed_at FROM content_items";

const UPSERT: &str = r#"
    INSERT INTO content_items (id, category, version, payload, checksum, fetched_at, last_accessed_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        category = excluded.category,
        version = excluded.version,
        payload = excluded.payload,
        checksum = excluded.checksum,
        fetched_at = excluded.fetched_at,
        last_accessed_at = MAX(content_items.last_accessed_at, excluded.last_accessed_at)
"#;

/// Secondary indexes over cached content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentIndex {
    Category(String),
    /// Items fetched strictly before the given instant.
    FetchedBefore(DateTime<Utc>),
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ContentRepository: bridge_traits::platform::PlatformSendSync {
    /// Insert or replace an item. Writing an identical item is a no-op.
    async fn put(&self, item: &ContentItem) -> Result<PutOutcome>;

    async fn get(&self, id: &str) -> Result<Option<ContentItem>>;

    /// Items matching a secondary index. Corrupt rows are quarantined and
    /// left out of the result.
    async fn query_by_index(&self, index: &ContentIndex) -> Result<Vec<ContentItem>>;

    /// Returns true if a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn delete_category(&self, category: &str) -> Result<u64>;

    /// Record a read without touching the content itself.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteContentRepository {
    db: Arc<dyn DatabaseAdapter>,
    locks: KeyedLocks,
}

impl SqliteContentRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            db,
            locks: KeyedLocks::new(),
        }
    }

    fn row_to_item(row: &QueryRow) -> std::result::Result<ContentItem, String> {
        let payload_text = get_string(row, "payload")?;
        let payload: serde_json::Value = serde_json::from_str(&payload_text)
            .map_err(|e| format!("payload is not valid JSON: {}", e))?;

        let item = ContentItem {
            id: get_string(row, "id")?,
            category: get_string(row, "category")?,
            version: get_i64(row, "version")?,
            payload,
            checksum: get_string(row, "checksum")?,
            fetched_at: get_timestamp(row, "fetched_at")?,
            last_accessed_at: get_timestamp(row, "last_accessed_at")?,
        };
        item.validate()?;
        Ok(item)
    }

    fn upsert_params(item: &ContentItem) -> Vec<QueryValue> {
        vec![
            QueryValue::from(item.id.as_str()),
            QueryValue::from(item.category.as_str()),
            QueryValue::Integer(item.version),
            QueryValue::Text(item.payload.to_string()),
            QueryValue::from(item.checksum.as_str()),
            millis(item.fetched_at),
            millis(item.last_accessed_at),
        ]
    }

    async fn fetch_row(&self, id: &str, op: StorageOp) -> Result<Option<QueryRow>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        self.db
            .query_one_optional(&sql, &[QueryValue::from(id)])
            .await
            .map_err(|e| StorageError::from_bridge(e, id, op))
    }

    /// Move a row that failed validation out of the live table.
    ///
    /// The row is re-read under the entity lock so a concurrent good write
    /// is never discarded.
    async fn quarantine(&self, id: &str, op: StorageOp) -> Result<Option<String>> {
        let _guard = self.locks.lock(id).await;
        let Some(row) = self.fetch_row(id, op).await? else {
            return Ok(None);
        };
        let reason = match Self::row_to_item(&row) {
            Ok(_) => return Ok(None),
            Err(reason) => reason,
        };

        warn!(entity_id = %id, reason = %reason, "Quarantining corrupt content row");
        self.db
            .execute_batch(&[
                (
                    QUARANTINE_INSERT,
                    quarantine_params(ENTITY_KIND, id, &row, &reason),
                ),
                (
                    "DELETE FROM content_items WHERE id = ?",
                    vec![QueryValue::from(id)],
                ),
            ])
            .await
            .map_err(|e| StorageError::from_bridge(e, id, StorageOp::Quarantine))?;
        Ok(Some(reason))
    }

    /// Quarantine a row whose id cannot be read. Nothing can write to such
    /// a row by id, so no entity lock is needed.
    async fn quarantine_by_rowid(&self, row: &QueryRow, reason: &str) -> Result<()> {
        let rowid = get_i64(row, "rowid").map_err(|message| {
            StorageError::corrupt("content_items", StorageOp::Quarantine, message)
        })?;
        let entity_id = format!("rowid:{}", rowid);
        warn!(entity_id = %entity_id, reason = %reason, "Quarantining content row with unreadable id");
        self.db
            .execute_batch(&[
                (
                    QUARANTINE_INSERT,
                    quarantine_params(ENTITY_KIND, &entity_id, row, reason),
                ),
                (
                    "DELETE FROM content_items WHERE rowid = ?",
                    vec![QueryValue::Integer(rowid)],
                ),
            ])
            .await
            .map_err(|e| StorageError::from_bridge(e, entity_id.as_str(), StorageOp::Quarantine))?;
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ContentRepository for SqliteContentRepository {
    #[instrument(skip(self, item), fields(id = %item.id, version = item.version))]
    async fn put(&self, item: &ContentItem) -> Result<PutOutcome> {
        item.validate()
            .map_err(|message| StorageError::invalid("content", message))?;

        let _guard = self.locks.lock(&item.id).await;
        let existing = self.fetch_row(&item.id, StorageOp::Put).await?;

        let mut statements = Vec::with_capacity(2);
        let outcome = match existing {
            None => PutOutcome::Inserted,
            Some(row) => match Self::row_to_item(&row) {
                Ok(current) if current.same_content(item) && current.fetched_at == item.fetched_at => {
                    debug!("Content unchanged, skipping write");
                    return Ok(PutOutcome::Unchanged);
                }
                Ok(_) => PutOutcome::Updated,
                Err(reason) => {
                    warn!(reason = %reason, "Replacing corrupt content row");
                    statements.push((
                        QUARANTINE_INSERT,
                        quarantine_params(ENTITY_KIND, &item.id, &row, &reason),
                    ));
                    PutOutcome::Inserted
                }
            },
        };
        statements.push((UPSERT, Self::upsert_params(item)));

        self.db
            .execute_batch(&statements)
            .await
            .map_err(|e| StorageError::from_bridge(e, item.id.as_str(), StorageOp::Put))?;

        debug!(?outcome, "Content stored");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<ContentItem>> {
        let Some(row) = self.fetch_row(id, StorageOp::Get).await? else {
            return Ok(None);
        };

        match Self::row_to_item(&row) {
            Ok(item) => Ok(Some(item)),
            Err(_) => match self.quarantine(id, StorageOp::Get).await? {
                Some(reason) => Err(StorageError::corrupt(id, StorageOp::Get, reason)),
                // Replaced by a valid write in the meantime.
                None => match self.fetch_row(id, StorageOp::Get).await? {
                    Some(row) => Self::row_to_item(&row)
                        .map(Some)
                        .map_err(|reason| StorageError::corrupt(id, StorageOp::Get, reason)),
                    None => Ok(None),
                },
            },
        }
    }

    #[instrument(skip(self))]
    async fn query_by_index(&self, index: &ContentIndex) -> Result<Vec<ContentItem>> {
        let (sql, params, label) = match index {
            ContentIndex::Category(category) => (
                format!("{} WHERE category = ? ORDER BY id", SELECT_COLUMNS),
                vec![QueryValue::from(category.as_str())],
                category.clone(),
            ),
            ContentIndex::FetchedBefore(at) => (
                format!("{} WHERE fetched_at < ? ORDER BY fetched_at, id", SELECT_COLUMNS),
                vec![millis(*at)],
                at.to_rfc3339(),
            ),
        };

        let rows = self
            .db
            .query(&sql, &params)
            .await
            .map_err(|e| StorageError::from_bridge(e, label, StorageOp::Query))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_item(row) {
                Ok(item) => items.push(item),
                Err(reason) => match get_string(row, "id") {
                    Ok(id) => {
                        self.quarantine(&id, StorageOp::Query).await?;
                    }
                    Err(_) => self.quarantine_by_rowid(row, &reason).await?,
                },
            }
        }
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        let removed = self
            .db
            .execute("DELETE FROM content_items WHERE id = ?", &[QueryValue::from(id)])
            .await
            .map_err(|e| StorageError::from_bridge(e, id, StorageOp::Delete))?;
        Ok(removed > 0)
    }

    /// Deletes item by item under each item's lock, so a concurrent `put`
    /// for the same id lands either wholly before or wholly after.
    #[instrument(skip(self))]
    async fn delete_category(&self, category: &str) -> Result<u64> {
        let rows = self
            .db
            .query(
                "SELECT id FROM content_items WHERE category = ? ORDER BY id",
                &[QueryValue::from(category)],
            )
            .await
            .map_err(|e| StorageError::from_bridge(e, category, StorageOp::Delete))?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| get_string(row, "id").ok())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        // Sorted acquisition keeps overlapping deletes from deadlocking.
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.locks.lock(id).await);
        }

        let statements: Vec<(&str, Vec<QueryValue>)> = ids
            .iter()
            .map(|id| {
                (
                    "DELETE FROM content_items WHERE id = ? AND category = ?",
                    vec![QueryValue::from(id.as_str()), QueryValue::from(category)],
                )
            })
            .collect();
        let removed = self
            .db
            .execute_batch(&statements)
            .await
            .map_err(|e| StorageError::from_bridge(e, category, StorageOp::Delete))?;
        Ok(removed.iter().sum())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.db
            .execute(
                "UPDATE content_items SET last_accessed_at = MAX(last_accessed_at, ?) WHERE id = ?",
                &[millis(at), QueryValue::from(id)],
            )
            .await
            .map_err(|e| StorageError::from_bridge(e, id, StorageOp::Touch))?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = self
            .db
            .query_one("SELECT COUNT(*) AS n FROM content_items", &[])
            .await
            .map_err(|e| StorageError::from_bridge(e, "content_items", StorageOp::Query))?;
        Ok(get_i64(&row, "n").unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteAdapter;
    use crate::db::create_test_pool;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    async fn setup() -> (Arc<dyn DatabaseAdapter>, SqliteContentRepository) {
        let pool = create_test_pool().await.unwrap();
        let db: Arc<dyn DatabaseAdapter> = Arc::new(SqliteAdapter::from_pool(pool));
        let repo = SqliteContentRepository::new(Arc::clone(&db));
        (db, repo)
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn item(id: &str, category: &str, version: i64) -> ContentItem {
        ContentItem::new(id, category, version, json!({"title": id, "units": ["u1", "u2"]}), t0())
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_db, repo) = setup().await;
        let stored = item("rust-intro", "rust", 1);

        assert_eq!(repo.put(&stored).await.unwrap(), PutOutcome::Inserted);
        let loaded = repo.get("rust-intro").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identical_put_is_unchanged() {
        let (_db, repo) = setup().await;
        let stored = item("rust-intro", "rust", 1);
        repo.put(&stored).await.unwrap();

        let mut again = stored.clone();
        again.last_accessed_at = t0() + Duration::minutes(5);
        assert_eq!(repo.put(&again).await.unwrap(), PutOutcome::Unchanged);

        let newer = item("rust-intro", "rust", 2);
        assert_eq!(repo.put(&newer).await.unwrap(), PutOutcome::Updated);
        assert_eq!(repo.get("rust-intro").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_item() {
        let (_db, repo) = setup().await;
        let mut bad = item("", "rust", 1);
        bad.id = "  ".into();
        assert!(matches!(
            repo.put(&bad).await,
            Err(StorageError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_by_category() {
        let (_db, repo) = setup().await;
        repo.put(&item("go-basics", "go", 1)).await.unwrap();
        repo.put(&item("rust-intro", "rust", 1)).await.unwrap();
        repo.put(&item("rust-traits", "rust", 3)).await.unwrap();

        let rust = repo
            .query_by_index(&ContentIndex::Category("rust".into()))
            .await
            .unwrap();
        let ids: Vec<_> = rust.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["rust-intro", "rust-traits"]);

        assert_eq!(repo.delete_category("rust").await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_fetched_before() {
        let (_db, repo) = setup().await;
        let old = item("old", "rust", 1);
        let mut fresh = item("fresh", "rust", 1);
        fresh.fetched_at = t0() + Duration::days(2);
        fresh.last_accessed_at = fresh.fetched_at;
        repo.put(&old).await.unwrap();
        repo.put(&fresh).await.unwrap();

        let stale = repo
            .query_by_index(&ContentIndex::FetchedBefore(t0() + Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "old");
    }

    #[tokio::test]
    async fn test_corrupt_row_is_quarantined() {
        let (db, repo) = setup().await;
        repo.put(&item("rust-intro", "rust", 1)).await.unwrap();
        db.execute(
            "UPDATE content_items SET payload = ? WHERE id = ?",
            &[QueryValue::from("{\"tampered\":true}"), QueryValue::from("rust-intro")],
        )
        .await
        .unwrap();

        let err = repo.get("rust-intro").await.unwrap_err();
        assert!(err.is_corrupt());

        // Row moved out of the live table.
        assert!(repo.get("rust-intro").await.unwrap().is_none());
        let quarantined = db
            .query("SELECT entity_id, entity_kind FROM quarantine", &[])
            .await
            .unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(
            quarantined[0].get("entity_kind").and_then(QueryValue::as_str),
            Some("content")
        );
    }

    #[tokio::test]
    async fn test_query_skips_corrupt_rows() {
        let (db, repo) = setup().await;
        repo.put(&item("a", "rust", 1)).await.unwrap();
        repo.put(&item("b", "rust", 1)).await.unwrap();
        db.execute(
            "UPDATE content_items SET payload = 'not json' WHERE id = 'b'",
            &[],
        )
        .await
        .unwrap();

        let found = repo
            .query_by_index(&ContentIndex::Category("rust".into()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_row_with_unreadable_id_is_quarantined_by_rowid() {
        let (db, repo) = setup().await;
        repo.put(&item("a", "rust", 1)).await.unwrap();
        let good = item("a", "rust", 1);
        db.execute(
            "INSERT INTO content_items (id, category, version, payload, checksum, fetched_at, last_accessed_at)
             VALUES (X'00FF', 'rust', 1, ?, ?, 0, 0)",
            &[
                QueryValue::Text(good.payload.to_string()),
                QueryValue::from(good.checksum.as_str()),
            ],
        )
        .await
        .unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        let found = repo
            .query_by_index(&ContentIndex::Category("rust".into()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);

        let quarantined = db
            .query("SELECT entity_id FROM quarantine", &[])
            .await
            .unwrap();
        assert_eq!(quarantined.len(), 1);
        assert!(quarantined[0]
            .get("entity_id")
            .and_then(QueryValue::as_str)
            .is_some_and(|id| id.starts_with("rowid:")));
    }

    #[tokio::test]
    async fn test_delete_category_waits_for_item_lock() {
        let (_db, repo) = setup().await;
        let repo = Arc::new(repo);
        repo.put(&item("rust-intro", "rust", 1)).await.unwrap();
        repo.put(&item("rust-traits", "rust", 1)).await.unwrap();

        let guard = repo.locks.lock("rust-intro").await;
        let deleting = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.delete_category("rust").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!deleting.is_finished());
        assert_eq!(repo.count().await.unwrap(), 2);

        drop(guard);
        assert_eq!(deleting.await.unwrap().unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_touch() {
        let (_db, repo) = setup().await;
        repo.put(&item("a", "rust", 1)).await.unwrap();

        let later = t0() + Duration::hours(3);
        repo.touch("a", later).await.unwrap();
        // Older touch never rewinds the access time.
        repo.touch("a", t0()).await.unwrap();
        assert_eq!(repo.get("a").await.unwrap().unwrap().last_accessed_at, later);

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_id() {
        let (_db, repo) = setup().await;
        let repo = Arc::new(repo);

        let handles: Vec<_> = (1..=8)
            .map(|version| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.put(&item("shared", "rust", version)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = repo.get("shared").await.unwrap().unwrap();
        assert!(stored.verify_checksum());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
