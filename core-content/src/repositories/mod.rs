//! # Repository Pattern Implementation
//!
//! Each persisted entity has a repository trait and a SQLite implementation
//! over [`DatabaseAdapter`]. Every method maps adapter failures onto
//! [`StorageError`](crate::error::StorageError) with the entity id and
//! operation attached.
//!
//! ## Available Repositories
//!
//! - `ContentRepository` - Cached content items, indexed by category
//! - `ProgressRepository` - Learner progress, indexed by status
//! - `IndexRepository` - Last known remote catalogue
//! - `QuarantineRepository` - Rows that failed validation on read

pub mod content;
pub mod index;
pub mod progress;
pub mod quarantine;

pub use content::{ContentIndex, ContentRepository, SqliteContentRepository};
pub use index::{IndexRepository, SqliteIndexRepository};
pub use progress::{ProgressIndex, ProgressRepository, SqliteProgressRepository};
pub use quarantine::{QuarantineRepository, QuarantinedRecord, SqliteQuarantineRepository};

use bridge_traits::database::{QueryRow, QueryValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub(crate) const QUARANTINE_INSERT: &str = "INSERT INTO quarantine (entity_kind, entity_id, raw, reason, quarantined_at)
     VALUES (?, ?, ?, ?, ?)";

// Column helpers return a description of the problem instead of a typed
// error; the caller decides whether that means quarantine.

pub(crate) fn get_string(row: &QueryRow, column: &str) -> Result<String, String> {
    row.get(column)
        .and_then(QueryValue::as_string)
        .ok_or_else(|| format!("column '{}' is missing or not text", column))
}

pub(crate) fn get_optional_string(row: &QueryRow, column: &str) -> Result<Option<String>, String> {
    match row.get(column) {
        None | Some(QueryValue::Null) => Ok(None),
        Some(QueryValue::Text(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("column '{}' is not text", column)),
    }
}

pub(crate) fn get_i64(row: &QueryRow, column: &str) -> Result<i64, String> {
    row.get(column)
        .and_then(QueryValue::as_i64)
        .ok_or_else(|| format!("column '{}' is missing or not an integer", column))
}

pub(crate) fn get_timestamp(row: &QueryRow, column: &str) -> Result<DateTime<Utc>, String> {
    let millis = get_i64(row, column)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| format!("column '{}' holds an out-of-range timestamp", column))
}

pub(crate) fn millis(at: DateTime<Utc>) -> QueryValue {
    QueryValue::Integer(at.timestamp_millis())
}

/// Render a row as JSON so a quarantined record can be inspected later.
pub(crate) fn row_to_raw(row: &QueryRow) -> String {
    let ordered: BTreeMap<&str, serde_json::Value> = row
        .iter()
        .map(|(column, value)| {
            let json = match value {
                QueryValue::Null => serde_json::Value::Null,
                QueryValue::Integer(i) => serde_json::Value::from(*i),
                QueryValue::Real(r) => serde_json::Value::from(*r),
                QueryValue::Text(s) => serde_json::Value::from(s.as_str()),
                QueryValue::Blob(b) => serde_json::Value::from(format!("<{} bytes>", b.len())),
            };
            (column.as_str(), json)
        })
        .collect();
    serde_json::to_string(&ordered).unwrap_or_default()
}

pub(crate) fn quarantine_params(kind: &str, entity_id: &str, row: &QueryRow, reason: &str) -> Vec<QueryValue> {
    vec![
        QueryValue::from(kind),
        QueryValue::from(entity_id),
        QueryValue::Text(row_to_raw(row)),
        QueryValue::from(reason),
        millis(Utc::now()),
    ]
}
