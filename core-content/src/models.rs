//! Domain models for cached tutorial content and learner progress
//!
//! Models carry their own validation and invariants; the repositories only
//! translate them to and from rows.

use bridge_traits::content::{ContentMetadata, ContentPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Content
// =============================================================================

/// A cached content item.
///
/// `checksum` is the SHA-256 of the serialized payload and is verified every
/// time the row is read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: String,
    pub version: i64,
    pub payload: serde_json::Value,
    pub checksum: String,
    pub fetched_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        version: i64,
        payload: serde_json::Value,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let checksum = Self::compute_checksum(&payload);
        Self {
            id: id.into(),
            category: category.into(),
            version,
            payload,
            checksum,
            fetched_at,
            last_accessed_at: fetched_at,
        }
    }

    pub fn from_payload(payload: ContentPayload, fetched_at: DateTime<Utc>) -> Self {
        Self::new(
            payload.key,
            payload.category,
            payload.version,
            payload.body,
            fetched_at,
        )
    }

    /// Hex SHA-256 of the payload's canonical JSON form.
    pub fn compute_checksum(payload: &serde_json::Value) -> String {
        let digest = Sha256::digest(payload.to_string().as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.payload) == self.checksum
    }

    /// True when both items describe the same stored bytes, ignoring the
    /// bookkeeping timestamps.
    pub fn same_content(&self, other: &ContentItem) -> bool {
        self.id == other.id
            && self.category == other.category
            && self.version == other.version
            && self.checksum == other.checksum
    }

    /// Size estimate used for cache accounting.
    pub fn approx_size(&self) -> usize {
        self.id.len() + self.category.len() + self.payload.to_string().len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Content id cannot be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("Content category cannot be empty".to_string());
        }
        if self.version < 0 {
            return Err(format!("Content version must be non-negative, got {}", self.version));
        }
        if !self.verify_checksum() {
            return Err("Checksum does not match payload".to_string());
        }
        Ok(())
    }
}

/// Catalogue entry persisted from the remote index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub category: String,
    pub version: i64,
    pub title: String,
}

impl From<ContentMetadata> for IndexEntry {
    fn from(meta: ContentMetadata) -> Self {
        Self {
            key: meta.key,
            category: meta.category,
            version: meta.version,
            title: meta.title,
        }
    }
}

impl From<IndexEntry> for ContentMetadata {
    fn from(entry: IndexEntry) -> Self {
        Self {
            key: entry.key,
            category: entry.category,
            version: entry.version,
            title: entry.title,
        }
    }
}

/// Result of a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Updated,
    /// The stored row already matched; nothing was written.
    Unchanged,
}

impl PutOutcome {
    pub fn is_mutation(self) -> bool {
        !matches!(self, PutOutcome::Unchanged)
    }
}

// =============================================================================
// Progress
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid progress transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ProgressStatus,
    pub to: ProgressStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }

    /// Status only moves forward. Staying put is always allowed.
    pub fn can_transition_to(self, next: ProgressStatus) -> bool {
        next >= self
    }

    pub fn transition(self, next: ProgressStatus) -> Result<ProgressStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ProgressStatus::Completed
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ProgressStatus::NotStarted),
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            other => Err(format!("Unknown progress status: {}", other)),
        }
    }
}

/// Learner progress through one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub content_id: String,
    pub completed_units: BTreeSet<String>,
    pub current_unit_id: Option<String>,
    pub status: ProgressStatus,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(content_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content_id: content_id.into(),
            completed_units: BTreeSet::new(),
            current_unit_id: None,
            status: ProgressStatus::NotStarted,
            updated_at: now,
        }
    }

    /// Record a finished unit. Returns false when nothing changed.
    ///
    /// The first unit moves the record to `InProgress`; a completed record
    /// keeps its status.
    pub fn record_unit(&mut self, unit_id: &str, now: DateTime<Utc>) -> bool {
        let inserted = self.completed_units.insert(unit_id.to_string());
        let moved = self.current_unit_id.as_deref() != Some(unit_id);
        if !inserted && !moved {
            return false;
        }

        self.current_unit_id = Some(unit_id.to_string());
        if self.status == ProgressStatus::NotStarted {
            self.status = ProgressStatus::InProgress;
        }
        self.bump(now);
        true
    }

    /// Returns false if the record was already completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ProgressStatus::Completed;
        self.bump(now);
        true
    }

    /// Fold another observation of the same record into this one: units are
    /// unioned, status takes the furthest point, timestamps never go back.
    pub fn merge(&mut self, other: &ProgressRecord) -> bool {
        let before = self.clone();
        self.completed_units
            .extend(other.completed_units.iter().cloned());
        if other.updated_at > self.updated_at {
            if other.current_unit_id.is_some() {
                self.current_unit_id = other.current_unit_id.clone();
            }
            self.updated_at = other.updated_at;
        }
        self.status = self.status.max(other.status);
        if self.status == ProgressStatus::NotStarted && !self.completed_units.is_empty() {
            self.status = ProgressStatus::InProgress;
        }
        *self != before
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.content_id.trim().is_empty() {
            return Err("Progress content id cannot be empty".to_string());
        }
        if self.status == ProgressStatus::NotStarted && !self.completed_units.is_empty() {
            return Err("A record with completed units cannot be not_started".to_string());
        }
        if let Some(current) = &self.current_unit_id {
            if !self.completed_units.contains(current) {
                return Err(format!("Current unit '{}' is not among completed units", current));
            }
        }
        Ok(())
    }

    fn bump(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn checksum_tracks_payload() {
        let mut item = ContentItem::new("rust-intro", "rust", 3, json!({"units": ["a", "b"]}), at(0));
        assert!(item.validate().is_ok());

        item.payload = json!({"units": ["a"]});
        assert!(!item.verify_checksum());
        assert!(item.validate().is_err());
    }

    #[test]
    fn same_content_ignores_timestamps() {
        let a = ContentItem::new("k", "go", 1, json!({"x": 1}), at(0));
        let mut b = a.clone();
        b.fetched_at = at(100);
        b.last_accessed_at = at(200);
        assert!(a.same_content(&b));

        let c = ContentItem::new("k", "go", 2, json!({"x": 1}), at(0));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn status_never_moves_backwards() {
        use ProgressStatus::*;
        assert!(NotStarted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert_eq!(
            InProgress.transition(NotStarted),
            Err(InvalidTransition {
                from: InProgress,
                to: NotStarted
            })
        );
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ProgressStatus::NotStarted,
            ProgressStatus::InProgress,
            ProgressStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ProgressStatus>(), Ok(status));
        }
        assert!("paused".parse::<ProgressStatus>().is_err());
    }

    #[test]
    fn first_unit_starts_progress() {
        let mut record = ProgressRecord::new("rust-intro", at(0));
        assert!(record.record_unit("u1", at(5)));
        assert_eq!(record.status, ProgressStatus::InProgress);
        assert_eq!(record.current_unit_id.as_deref(), Some("u1"));
        assert_eq!(record.updated_at, at(5));

        // Same unit again is a no-op.
        assert!(!record.record_unit("u1", at(6)));
        assert_eq!(record.updated_at, at(5));
    }

    #[test]
    fn updated_at_is_monotonic() {
        let mut record = ProgressRecord::new("rust-intro", at(10));
        record.record_unit("u1", at(3));
        assert_eq!(record.updated_at, at(10));

        record.record_unit("u2", at(12));
        assert_eq!(record.updated_at, at(12));
    }

    #[test]
    fn completed_record_stays_completed() {
        let mut record = ProgressRecord::new("rust-intro", at(0));
        record.record_unit("u1", at(1));
        assert!(record.mark_completed(at(2)));
        assert!(!record.mark_completed(at(3)));

        assert!(record.record_unit("u2", at(4)));
        assert_eq!(record.status, ProgressStatus::Completed);
        assert!(record.completed_units.contains("u2"));
    }

    #[test]
    fn merge_unions_units_and_keeps_furthest_status() {
        let mut local = ProgressRecord::new("c", at(0));
        local.record_unit("u1", at(1));

        let mut other = ProgressRecord::new("c", at(0));
        other.record_unit("u2", at(5));
        other.mark_completed(at(6));

        assert!(local.merge(&other));
        assert_eq!(local.status, ProgressStatus::Completed);
        assert_eq!(local.completed_units.len(), 2);
        assert_eq!(local.updated_at, at(6));
        assert_eq!(local.current_unit_id.as_deref(), Some("u2"));

        let snapshot = local.clone();
        let older = ProgressRecord::new("c", at(0) - Duration::seconds(30));
        assert!(!local.merge(&older));
        assert_eq!(local, snapshot);
    }

    #[test]
    fn validate_rejects_inconsistent_records() {
        let mut record = ProgressRecord::new("c", at(0));
        record.completed_units.insert("u1".into());
        assert!(record.validate().is_err());

        record.status = ProgressStatus::InProgress;
        record.current_unit_id = Some("u9".into());
        assert!(record.validate().is_err());

        record.current_unit_id = Some("u1".into());
        assert!(record.validate().is_ok());
    }
}
