//! # Content Store
//!
//! Durable storage for cached tutorial content, learner progress and the
//! last known remote index.
//!
//! ## Overview
//!
//! This crate owns:
//! - SQLite schema and versioned migrations, applied before first use
//! - Repositories for content, progress, the index and quarantined rows
//! - Per-entity write serialization so concurrent writers to one id are
//!   applied in arrival order
//! - Integrity checks on read; rows that fail them are quarantined

pub mod adapters;
pub mod db;
pub mod error;
pub mod locks;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::{Result, StorageError, StorageErrorKind, StorageOp};
pub use models::{
    ContentItem, IndexEntry, InvalidTransition, ProgressRecord, ProgressStatus, PutOutcome,
};
pub use repositories::{
    ContentIndex, ContentRepository, IndexRepository, ProgressIndex, ProgressRepository,
    QuarantineRepository, QuarantinedRecord,
};
pub use store::PersistentStore;
