//! # Fetch & Sync Module
//!
//! Keeps local content and the remote source in step.
//!
//! ## Overview
//!
//! This module decides, per read, whether memory, the persistent store or
//! the remote source answers it, and tracks learner progress against the
//! content that resolved.
//!
//! ## Components
//!
//! - **Fetch Orchestrator** (`orchestrator`): local-first reads, write-through, offline outcome
//! - **Fetch Request** (`request`): per-request state machine with validated transitions
//! - **Retry** (`retry`): per-attempt deadline and bounded exponential backoff
//! - **Connectivity Monitor** (`network`): debounced online/offline state
//! - **Progress Tracker** (`progress`): immediate in-memory progress, ordered durable writes

pub mod error;
pub mod network;
pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod retry;

pub use error::{Result, SyncError};
pub use network::{Connectivity, ConnectivityMonitor, NetworkState};
pub use orchestrator::{
    content_key, CachedValue, FetchOrchestrator, Fetched, OrchestratorConfig, INDEX_KEY,
};
pub use progress::{ProgressAck, ProgressTracker};
pub use request::{FetchRequest, RequestId, RequestState};
pub use retry::{backoff_delay, fetch_with_retry, RetryFailure};
