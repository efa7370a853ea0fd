//! # Progress Tracker
//!
//! Applies learner progress in memory at once and persists it in the
//! background.
//!
//! Durable writes go through a single writer task fed by a FIFO queue, so
//! writes reach the store in the order they were issued. The store merges
//! each write into what it holds, so a record never moves backwards even
//! if an older snapshot lands late. [`ProgressTracker::flush`] waits until
//! everything queued so far is on disk.
//!
//! Progress can only be started for content that resolves locally.

use crate::orchestrator::FetchOrchestrator;
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_content::{PersistentStore, ProgressIndex, ProgressRecord, ProgressStatus};
use core_runtime::events::{CoreEvent, EventBus, ProgressEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

/// Result of a progress mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressAck {
    pub record: ProgressRecord,
    /// False when the mutation was a no-op and nothing was queued.
    pub changed: bool,
}

enum WriteCommand {
    Persist(ProgressRecord),
    Flush(oneshot::Sender<()>),
    Stop,
}

/// Cheap to clone; all clones share one in-memory view and one writer.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

struct Inner {
    records: Mutex<HashMap<String, ProgressRecord>>,
    writer: mpsc::UnboundedSender<WriteCommand>,
    store: PersistentStore,
    orchestrator: FetchOrchestrator,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ProgressTracker {
    /// Create the tracker and spawn its writer on the current Tokio runtime.
    pub fn start(orchestrator: FetchOrchestrator, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let store = orchestrator.store().clone();
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), events.clone(), rx));

        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                writer,
                store,
                orchestrator,
                clock,
                events,
            }),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, ProgressRecord>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Err(err) = self.inner.events.emit(CoreEvent::Progress(event)) {
            trace!(error = %err, "No subscribers for progress event");
        }
    }

    fn enqueue(&self, record: ProgressRecord) {
        let content_id = record.content_id.clone();
        if self.inner.writer.send(WriteCommand::Persist(record)).is_err() {
            error!(content_id = %content_id, "Progress writer has stopped; change kept in memory only");
            self.emit(ProgressEvent::PersistFailed {
                content_id,
                message: "progress writer stopped".to_string(),
            });
        }
    }

    /// Load every stored record into memory.
    pub async fn rehydrate(&self) -> Result<usize> {
        let stored = self.inner.store.progress().list_all().await?;
        let mut records = self.records();
        for record in stored {
            match records.get_mut(&record.content_id) {
                Some(current) => {
                    current.merge(&record);
                }
                None => {
                    records.insert(record.content_id.clone(), record);
                }
            }
        }
        info!(records = records.len(), "Progress rehydrated");
        Ok(records.len())
    }

    /// Make sure a record for `content_id` is in memory.
    async fn ensure_loaded(&self, content_id: &str) -> Result<()> {
        if self.records().contains_key(content_id) {
            return Ok(());
        }

        let stored = match self.inner.store.progress().get(content_id).await {
            Ok(stored) => stored,
            Err(err) if err.is_corrupt() => {
                warn!(content_id, error = %err, "Stored progress was corrupt; starting over");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let record = match stored {
            Some(record) => record,
            None => {
                if !self.inner.orchestrator.is_resolvable(content_id).await? {
                    return Err(SyncError::ContentNotResolvable {
                        content_id: content_id.to_string(),
                    });
                }
                ProgressRecord::new(content_id, self.inner.clock.now())
            }
        };

        self.records()
            .entry(content_id.to_string())
            .or_insert(record);
        Ok(())
    }

    /// Record `unit_id` as finished. The in-memory record is updated before
    /// this returns; the durable write happens in the background.
    #[instrument(skip(self))]
    pub async fn mutate_progress(&self, content_id: &str, unit_id: &str) -> Result<ProgressAck> {
        if content_id.trim().is_empty() || unit_id.trim().is_empty() {
            return Err(SyncError::InvalidProgress {
                content_id: content_id.to_string(),
                reason: "content and unit ids cannot be empty".to_string(),
            });
        }
        self.ensure_loaded(content_id).await?;

        let now = self.inner.clock.now();
        let (record, changed) = {
            let mut records = self.records();
            let Some(record) = records.get_mut(content_id) else {
                return Err(SyncError::ContentNotResolvable {
                    content_id: content_id.to_string(),
                });
            };
            let changed = record.record_unit(unit_id, now);
            (record.clone(), changed)
        };

        if changed {
            debug!(
                content_id,
                unit_id,
                units = record.completed_units.len(),
                status = %record.status,
                "Progress updated"
            );
            self.enqueue(record.clone());
            self.emit(ProgressEvent::Updated {
                content_id: content_id.to_string(),
                unit_id: unit_id.to_string(),
                completed_units: record.completed_units.len(),
                status: record.status.to_string(),
            });
        }

        Ok(ProgressAck { record, changed })
    }

    /// Mark the whole item as completed.
    #[instrument(skip(self))]
    pub async fn complete(&self, content_id: &str) -> Result<ProgressAck> {
        self.ensure_loaded(content_id).await?;

        let now = self.inner.clock.now();
        let (record, changed) = {
            let mut records = self.records();
            let Some(record) = records.get_mut(content_id) else {
                return Err(SyncError::ContentNotResolvable {
                    content_id: content_id.to_string(),
                });
            };
            let changed = record.mark_completed(now);
            (record.clone(), changed)
        };

        if changed {
            info!(content_id, "Content completed");
            self.enqueue(record.clone());
            self.emit(ProgressEvent::Completed {
                content_id: content_id.to_string(),
            });
        }

        Ok(ProgressAck { record, changed })
    }

    pub async fn get(&self, content_id: &str) -> Result<Option<ProgressRecord>> {
        if let Some(record) = self.records().get(content_id) {
            return Ok(Some(record.clone()));
        }
        match self.inner.store.progress().get(content_id).await {
            Ok(stored) => Ok(stored),
            Err(err) if err.is_corrupt() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Records with `status`, in content id order. Memory wins over the
    /// store for records with unsaved changes.
    pub async fn list_by_status(&self, status: ProgressStatus) -> Result<Vec<ProgressRecord>> {
        let stored = self
            .inner
            .store
            .progress()
            .query_by_index(&ProgressIndex::Status(status))
            .await?;

        let mut merged: BTreeMap<String, ProgressRecord> = stored
            .into_iter()
            .map(|record| (record.content_id.clone(), record))
            .collect();
        for record in self.records().values() {
            merged.insert(record.content_id.clone(), record.clone());
        }

        Ok(merged
            .into_values()
            .filter(|record| record.status == status)
            .collect())
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .writer
            .send(WriteCommand::Flush(tx))
            .map_err(|_| SyncError::Cancelled)?;
        rx.await.map_err(|_| SyncError::Cancelled)
    }

    /// Flush and stop the writer. Later mutations stay in memory only.
    pub async fn shutdown(&self) -> Result<()> {
        self.flush().await?;
        // The writer may already be gone; nothing left to do then.
        let _ = self.inner.writer.send(WriteCommand::Stop);
        Ok(())
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("records", &self.records().len())
            .finish_non_exhaustive()
    }
}

async fn run_writer(
    store: PersistentStore,
    events: EventBus,
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
) {
    let repo = store.progress();
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Persist(record) => match repo.put(&record).await {
                Ok(outcome) => {
                    trace!(content_id = %record.content_id, ?outcome, "Progress persisted");
                }
                Err(err) => {
                    error!(content_id = %record.content_id, error = %err, "Failed to persist progress");
                    let event = ProgressEvent::PersistFailed {
                        content_id: record.content_id.clone(),
                        message: err.to_string(),
                    };
                    if events.emit(CoreEvent::Progress(event)).is_err() {
                        trace!("No subscribers for progress event");
                    }
                }
            },
            WriteCommand::Flush(done) => {
                // The caller may have given up waiting.
                let _ = done.send(());
            }
            WriteCommand::Stop => break,
        }
    }
    debug!("Progress writer stopped");
}
