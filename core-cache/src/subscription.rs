//! Per-key observation of cache state.

use futures::Stream;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotStatus {
    /// No value yet; a load is running or about to run.
    Loading,
    Ready,
    /// A value past its freshness window; a refresh may be running.
    Stale,
    /// The last load failed. `value` holds the previous value, if any.
    Error,
}

/// What a subscriber sees for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<V, E> {
    pub status: SnapshotStatus,
    pub value: Option<V>,
    pub error: Option<E>,
}

impl<V, E> Snapshot<V, E> {
    pub fn loading() -> Self {
        Self {
            status: SnapshotStatus::Loading,
            value: None,
            error: None,
        }
    }

    pub fn ready(value: V) -> Self {
        Self {
            status: SnapshotStatus::Ready,
            value: Some(value),
            error: None,
        }
    }

    pub fn stale(value: V) -> Self {
        Self {
            status: SnapshotStatus::Stale,
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(error: E, previous: Option<V>) -> Self {
        Self {
            status: SnapshotStatus::Error,
            value: previous,
            error: Some(error),
        }
    }
}

/// Receiver side of a key subscription.
///
/// The first call to [`next`](Self::next) yields the current snapshot;
/// later calls wait for a change. Identical consecutive snapshots are never
/// delivered twice.
pub struct Subscription<V, E> {
    key: String,
    rx: watch::Receiver<Snapshot<V, E>>,
    primed: bool,
}

impl<V, E> Subscription<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(key: String, rx: watch::Receiver<Snapshot<V, E>>) -> Self {
        Self {
            key,
            rx,
            primed: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn current(&self) -> Snapshot<V, E> {
        self.rx.borrow().clone()
    }

    /// Returns `None` once the cache is gone.
    pub async fn next(&mut self) -> Option<Snapshot<V, E>> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn into_stream(self) -> impl Stream<Item = Snapshot<V, E>> {
        futures::stream::unfold(self, |mut sub| async move {
            let snapshot = sub.next().await?;
            Some((snapshot, sub))
        })
    }
}
