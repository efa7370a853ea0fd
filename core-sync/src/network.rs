//! # Connectivity Monitor
//!
//! Turns raw host observations into the single online/offline state the
//! rest of the engine reads.
//!
//! A change only counts once it has held for the debounce window, so a link
//! that flaps inside the window produces no transition at all.
//! `Indeterminate` observations are ignored and keep the previous state.

use crate::{Result, SyncError};
use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    fn from_status(status: NetworkStatus) -> Option<Self> {
        match status {
            NetworkStatus::Connected => Some(Connectivity::Online),
            NetworkStatus::Disconnected => Some(Connectivity::Offline),
            NetworkStatus::Indeterminate => None,
        }
    }
}

/// Committed connectivity and when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connectivity: Connectivity,
    pub since: DateTime<Utc>,
}

impl NetworkState {
    pub fn is_online(&self) -> bool {
        self.connectivity == Connectivity::Online
    }
}

struct Inner {
    tx: watch::Sender<NetworkState>,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    fn commit(&self, connectivity: Connectivity) {
        let at = self.clock.now();
        let changed = self.tx.send_if_modified(|state| {
            if state.connectivity == connectivity {
                return false;
            }
            *state = NetworkState {
                connectivity,
                since: at,
            };
            true
        });
        if !changed {
            return;
        }

        info!(?connectivity, "Connectivity changed");
        let event = match connectivity {
            Connectivity::Online => NetworkEvent::Online {
                at_ms: at.timestamp_millis(),
            },
            Connectivity::Offline => NetworkEvent::Offline {
                at_ms: at.timestamp_millis(),
            },
        };
        if self.events.emit(CoreEvent::Network(event)).is_err() {
            debug!("No subscribers for network event");
        }
    }
}

/// Debounced view over a [`NetworkMonitor`].
///
/// Cheap to clone; the background watcher stops when the last clone is
/// dropped or [`ConnectivityMonitor::shutdown`] is called.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    /// Read the current status and start watching for changes.
    ///
    /// An undecided or failing first probe starts out online: a remote call
    /// that then fails still falls back to local data.
    pub async fn start(
        monitor: Arc<dyn NetworkMonitor>,
        debounce: Duration,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        let initial = match monitor.get_network_info().await {
            Ok(info) => Connectivity::from_status(info.status).unwrap_or(Connectivity::Online),
            Err(err) => {
                warn!(error = %err, "Initial network probe failed, assuming online");
                Connectivity::Online
            }
        };
        let stream = monitor
            .subscribe_changes()
            .await
            .map_err(|e| SyncError::Monitor(e.to_string()))?;

        let this = Self::new(initial, clock, events);
        let cancel = this.inner.cancel.clone();
        tokio::spawn(watch_changes(
            Arc::downgrade(&this.inner),
            stream,
            debounce,
            cancel,
        ));
        info!(?initial, debounce_ms = debounce.as_millis() as u64, "Connectivity monitor started");
        Ok(this)
    }

    /// A monitor pinned to `connectivity` until [`ConnectivityMonitor::set`]
    /// is called. Useful for hosts that push state themselves.
    pub fn new(connectivity: Connectivity, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let (tx, _rx) = watch::channel(NetworkState {
            connectivity,
            since: clock.now(),
        });
        Self {
            inner: Arc::new(Inner {
                tx,
                cancel: CancellationToken::new(),
                clock,
                events,
            }),
        }
    }

    /// Commit a state immediately, bypassing the debounce window.
    pub fn set(&self, connectivity: Connectivity) {
        self.inner.commit(connectivity);
    }

    pub fn current(&self) -> NetworkState {
        *self.inner.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    pub fn watch(&self) -> watch::Receiver<NetworkState> {
        self.inner.tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.current())
            .finish_non_exhaustive()
    }
}

async fn watch_changes(
    inner: Weak<Inner>,
    mut stream: Box<dyn NetworkChangeStream>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut pending: Option<(Connectivity, Instant)> = None;

    loop {
        let next: Option<NetworkInfo> = match pending {
            Some((candidate, deadline)) => tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    pending = None;
                    match inner.upgrade() {
                        Some(inner) => inner.commit(candidate),
                        None => break,
                    }
                    continue;
                }
                info = stream.next() => info,
            },
            None => tokio::select! {
                _ = cancel.cancelled() => break,
                info = stream.next() => info,
            },
        };

        let Some(info) = next else {
            debug!("Network change stream closed");
            break;
        };
        let Some(observed) = Connectivity::from_status(info.status) else {
            debug!("Ignoring indeterminate network observation");
            continue;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let committed = inner.tx.borrow().connectivity;
        if observed == committed {
            if pending.take().is_some() {
                debug!(?observed, "Connectivity flap settled back, no transition");
            }
        } else if debounce.is_zero() {
            inner.commit(observed);
        } else if pending.map(|(candidate, _)| candidate) != Some(observed) {
            pending = Some((observed, Instant::now() + debounce));
        }
    }
}
