//! # Global State Container
//!
//! One process-wide [`AppState`] behind a `watch` channel.
//!
//! Mutations take effect synchronously: observers see the new value as soon
//! as the call returns. Persistent fields are then written to the
//! [`SettingsStore`] by a single background persister that applies writes in
//! the order they were made, so the last write to a key is the one that
//! survives a restart.
//!
//! Persisted layout:
//!
//! | Key | Value |
//! |-----|-------|
//! | `state.current_selection` | content id |
//! | `settings.<name>` | normalized setting value |

use crate::error::{Result, StateError};
use crate::settings::Settings;
use bridge_traits::storage::SettingsStore;
use core_runtime::events::{CoreEvent, EventBus, SettingsEvent};
use core_sync::{Connectivity, ConnectivityMonitor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub const SELECTION_KEY: &str = "state.current_selection";
pub const SETTINGS_PREFIX: &str = "settings.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub current_selection: Option<String>,
    /// Mirrors the connectivity monitor; never persisted.
    pub network_status: Connectivity,
    pub settings: Settings,
    /// Session-only UI flags.
    pub flags: BTreeMap<String, bool>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            current_selection: None,
            network_status: Connectivity::Online,
            settings: Settings::default(),
            flags: BTreeMap::new(),
        }
    }
}

impl AppState {
    /// Persistent fields as store entries. Defaults are written too, so a
    /// restored state never depends on this version's defaults.
    pub fn serialize(&self) -> BTreeMap<String, String> {
        let mut entries: BTreeMap<String, String> = self
            .settings
            .entries()
            .into_iter()
            .map(|(key, value)| (format!("{}{}", SETTINGS_PREFIX, key), value))
            .collect();
        if let Some(id) = &self.current_selection {
            entries.insert(SELECTION_KEY.to_string(), id.clone());
        }
        entries
    }

    /// Rebuild persistent fields from store entries.
    ///
    /// Entries that fail validation are skipped with a warning; unrelated
    /// keys are ignored.
    pub fn deserialize(entries: &BTreeMap<String, String>) -> Self {
        let mut state = AppState {
            current_selection: entries
                .get(SELECTION_KEY)
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            ..AppState::default()
        };
        for (key, value) in entries {
            let Some(name) = key.strip_prefix(SETTINGS_PREFIX) else {
                continue;
            };
            if let Err(err) = state.settings.apply(name, value) {
                warn!(key = %key, error = %err, "Ignoring invalid persisted setting");
            }
        }
        state
    }
}

enum PersistCommand {
    Set { key: String, value: String },
    Delete { key: String },
    Flush(oneshot::Sender<()>),
    Stop,
}

struct Inner {
    tx: watch::Sender<AppState>,
    persister: mpsc::UnboundedSender<PersistCommand>,
    events: EventBus,
}

#[derive(Clone)]
pub struct StateContainer {
    inner: Arc<Inner>,
}

impl StateContainer {
    /// Load persisted fields, then start the persister.
    ///
    /// Values that no longer validate are skipped with a warning and the
    /// default is kept.
    pub async fn rehydrate(store: Arc<dyn SettingsStore>, events: EventBus) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if let Some(id) = store.get_string(SELECTION_KEY).await? {
            entries.insert(SELECTION_KEY.to_string(), id);
        }
        for key in store.list_keys_with_prefix(SETTINGS_PREFIX).await? {
            if let Some(value) = store.get_string(&key).await? {
                entries.insert(key, value);
            }
        }
        let state = AppState::deserialize(&entries);

        info!(
            selection = ?state.current_selection,
            theme = %state.settings.theme,
            "State rehydrated"
        );

        let (persister, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_persister(store, events.clone(), rx));
        let (tx, _rx) = watch::channel(state);

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                persister,
                events,
            }),
        })
    }

    fn emit(&self, event: SettingsEvent) {
        if let Err(err) = self.inner.events.emit(CoreEvent::Settings(event)) {
            trace!(error = %err, "No subscribers for settings event");
        }
    }

    fn persist(&self, command: PersistCommand) {
        if self.inner.persister.send(command).is_err() {
            error!("State persister has stopped; change kept in memory only");
            self.emit(SettingsEvent::PersistFailed {
                message: "state persister stopped".to_string(),
            });
        }
    }

    /// Queue the serialized form of one persistent field; absent means delete.
    fn persist_field(&self, storage_key: &str) {
        let value = self.inner.tx.borrow().serialize().remove(storage_key);
        let command = match value {
            Some(value) => PersistCommand::Set {
                key: storage_key.to_string(),
                value,
            },
            None => PersistCommand::Delete {
                key: storage_key.to_string(),
            },
        };
        self.persist(command);
    }

    pub fn snapshot(&self) -> AppState {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.inner.tx.subscribe()
    }

    pub fn settings(&self) -> Settings {
        self.inner.tx.borrow().settings.clone()
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut outcome = Ok(None);
        self.inner.tx.send_if_modified(|state| {
            let mut settings = state.settings.clone();
            match settings.apply(key, value) {
                Ok(change) if change.changed => {
                    state.settings = settings;
                    outcome = Ok(Some(change.value));
                    true
                }
                Ok(_) => false,
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });

        let Some(value) = outcome? else {
            trace!(key, "Setting unchanged");
            return Ok(());
        };

        self.persist_field(&format!("{}{}", SETTINGS_PREFIX, key));
        debug!(key, "Setting changed");
        self.emit(SettingsEvent::Changed {
            key: key.to_string(),
            value: value.unwrap_or_default(),
        });
        Ok(())
    }

    pub fn select(&self, content_id: &str) -> Result<()> {
        let content_id = content_id.trim();
        if content_id.is_empty() {
            return Err(StateError::InvalidSelection(
                "content id cannot be empty".to_string(),
            ));
        }
        self.update_selection(Some(content_id.to_string()));
        Ok(())
    }

    pub fn clear_selection(&self) {
        self.update_selection(None);
    }

    fn update_selection(&self, selection: Option<String>) {
        let changed = self.inner.tx.send_if_modified(|state| {
            if state.current_selection == selection {
                return false;
            }
            state.current_selection = selection.clone();
            true
        });
        if !changed {
            return;
        }

        self.persist_field(SELECTION_KEY);
        self.emit(SettingsEvent::SelectionChanged {
            content_id: selection,
        });
    }

    pub fn set_network_status(&self, status: Connectivity) {
        self.inner.tx.send_if_modified(|state| {
            if state.network_status == status {
                return false;
            }
            state.network_status = status;
            true
        });
    }

    pub fn set_flag(&self, name: &str, value: bool) {
        self.inner.tx.send_if_modified(|state| {
            state.flags.insert(name.to_string(), value) != Some(value)
        });
    }

    pub fn flag(&self, name: &str) -> bool {
        self.inner.tx.borrow().flags.get(name).copied().unwrap_or(false)
    }

    /// Keep `network_status` in step with `monitor` until `cancel` fires.
    pub fn spawn_network_mirror(
        &self,
        monitor: &ConnectivityMonitor,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = monitor.watch();
        let this = self.clone();
        this.set_network_status(rx.borrow_and_update().connectivity);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let status = rx.borrow_and_update().connectivity;
                this.set_network_status(status);
            }
        })
    }

    /// Wait until every write queued so far has reached the store.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .persister
            .send(PersistCommand::Flush(tx))
            .map_err(|_| StateError::PersisterStopped)?;
        rx.await.map_err(|_| StateError::PersisterStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.flush().await?;
        let _ = self.inner.persister.send(PersistCommand::Stop);
        Ok(())
    }
}

impl std::fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateContainer")
            .field("state", &*self.inner.tx.borrow())
            .finish_non_exhaustive()
    }
}

async fn run_persister(
    store: Arc<dyn SettingsStore>,
    events: EventBus,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = rx.recv().await {
        let (key, result) = match command {
            PersistCommand::Set { key, value } => {
                let result = store.set_string(&key, &value).await;
                (key, result)
            }
            PersistCommand::Delete { key } => {
                let result = store.delete(&key).await;
                (key, result)
            }
            PersistCommand::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            PersistCommand::Stop => break,
        };

        match result {
            Ok(()) => trace!(key = %key, "State persisted"),
            Err(err) => {
                error!(key = %key, error = %err, "Failed to persist state");
                let event = SettingsEvent::PersistFailed {
                    message: format!("{}: {}", key, err),
                };
                if events.emit(CoreEvent::Settings(event)).is_err() {
                    trace!("No subscribers for settings event");
                }
            }
        }
    }
    debug!("State persister stopped");
}
