//! The [`CoreService`] façade.

use crate::error::{CoreError, Result};
use bridge_traits::database::DatabaseConfig;
use core_cache::Subscription;
use core_content::{ContentItem, IndexEntry, PersistentStore, ProgressRecord, ProgressStatus};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream};
use core_state::{AppState, Settings, StateContainer};
use core_sync::{
    CachedValue, Connectivity, ConnectivityMonitor, FetchOrchestrator, Fetched, OrchestratorConfig,
    ProgressAck, ProgressTracker, SyncError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct ServiceInner {
    store: PersistentStore,
    orchestrator: FetchOrchestrator,
    network: ConnectivityMonitor,
    progress: ProgressTracker,
    state: StateContainer,
    events: EventBus,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Primary façade exposed to host applications.
///
/// Cheap to clone. Every clone drives the same engine; call
/// [`CoreService::shutdown`] once when the host exits.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Bring the engine up.
    ///
    /// Order matters: the store is migrated and persisted state is loaded
    /// before anything can read from them, then the connectivity monitor and
    /// the reconnect sweep start.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn start(config: CoreConfig) -> Result<Self> {
        let events = EventBus::new(config.event_buffer);

        let store = PersistentStore::open(&DatabaseConfig::new(&config.database_path)).await?;
        let state =
            StateContainer::rehydrate(Arc::clone(&config.settings_store), events.clone()).await?;

        let network = ConnectivityMonitor::start(
            Arc::clone(&config.network_monitor),
            config.network_debounce,
            Arc::clone(&config.clock),
            events.clone(),
        )
        .await?;

        let orchestrator = FetchOrchestrator::new(
            store.clone(),
            Arc::clone(&config.content_source),
            network.clone(),
            Arc::clone(&config.clock),
            events.clone(),
            OrchestratorConfig::from_core(&config),
        )?;

        let progress = ProgressTracker::start(
            orchestrator.clone(),
            Arc::clone(&config.clock),
            events.clone(),
        );
        let restored = progress.rehydrate().await?;

        let cancel = CancellationToken::new();
        let tasks = vec![
            state.spawn_network_mirror(&network, cancel.child_token()),
            orchestrator.spawn_reconnect_watcher(cancel.child_token()),
        ];

        info!(
            schema_version = store.schema_version(),
            progress_records = restored,
            online = network.is_online(),
            "Core service started"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                store,
                orchestrator,
                network,
                progress,
                state,
                events,
                cancel,
                tasks: Mutex::new(tasks),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::ShutDown);
        }
        Ok(())
    }

    // ========================================================================
    // Content
    // ========================================================================

    pub async fn get_content(&self, content_id: &str) -> Result<Fetched<ContentItem>> {
        self.ensure_running()?;
        Ok(self.inner.orchestrator.get_content(content_id).await?)
    }

    /// Bypass cached copies and ask the remote source (offline: plain read).
    pub async fn refresh_content(&self, content_id: &str) -> Result<Fetched<ContentItem>> {
        self.ensure_running()?;
        Ok(self.inner.orchestrator.force_revalidate(content_id).await?)
    }

    pub async fn get_index(&self) -> Result<Fetched<Vec<IndexEntry>>> {
        self.ensure_running()?;
        Ok(self.inner.orchestrator.get_index().await?)
    }

    /// Watch a cache key (`index` or `content/<id>`).
    ///
    /// The first snapshot is `Loading` until a value is available; the load
    /// starts immediately.
    pub fn subscribe(&self, key: &str) -> Subscription<CachedValue, SyncError> {
        self.inner.orchestrator.subscribe(key)
    }

    pub fn subscribe_content(&self, content_id: &str) -> Subscription<CachedValue, SyncError> {
        self.inner.orchestrator.subscribe_content(content_id)
    }

    /// Drop every stored item in `category` from memory and disk.
    pub async fn remove_category(&self, category: &str) -> Result<u64> {
        self.ensure_running()?;
        Ok(self.inner.orchestrator.remove_category(category).await?)
    }

    // ========================================================================
    // Progress
    // ========================================================================

    pub async fn mutate_progress(&self, content_id: &str, unit_id: &str) -> Result<ProgressAck> {
        self.ensure_running()?;
        Ok(self.inner.progress.mutate_progress(content_id, unit_id).await?)
    }

    pub async fn complete_content(&self, content_id: &str) -> Result<ProgressAck> {
        self.ensure_running()?;
        Ok(self.inner.progress.complete(content_id).await?)
    }

    pub async fn get_progress(&self, content_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.inner.progress.get(content_id).await?)
    }

    pub async fn list_progress(&self, status: ProgressStatus) -> Result<Vec<ProgressRecord>> {
        Ok(self.inner.progress.list_by_status(status).await?)
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn get_settings(&self) -> Settings {
        self.inner.state.settings()
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_running()?;
        Ok(self.inner.state.set_setting(key, value)?)
    }

    pub fn select_content(&self, content_id: &str) -> Result<()> {
        self.ensure_running()?;
        Ok(self.inner.state.select(content_id)?)
    }

    pub fn clear_selection(&self) {
        self.inner.state.clear_selection();
    }

    pub fn set_flag(&self, name: &str, value: bool) {
        self.inner.state.set_flag(name, value);
    }

    pub fn state(&self) -> AppState {
        self.inner.state.snapshot()
    }

    pub fn watch_state(&self) -> watch::Receiver<AppState> {
        self.inner.state.subscribe()
    }

    // ========================================================================
    // Connectivity and events
    // ========================================================================

    pub fn network_status(&self) -> Connectivity {
        self.inner.network.current().connectivity
    }

    /// Push a connectivity change from the host, skipping the debounce.
    pub fn report_connectivity(&self, connectivity: Connectivity) {
        self.inner.network.set(connectivity);
    }

    pub fn events(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_stream(&self) -> EventStream {
        self.inner.events.stream()
    }

    pub fn store(&self) -> &PersistentStore {
        &self.inner.store
    }

    /// Stop background tasks, drain both persisters and close the store.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Core service already shut down");
            return Ok(());
        }

        self.inner.cancel.cancel();
        self.inner.network.shutdown();
        let tasks: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Background task ended abnormally");
            }
        }

        self.inner.progress.shutdown().await?;
        self.inner.state.shutdown().await?;
        self.inner.store.close().await?;
        info!("Core service stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("network", &self.inner.network)
            .field("state", &self.inner.state)
            .field("shut_down", &self.inner.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
