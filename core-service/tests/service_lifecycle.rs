use async_trait::async_trait;
use bridge_traits::content::{ContentMetadata, ContentPayload, RemoteContentSource, SourceError};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor};
use bridge_traits::storage::{SettingsStore, SettingsTransaction};
use core_cache::SnapshotStatus;
use core_runtime::events::{CoreEvent, NetworkEvent};
use core_service::{
    Connectivity, CoreConfig, CoreError, CoreService, Fetched, ProgressStatus, Theme,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct MapSource {
    items: Mutex<HashMap<String, ContentPayload>>,
    calls: Mutex<usize>,
}

impl MapSource {
    fn publish(&self, key: &str, version: i64) {
        self.items.lock().unwrap().insert(
            key.to_string(),
            ContentPayload {
                key: key.to_string(),
                category: "python".to_string(),
                version,
                body: serde_json::json!({ "units": ["intro", "loops"] }),
            },
        );
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RemoteContentSource for MapSource {
    async fn fetch_content(&self, key: &str) -> Result<ContentPayload, SourceError> {
        *self.calls.lock().unwrap() += 1;
        self.items
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::InvalidRequest(key.to_string()))
    }

    async fn fetch_index(&self) -> Result<Vec<ContentMetadata>, SourceError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .map(|p| ContentMetadata {
                key: p.key.clone(),
                category: p.category.clone(),
                version: p.version,
                title: p.key.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
struct MapStore(Mutex<BTreeMap<String, String>>);

#[async_trait]
impl SettingsStore for MapStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.0.lock().unwrap().insert(key.into(), value.into());
        Ok(())
    }
    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }
    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }
    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.get_string(key).await?.map(|v| v == "true"))
    }
    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }
    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }
    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.0.lock().unwrap().remove(key);
        Ok(())
    }
    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.0.lock().unwrap().contains_key(key))
    }
    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.0.lock().unwrap().keys().cloned().collect())
    }
    async fn clear_all(&self) -> BridgeResult<()> {
        self.0.lock().unwrap().clear();
        Ok(())
    }
    async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction>> {
        Err(BridgeError::NotAvailable("transactions".into()))
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<NetworkInfo>);

#[async_trait]
impl NetworkChangeStream for ChannelStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        self.0.recv().await
    }
}

struct PushMonitor {
    initial: NetworkInfo,
    stream: Mutex<Option<ChannelStream>>,
}

impl PushMonitor {
    fn new(initial: NetworkInfo) -> (Arc<Self>, mpsc::UnboundedSender<NetworkInfo>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(Self {
            initial,
            stream: Mutex::new(Some(ChannelStream(rx))),
        });
        (monitor, tx)
    }
}

#[async_trait]
impl NetworkMonitor for PushMonitor {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        Ok(self.initial.clone())
    }

    async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
        let stream = self
            .stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::NotAvailable("already subscribed".into()))?;
        Ok(Box::new(stream))
    }
}

async fn start(
    dir: &Path,
    source: Arc<MapSource>,
    settings: Arc<MapStore>,
    network: NetworkInfo,
) -> (CoreService, mpsc::UnboundedSender<NetworkInfo>) {
    let (monitor, tx) = PushMonitor::new(network);
    let config = CoreConfig::builder()
        .database_path(dir.join("content.db"))
        .content_source(source)
        .settings_store(settings)
        .network_monitor(monitor)
        .network_debounce(Duration::ZERO)
        .build()
        .await
        .unwrap();
    (CoreService::start(config).await.unwrap(), tx)
}

#[tokio::test]
async fn test_everything_survives_an_offline_restart() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MapSource::default());
    let settings = Arc::new(MapStore::default());
    source.publish("python-basics", 1);

    let (core, _net) = start(dir.path(), source.clone(), settings.clone(), NetworkInfo::connected()).await;
    assert!(core.get_content("python-basics").await.unwrap().is_available());
    core.mutate_progress("python-basics", "intro").await.unwrap();
    core.set_setting("theme", "dark").unwrap();
    core.select_content("python-basics").unwrap();
    core.shutdown().await.unwrap();

    let (core, _net) = start(dir.path(), source.clone(), settings, NetworkInfo::disconnected()).await;
    assert_eq!(core.network_status(), Connectivity::Offline);
    assert_eq!(core.get_settings().theme, Theme::Dark);
    assert_eq!(core.state().current_selection.as_deref(), Some("python-basics"));

    let Fetched::Ready { value, .. } = core.get_content("python-basics").await.unwrap() else {
        panic!("expected stored content offline");
    };
    assert_eq!(value.version, 1);
    assert_eq!(source.calls(), 1);

    let progress = core.get_progress("python-basics").await.unwrap().unwrap();
    assert!(progress.completed_units.contains("intro"));
    assert_eq!(
        core.list_progress(ProgressStatus::InProgress).await.unwrap().len(),
        1
    );

    assert_eq!(
        core.get_content("never-seen").await.unwrap(),
        Fetched::ContentUnavailableOffline
    );
    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscription_reaches_ready() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MapSource::default());
    source.publish("python-basics", 2);
    let (core, _net) = start(
        dir.path(),
        source,
        Arc::new(MapStore::default()),
        NetworkInfo::connected(),
    )
    .await;

    let mut subscription = core.subscribe_content("python-basics");
    let ready = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = subscription.next().await.unwrap();
            if snapshot.status == SnapshotStatus::Ready {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(ready.value.unwrap().as_content().unwrap().version, 2);
    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_network_changes_reach_state_and_events() {
    let dir = tempfile::tempdir().unwrap();
    let (core, net) = start(
        dir.path(),
        Arc::new(MapSource::default()),
        Arc::new(MapStore::default()),
        NetworkInfo::connected(),
    )
    .await;
    let mut events = core.events();
    let mut state = core.watch_state();

    net.send(NetworkInfo::disconnected()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.borrow_and_update().network_status != Connectivity::Offline {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let offline = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let CoreEvent::Network(NetworkEvent::Offline { .. }) = events.recv().await.unwrap() {
                return true;
            }
        }
    })
    .await
    .unwrap();
    assert!(offline);
    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_calls_after_shutdown_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (core, _net) = start(
        dir.path(),
        Arc::new(MapSource::default()),
        Arc::new(MapStore::default()),
        NetworkInfo::connected(),
    )
    .await;

    core.shutdown().await.unwrap();
    core.shutdown().await.unwrap();
    assert!(matches!(
        core.get_content("python-basics").await,
        Err(CoreError::ShutDown)
    ));
    assert!(matches!(core.set_setting("theme", "dark"), Err(CoreError::ShutDown)));
}

#[tokio::test]
async fn test_invalid_setting_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (core, _net) = start(
        dir.path(),
        Arc::new(MapSource::default()),
        Arc::new(MapStore::default()),
        NetworkInfo::connected(),
    )
    .await;

    let err = core.set_setting("font_size", "3").unwrap_err();
    assert!(matches!(err, CoreError::State(_)));
    assert!(!err.is_retryable());
    core.shutdown().await.unwrap();
}
