#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::content::{ContentMetadata, ContentPayload, RemoteContentSource, SourceError};
use bridge_traits::time::{Clock, ManualClock};
use chrono::{DateTime, TimeZone, Utc};
use core_content::PersistentStore;
use core_runtime::config::{FetchPolicy, FreshnessPolicy};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{Connectivity, ConnectivityMonitor, FetchOrchestrator, OrchestratorConfig};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Remote source backed by a map, counting calls per key.
#[derive(Default)]
pub struct FakeSource {
    items: Mutex<HashMap<String, ContentPayload>>,
    index: Mutex<Vec<ContentMetadata>>,
    calls: Mutex<HashMap<String, usize>>,
    index_calls: Mutex<usize>,
    delay: Mutex<Duration>,
    failure: Mutex<Option<SourceError>>,
}

impl FakeSource {
    pub fn publish(&self, key: &str, version: i64, units: &[&str]) {
        let payload = ContentPayload {
            key: key.to_string(),
            category: key.split('-').next().unwrap_or("misc").to_string(),
            version,
            body: serde_json::json!({ "title": key, "units": units }),
        };
        self.items.lock().unwrap().insert(key.to_string(), payload);
    }

    pub fn publish_index(&self, keys: &[&str]) {
        *self.index.lock().unwrap() = keys
            .iter()
            .map(|key| ContentMetadata {
                key: key.to_string(),
                category: key.split('-').next().unwrap_or("misc").to_string(),
                version: 1,
                title: key.replace('-', " "),
            })
            .collect();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_with(&self, error: Option<SourceError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn index_calls(&self) -> usize {
        *self.index_calls.lock().unwrap()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteContentSource for FakeSource {
    async fn fetch_content(&self, key: &str) -> Result<ContentPayload, SourceError> {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.pause().await;
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.items
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::InvalidRequest(format!("unknown content '{key}'")))
    }

    async fn fetch_index(&self) -> Result<Vec<ContentMetadata>, SourceError> {
        *self.index_calls.lock().unwrap() += 1;
        self.pause().await;
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.index.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub orchestrator: FetchOrchestrator,
    pub network: ConnectivityMonitor,
    pub source: Arc<FakeSource>,
    pub clock: Arc<ManualClock>,
    pub store: PersistentStore,
    pub events: EventBus,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Content is stale after a minute and expires after ten.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        content_freshness: FreshnessPolicy::new(Duration::from_secs(60), Duration::from_secs(600)),
        index_freshness: FreshnessPolicy::new(Duration::from_secs(30), Duration::from_secs(300)),
        fetch_policy: FetchPolicy {
            timeout: Duration::from_secs(2),
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        ..OrchestratorConfig::default()
    }
}

impl Harness {
    pub async fn new() -> Self {
        let store = PersistentStore::in_memory().await.unwrap();
        Self::with_store(store, Arc::new(FakeSource::default()), test_config())
    }

    pub fn with_store(store: PersistentStore, source: Arc<FakeSource>, config: OrchestratorConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let events = EventBus::new(256);
        let network = ConnectivityMonitor::new(
            Connectivity::Online,
            Arc::clone(&clock) as Arc<dyn Clock>,
            events.clone(),
        );
        let orchestrator = FetchOrchestrator::new(
            store.clone(),
            Arc::clone(&source) as Arc<dyn RemoteContentSource>,
            network.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            events.clone(),
            config,
        )
        .unwrap();
        Self {
            orchestrator,
            network,
            source,
            clock,
            store,
            events,
        }
    }

    /// A second process over the same database: empty memory, same clock.
    pub fn restart(&self) -> Self {
        let restarted = Self::with_store(self.store.clone(), Arc::clone(&self.source), test_config());
        restarted.clock.set(self.clock.now());
        restarted
    }

    pub fn go_offline(&self) {
        self.network.set(Connectivity::Offline);
    }

    pub fn go_online(&self) {
        self.network.set(Connectivity::Online);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
