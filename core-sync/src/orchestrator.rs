//! # Fetch Orchestrator
//!
//! Resolves reads across memory, the persistent store and the remote
//! source, and writes remote results back through both local tiers.
//!
//! ## Workflow
//!
//! 1. The reactive cache answers fresh and stale hits from memory.
//! 2. On a miss the content loader checks the persistent store. A stored
//!    item that has not expired resolves the request; the cache schedules a
//!    background refresh if it is already stale.
//! 3. Otherwise, when online, the remote source is called with bounded
//!    retries. The result is written to the store, then to memory.
//! 4. Offline with nothing usable locally, or when the network gives out
//!    during retries, the read resolves to
//!    [`Fetched::ContentUnavailableOffline`].
//!
//! A newer remote `version` replaces a stored item. An equal or older one
//! only restarts the stored item's freshness window.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = FetchOrchestrator::new(store, source, network, clock, events, config)?;
//! match orchestrator.get_content("python-basics").await? {
//!     Fetched::Ready { value, source, .. } => render(&value.payload, source),
//!     Fetched::ContentUnavailableOffline => show_offline_notice(),
//! }
//! ```

use crate::network::ConnectivityMonitor;
use crate::request::FetchRequest;
use crate::retry::{fetch_with_retry, RetryFailure};
use crate::{Result, SyncError};
use bridge_traits::content::RemoteContentSource;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_cache::{
    CachePolicy, EntryState, Loaded, Loader, Lookup, Origin, ReactiveCache, Subscription,
};
use core_content::{ContentIndex, ContentItem, IndexEntry, PersistentStore};
use core_runtime::config::{CoreConfig, FeatureFlags, FetchPolicy, FreshnessPolicy};
use core_runtime::events::{
    CoreEvent, ContentEvent, EventBus, NetworkEvent, RecvError, ResolvedFrom,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

pub const INDEX_KEY: &str = "index";
const CONTENT_PREFIX: &str = "content/";

/// Approximate in-memory weight of one index entry.
const INDEX_ENTRY_WEIGHT: usize = 128;

pub fn content_key(content_id: &str) -> String {
    format!("{}{}", CONTENT_PREFIX, content_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheKey {
    Content(String),
    Index,
}

impl CacheKey {
    fn parse(key: &str) -> Result<Self> {
        if key == INDEX_KEY {
            return Ok(CacheKey::Index);
        }
        match key.strip_prefix(CONTENT_PREFIX) {
            Some(id) if !id.is_empty() => Ok(CacheKey::Content(id.to_string())),
            _ => Err(SyncError::InvalidKey(key.to_string())),
        }
    }
}

fn is_expired(now: DateTime<Utc>, as_of: DateTime<Utc>, policy: FreshnessPolicy) -> bool {
    match now.signed_duration_since(as_of).to_std() {
        Ok(age) => age >= policy.expire_after,
        // Timestamp in the future: treat as just fetched.
        Err(_) => false,
    }
}

// ============================================================================
// Values
// ============================================================================

/// What the reactive cache holds for each key.
///
/// Equality ignores where a value came from and when it was fetched, so a
/// revalidation that returns the same content does not wake subscribers.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Content {
        item: Arc<ContentItem>,
        source: ResolvedFrom,
    },
    Index {
        entries: Arc<Vec<IndexEntry>>,
        source: ResolvedFrom,
    },
}

impl CachedValue {
    fn content(item: ContentItem, source: ResolvedFrom) -> Self {
        CachedValue::Content {
            item: Arc::new(item),
            source,
        }
    }

    pub fn source(&self) -> ResolvedFrom {
        match self {
            CachedValue::Content { source, .. } | CachedValue::Index { source, .. } => *source,
        }
    }

    pub fn as_content(&self) -> Option<&Arc<ContentItem>> {
        match self {
            CachedValue::Content { item, .. } => Some(item),
            CachedValue::Index { .. } => None,
        }
    }

    pub fn as_index(&self) -> Option<&Arc<Vec<IndexEntry>>> {
        match self {
            CachedValue::Index { entries, .. } => Some(entries),
            CachedValue::Content { .. } => None,
        }
    }

    fn weight(&self) -> usize {
        match self {
            CachedValue::Content { item, .. } => item.approx_size(),
            CachedValue::Index { entries, .. } => entries.len().max(1) * INDEX_ENTRY_WEIGHT,
        }
    }
}

impl PartialEq for CachedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CachedValue::Content { item: a, .. }, CachedValue::Content { item: b, .. }) => {
                a.same_content(b)
            }
            (CachedValue::Index { entries: a, .. }, CachedValue::Index { entries: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ready {
        value: Arc<T>,
        source: ResolvedFrom,
        /// Served past its freshness window; a refresh may be running.
        stale: bool,
    },
    /// Offline, and nothing usable is stored locally.
    ContentUnavailableOffline,
}

impl<T> Fetched<T> {
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            Fetched::Ready { value, .. } => Some(value),
            Fetched::ContentUnavailableOffline => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Fetched::Ready { .. })
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub content_freshness: FreshnessPolicy,
    pub index_freshness: FreshnessPolicy,
    pub fetch_policy: FetchPolicy,
    pub cache_policy: CachePolicy,
    pub features: FeatureFlags,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            content_freshness: FreshnessPolicy::content_default(),
            index_freshness: FreshnessPolicy::index_default(),
            fetch_policy: FetchPolicy::default(),
            cache_policy: CachePolicy::default(),
            features: FeatureFlags::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            content_freshness: config.content_freshness,
            index_freshness: config.index_freshness,
            fetch_policy: config.fetch_policy,
            cache_policy: CachePolicy::new(config.cache_capacity)
                .with_max_idle(Some(config.cache_max_idle))
                .with_background_revalidation(config.features.background_revalidation),
            features: config.features,
        }
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Fills the reactive cache from the store and the remote source.
struct ContentLoader {
    store: PersistentStore,
    source: Arc<dyn RemoteContentSource>,
    network: ConnectivityMonitor,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: OrchestratorConfig,
}

impl ContentLoader {
    fn emit(&self, event: ContentEvent) {
        if let Err(err) = self.events.emit(CoreEvent::Content(event)) {
            trace!(error = %err, "No subscribers for content event");
        }
    }

    fn is_expired(&self, as_of: DateTime<Utc>, policy: FreshnessPolicy) -> bool {
        is_expired(self.clock.now(), as_of, policy)
    }

    fn unavailable(&self, key: &str) -> SyncError {
        self.emit(ContentEvent::Unavailable {
            content_id: key.to_string(),
        });
        SyncError::UnavailableOffline {
            key: key.to_string(),
        }
    }

    /// Network failures that outlast the retries degrade to "unavailable";
    /// service failures are reported as errors.
    fn remote_failure(&self, key: &str, failure: RetryFailure) -> SyncError {
        if failure.error.is_network() {
            debug!(key, error = %failure.error, "Remote unreachable, treating as offline");
            return self.unavailable(key);
        }
        self.emit(ContentEvent::FetchFailed {
            content_id: key.to_string(),
            message: failure.error.to_string(),
            retryable: failure.error.is_transient(),
            attempts: failure.attempts,
        });
        SyncError::Remote {
            key: key.to_string(),
            attempts: failure.attempts,
            source: failure.error,
        }
    }

    /// Read a stored item. A corrupt row has already been quarantined by
    /// the store and counts as a miss.
    async fn read_local(&self, content_id: &str) -> Result<Option<ContentItem>> {
        match self.store.content().get(content_id).await {
            Ok(item) => Ok(item),
            Err(err) if err.is_corrupt() => {
                warn!(content_id, error = %err, "Stored content was corrupt");
                self.emit(ContentEvent::Quarantined {
                    entity_id: content_id.to_string(),
                    entity_kind: "content".to_string(),
                    reason: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_through(&self, incoming: ContentItem) -> Result<ContentItem> {
        let current = self.read_local(&incoming.id).await?;
        let item = match current {
            Some(mut kept) if kept.version >= incoming.version => {
                if kept.version > incoming.version {
                    warn!(
                        content_id = %kept.id,
                        stored = kept.version,
                        remote = incoming.version,
                        "Remote served an older version; keeping the stored one"
                    );
                }
                kept.fetched_at = incoming.fetched_at;
                self.store.content().put(&kept).await?;
                kept
            }
            _ => {
                self.store.content().put(&incoming).await?;
                self.emit(ContentEvent::Stored {
                    content_id: incoming.id.clone(),
                    version: incoming.version,
                });
                incoming
            }
        };
        Ok(item)
    }

    async fn resolve_content(&self, content_id: &str, remote_first: bool) -> Result<Loaded<CachedValue>> {
        let key = content_key(content_id);
        let mut request = FetchRequest::new(key.as_str(), self.clock.now());

        if !remote_first {
            request.check_local()?;
            if let Some(item) = self.read_local(content_id).await? {
                if !self.is_expired(item.fetched_at, self.config.content_freshness) {
                    request.resolve(ResolvedFrom::Store)?;
                    debug!(request_id = %request.id, content_id, version = item.version, "Resolved from store");
                    let as_of = item.fetched_at;
                    return Ok(Loaded::new(CachedValue::content(item, ResolvedFrom::Store), as_of));
                }
                debug!(request_id = %request.id, content_id, "Stored content expired");
            }
        }

        if !self.network.is_online() {
            request.fail("offline")?;
            return Err(self.unavailable(&key));
        }

        request.fetch_remote()?;
        let fetched = fetch_with_retry(
            &self.config.fetch_policy,
            &key,
            || self.network.is_online(),
            || self.source.fetch_content(content_id),
        )
        .await;

        let (payload, attempts) = match fetched {
            Ok(success) => success,
            Err(failure) => {
                request.record_attempts(failure.attempts);
                request.fail(failure.error.to_string())?;
                return Err(self.remote_failure(&key, failure));
            }
        };
        request.record_attempts(attempts);

        if payload.key != content_id {
            request.fail("key mismatch")?;
            let err = SyncError::KeyMismatch {
                requested: content_id.to_string(),
                returned: payload.key,
            };
            self.emit(ContentEvent::FetchFailed {
                content_id: key,
                message: err.to_string(),
                retryable: false,
                attempts,
            });
            return Err(err);
        }

        let item = self
            .write_through(ContentItem::from_payload(payload, self.clock.now()))
            .await?;
        request.resolve(ResolvedFrom::Remote)?;
        self.emit(ContentEvent::Fetched {
            content_id: content_id.to_string(),
            version: item.version,
            attempts,
        });
        debug!(request_id = %request.id, content_id, version = item.version, attempts, "Resolved from remote");

        let as_of = item.fetched_at;
        Ok(Loaded::new(CachedValue::content(item, ResolvedFrom::Remote), as_of))
    }

    async fn resolve_index(&self, remote_first: bool) -> Result<Loaded<CachedValue>> {
        let mut request = FetchRequest::new(INDEX_KEY, self.clock.now());
        let index = self.store.index();

        if !remote_first {
            request.check_local()?;
            if let Some(refreshed_at) = index.refreshed_at().await? {
                if !self.is_expired(refreshed_at, self.config.index_freshness) {
                    let entries = index.list().await?;
                    request.resolve(ResolvedFrom::Store)?;
                    return Ok(Loaded::new(
                        CachedValue::Index {
                            entries: Arc::new(entries),
                            source: ResolvedFrom::Store,
                        },
                        refreshed_at,
                    ));
                }
            }
        }

        if !self.network.is_online() {
            request.fail("offline")?;
            return Err(self.unavailable(INDEX_KEY));
        }

        request.fetch_remote()?;
        let fetched = fetch_with_retry(
            &self.config.fetch_policy,
            INDEX_KEY,
            || self.network.is_online(),
            || self.source.fetch_index(),
        )
        .await;
        let (metadata, attempts) = match fetched {
            Ok(success) => success,
            Err(failure) => {
                request.record_attempts(failure.attempts);
                request.fail(failure.error.to_string())?;
                return Err(self.remote_failure(INDEX_KEY, failure));
            }
        };
        request.record_attempts(attempts);

        let entries: Vec<IndexEntry> = metadata.into_iter().map(IndexEntry::from).collect();
        let refreshed_at = self.clock.now();
        index.replace_all(&entries, refreshed_at).await?;
        request.resolve(ResolvedFrom::Remote)?;
        self.emit(ContentEvent::IndexRefreshed {
            entries: entries.len(),
        });

        Ok(Loaded::new(
            CachedValue::Index {
                entries: Arc::new(entries),
                source: ResolvedFrom::Remote,
            },
            refreshed_at,
        ))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl Loader<CachedValue, SyncError> for ContentLoader {
    async fn load(&self, key: &str) -> Result<Loaded<CachedValue>> {
        match CacheKey::parse(key)? {
            CacheKey::Content(id) => self.resolve_content(&id, false).await,
            CacheKey::Index => self.resolve_index(false).await,
        }
    }

    async fn revalidate(&self, key: &str) -> Result<Loaded<CachedValue>> {
        match CacheKey::parse(key)? {
            CacheKey::Content(id) => self.resolve_content(&id, true).await,
            CacheKey::Index => self.resolve_index(true).await,
        }
    }

    fn freshness(&self, key: &str) -> FreshnessPolicy {
        if key == INDEX_KEY {
            self.config.index_freshness
        } else {
            self.config.content_freshness
        }
    }

    fn can_revalidate(&self) -> bool {
        self.network.is_online()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Entry point for content reads. Cheap to clone.
#[derive(Clone)]
pub struct FetchOrchestrator {
    cache: ReactiveCache<CachedValue, SyncError>,
    store: PersistentStore,
    network: ConnectivityMonitor,
    clock: Arc<dyn Clock>,
    events: EventBus,
    features: FeatureFlags,
    content_freshness: FreshnessPolicy,
}

impl FetchOrchestrator {
    pub fn new(
        store: PersistentStore,
        source: Arc<dyn RemoteContentSource>,
        network: ConnectivityMonitor,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.content_freshness.validate("content_freshness").map_err(config_error)?;
        config.index_freshness.validate("index_freshness").map_err(config_error)?;
        config.fetch_policy.validate().map_err(config_error)?;

        let features = config.features;
        let content_freshness = config.content_freshness;
        let cache_policy = config
            .cache_policy
            .clone()
            .with_background_revalidation(
                config.cache_policy.background_revalidation && features.background_revalidation,
            );
        let loader: Arc<dyn Loader<CachedValue, SyncError>> = Arc::new(ContentLoader {
            store: store.clone(),
            source,
            network: network.clone(),
            clock: Arc::clone(&clock),
            events: events.clone(),
            config,
        });
        let cache = ReactiveCache::builder(loader)
            .policy(cache_policy)
            .clock(Arc::clone(&clock))
            .weigher(CachedValue::weight)
            .events(events.clone())
            .build()?;

        Ok(Self {
            cache,
            store,
            network,
            clock,
            events,
            features,
            content_freshness,
        })
    }

    fn emit(&self, event: CoreEvent) {
        if let Err(err) = self.events.emit(event) {
            trace!(error = %err, "No subscribers for event");
        }
    }

    /// Resolve one content item.
    #[instrument(skip(self))]
    pub async fn get_content(&self, content_id: &str) -> Result<Fetched<ContentItem>> {
        if content_id.trim().is_empty() {
            return Err(SyncError::InvalidKey("content id cannot be empty".to_string()));
        }
        let outcome = self.cache.get_or_fetch(&content_key(content_id)).await;
        self.finish_content(content_id, outcome).await
    }

    /// Skip memory and the store and ask the remote source. Offline this is
    /// an ordinary read.
    ///
    /// If the remote cannot be reached, a local copy that has not expired is
    /// returned marked stale.
    #[instrument(skip(self))]
    pub async fn force_revalidate(&self, content_id: &str) -> Result<Fetched<ContentItem>> {
        if !self.network.is_online() {
            return self.get_content(content_id).await;
        }
        let outcome = match self.cache.reload(&content_key(content_id)).await {
            Err(err @ SyncError::UnavailableOffline { .. }) => match self.local_copy(content_id).await? {
                Some(lookup) => {
                    debug!(content_id, "Remote unreachable; serving the local copy");
                    Ok(lookup)
                }
                None => Err(err),
            },
            other => other,
        };
        self.finish_content(content_id, outcome).await
    }

    /// The best unexpired copy held locally, memory first.
    async fn local_copy(&self, content_id: &str) -> Result<Option<Lookup<CachedValue>>> {
        if let Some(lookup) = self.cache.peek(&content_key(content_id)) {
            if lookup.state != EntryState::Expired {
                return Ok(Some(Lookup {
                    state: EntryState::Stale,
                    ..lookup
                }));
            }
        }
        let item = match self.store.content().get(content_id).await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(None),
            Err(err) if err.is_corrupt() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if is_expired(self.clock.now(), item.fetched_at, self.content_freshness) {
            return Ok(None);
        }
        Ok(Some(Lookup {
            value: CachedValue::content(item, ResolvedFrom::Store),
            state: EntryState::Stale,
            origin: Origin::Loaded,
        }))
    }

    async fn finish_content(
        &self,
        content_id: &str,
        outcome: Result<Lookup<CachedValue>>,
    ) -> Result<Fetched<ContentItem>> {
        let lookup = match outcome {
            Ok(lookup) => lookup,
            Err(SyncError::UnavailableOffline { .. }) => {
                return Ok(Fetched::ContentUnavailableOffline)
            }
            Err(err) => return Err(err),
        };

        let source = match lookup.origin {
            Origin::Memory => ResolvedFrom::Cache,
            Origin::Loaded => lookup.value.source(),
        };
        let stale = lookup.state != EntryState::Fresh;
        let Some(item) = lookup.value.as_content().cloned() else {
            return Err(SyncError::InvalidKey(content_key(content_id)));
        };

        // Memory hits stay off the database; the access is recorded when
        // the item is next loaded.
        if lookup.origin == Origin::Loaded {
            if let Err(err) = self.store.content().touch(content_id, self.clock.now()).await {
                warn!(content_id, error = %err, "Failed to record access time");
            }
        }
        self.emit(CoreEvent::Content(ContentEvent::Resolved {
            content_id: content_id.to_string(),
            source,
            version: item.version,
        }));

        Ok(Fetched::Ready {
            value: item,
            source,
            stale,
        })
    }

    /// Resolve the list of available content.
    #[instrument(skip(self))]
    pub async fn get_index(&self) -> Result<Fetched<Vec<IndexEntry>>> {
        let lookup = match self.cache.get_or_fetch(INDEX_KEY).await {
            Ok(lookup) => lookup,
            Err(SyncError::UnavailableOffline { .. }) => {
                return Ok(Fetched::ContentUnavailableOffline)
            }
            Err(err) => return Err(err),
        };
        let source = match lookup.origin {
            Origin::Memory => ResolvedFrom::Cache,
            Origin::Loaded => lookup.value.source(),
        };
        let stale = lookup.state != EntryState::Fresh;
        let Some(entries) = lookup.value.as_index().cloned() else {
            return Err(SyncError::InvalidKey(INDEX_KEY.to_string()));
        };
        Ok(Fetched::Ready {
            value: entries,
            source,
            stale,
        })
    }

    /// Observe a cache key ([`content_key`] or [`INDEX_KEY`]).
    pub fn subscribe(&self, key: &str) -> Subscription<CachedValue, SyncError> {
        self.cache.subscribe(key)
    }

    pub fn subscribe_content(&self, content_id: &str) -> Subscription<CachedValue, SyncError> {
        self.cache.subscribe(&content_key(content_id))
    }

    /// Whether the item can be read without the network.
    pub async fn is_resolvable(&self, content_id: &str) -> Result<bool> {
        if self.cache.contains_key(&content_key(content_id)) {
            return Ok(true);
        }
        match self.store.content().get(content_id).await {
            Ok(item) => Ok(item.is_some()),
            Err(err) if err.is_corrupt() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Drop the in-memory copy. Subscribers trigger a reload.
    pub fn invalidate(&self, content_id: &str) -> bool {
        self.cache.invalidate(&content_key(content_id))
    }

    pub fn invalidate_all_content(&self) -> usize {
        self.cache.invalidate_prefix(CONTENT_PREFIX)
    }

    /// Delete every stored item in `category` and drop them from memory.
    #[instrument(skip(self))]
    pub async fn remove_category(&self, category: &str) -> Result<u64> {
        let repo = self.store.content();
        let items = repo
            .query_by_index(&ContentIndex::Category(category.to_string()))
            .await?;
        let removed = repo.delete_category(category).await?;
        for item in &items {
            self.cache.invalidate(&content_key(&item.id));
        }
        info!(category, removed, "Removed stored category");
        Ok(removed)
    }

    /// Revalidate every subscribed key that is not fresh, once each.
    pub fn reconnect_sweep(&self) -> usize {
        if !self.features.reconnect_sweep {
            debug!("Reconnect sweep disabled");
            return 0;
        }
        let revalidated = self.cache.revalidate_subscribed();
        info!(revalidated, "Reconnect sweep");
        self.emit(CoreEvent::Network(NetworkEvent::ReconnectSweep { revalidated }));
        revalidated
    }

    /// Run [`FetchOrchestrator::reconnect_sweep`] on every offline to
    /// online transition until `cancel` fires.
    ///
    /// Transitions are read from the event bus rather than the state
    /// channel so a quick offline/online pair is never coalesced away.
    pub fn spawn_reconnect_watcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(CoreEvent::Network(NetworkEvent::Online { .. })) => {
                        this.reconnect_sweep();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reconnect watcher lagged behind the event bus");
                        if this.network.is_online() {
                            this.reconnect_sweep();
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Reconnect watcher stopped");
        })
    }

    /// Evict entries past their expiry or idle limit.
    pub fn purge_memory(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache(&self) -> &ReactiveCache<CachedValue, SyncError> {
        &self.cache
    }

    pub fn network(&self) -> &ConnectivityMonitor {
        &self.network
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("cache", &self.cache)
            .field("network", &self.network)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

fn config_error(err: core_runtime::Error) -> SyncError {
    SyncError::InvalidConfig(err.to_string())
}
