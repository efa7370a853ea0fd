//! # Core Configuration Module
//!
//! Builder-based configuration for the offline content engine.
//!
//! ## Required Dependencies
//!
//! - `RemoteContentSource` - where content and the index come from
//! - `SettingsStore` - key-value store for settings and persisted state
//! - `NetworkMonitor` - connectivity observations
//!
//! With the `desktop-shims` feature the builder falls back to
//! `SqliteSettingsStore` (next to the database file) and
//! `DesktopNetworkMonitor` when those are not injected. The content source
//! always has to be provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, FetchPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/tutor/content.db")
//!     .content_source(Arc::new(my_source))
//!     .fetch_policy(FetchPolicy {
//!         timeout: Duration::from_secs(10),
//!         ..FetchPolicy::default()
//!     })
//!     .build()
//!     .await?;
//! ```
//!
//! ## Error Handling
//!
//! `build()` fails fast: a missing capability yields
//! [`Error::CapabilityMissing`] naming it, and inconsistent durations yield
//! [`Error::Config`].

use crate::error::{Error, Result};
use bridge_traits::{Clock, NetworkMonitor, RemoteContentSource, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a cached value stays fresh, and how long it may be served at all.
///
/// Between `stale_after` and `expire_after` the value is served immediately
/// while a background refresh runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub stale_after: Duration,
    pub expire_after: Duration,
}

impl FreshnessPolicy {
    pub fn new(stale_after: Duration, expire_after: Duration) -> Self {
        Self {
            stale_after,
            expire_after,
        }
    }

    /// Content items rarely change; only a newer remote version replaces them.
    pub fn content_default() -> Self {
        Self::new(7 * DAY, 365 * DAY)
    }

    pub fn index_default() -> Self {
        Self::new(Duration::from_secs(60 * 60), 7 * DAY)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.stale_after > self.expire_after {
            return Err(Error::Config(format!(
                "{}: stale_after ({:?}) must not exceed expire_after ({:?})",
                name, self.stale_after, self.expire_after
            )));
        }
        if self.expire_after.is_zero() {
            return Err(Error::Config(format!(
                "{}: expire_after must be greater than zero",
                name
            )));
        }
        Ok(())
    }
}

/// Remote fetch timeout and retry schedule.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`. A server-provided retry hint replaces the computed delay but
/// is still capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Deadline for a single remote call
    pub timeout: Duration,
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl FetchPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "FetchPolicy.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "FetchPolicy.timeout must be greater than zero".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::Config(
                "FetchPolicy.base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Feature flags control optional behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Revalidate stale subscribed keys after reconnecting
    pub reconnect_sweep: bool,
    /// Refresh stale cache entries in the background when served
    pub background_revalidation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            reconnect_sweep: true,
            background_revalidation: true,
        }
    }
}

/// Core configuration.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite database file for the persistent store
    pub database_path: PathBuf,
    pub content_freshness: FreshnessPolicy,
    pub index_freshness: FreshnessPolicy,
    /// Maximum number of entries held by the in-memory cache
    pub cache_capacity: usize,
    /// Entries not read for this long are evicted regardless of capacity
    pub cache_max_idle: Duration,
    pub fetch_policy: FetchPolicy,
    /// Quiet period a connectivity change must survive before it counts
    pub network_debounce: Duration,
    pub event_buffer: usize,
    pub content_source: Arc<dyn RemoteContentSource>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
    pub clock: Arc<dyn Clock>,
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("content_freshness", &self.content_freshness)
            .field("index_freshness", &self.index_freshness)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_max_idle", &self.cache_max_idle)
            .field("fetch_policy", &self.fetch_policy)
            .field("network_debounce", &self.network_debounce)
            .field("event_buffer", &self.event_buffer)
            .field("content_source", &"RemoteContentSource { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("clock", &"Clock { ... }")
            .field("features", &self.features)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Checks value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.content_freshness.validate("content_freshness")?;
        self.index_freshness.validate("index_freshness")?;
        self.fetch_policy.validate()?;

        if self.cache_capacity == 0 {
            return Err(Error::Config(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn content_source_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RemoteContentSource".to_string(),
        message: "A content source is required to download tutorials. \
                  Inject provider-content's HttpContentSource or a host adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
async fn provide_default_settings_store(_database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for settings and state. \
                  Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                  Mobile: inject UserDefaults/DataStore. Web: inject a localStorage store."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
async fn provide_default_settings_store(database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;

    let path = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"));

    let store = SqliteSettingsStore::new(path)
        .await
        .map_err(|e| Error::Internal(format!("Failed to initialize default SettingsStore: {}", e)))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(Error::CapabilityMissing {
        capability: "NetworkMonitor".to_string(),
        message: "NetworkMonitor implementation is required to decide between local and \
                  remote reads. Desktop: enable the 'desktop-shims' feature. \
                  Mobile/Web: inject the platform connectivity API."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Ok(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    content_freshness: Option<FreshnessPolicy>,
    index_freshness: Option<FreshnessPolicy>,
    cache_capacity: Option<usize>,
    cache_max_idle: Option<Duration>,
    fetch_policy: Option<FetchPolicy>,
    network_debounce: Option<Duration>,
    event_buffer: Option<usize>,
    content_source: Option<Arc<dyn RemoteContentSource>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/data/tutor/content.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Default: stale after 7 days, expired after 365 days.
    pub fn content_freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.content_freshness = Some(policy);
        self
    }

    /// Default: stale after 1 hour, expired after 7 days.
    pub fn index_freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.index_freshness = Some(policy);
        self
    }

    /// Default: 256 entries.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Default: 24 hours.
    pub fn cache_max_idle(mut self, idle: Duration) -> Self {
        self.cache_max_idle = Some(idle);
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    /// Default: 1 second.
    pub fn network_debounce(mut self, debounce: Duration) -> Self {
        self.network_debounce = Some(debounce);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Sets the remote content source (required).
    pub fn content_source(mut self, source: Arc<dyn RemoteContentSource>) -> Self {
        self.content_source = Some(source);
        self
    }

    /// Sets the key-value store (required without `desktop-shims`).
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the network monitor (required without `desktop-shims`).
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Overrides the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_reconnect_sweep(mut self, enabled: bool) -> Self {
        self.features.reconnect_sweep = enabled;
        self
    }

    pub fn enable_background_revalidation(mut self, enabled: bool) -> Self {
        self.features.background_revalidation = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// Async because the desktop default settings store opens its database
    /// on the caller's runtime.
    pub async fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let content_source = self.content_source.ok_or_else(content_source_missing_error)?;

        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path).await?,
        };

        let config = CoreConfig {
            database_path,
            content_freshness: self
                .content_freshness
                .unwrap_or_else(FreshnessPolicy::content_default),
            index_freshness: self
                .index_freshness
                .unwrap_or_else(FreshnessPolicy::index_default),
            cache_capacity: self.cache_capacity.unwrap_or(256),
            cache_max_idle: self.cache_max_idle.unwrap_or(DAY),
            fetch_policy: self.fetch_policy.unwrap_or_default(),
            network_debounce: self.network_debounce.unwrap_or(Duration::from_secs(1)),
            event_buffer: self
                .event_buffer
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            content_source,
            settings_store,
            network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}
