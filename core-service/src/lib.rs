//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (content source,
//! settings store, network monitor, clock) into the offline-first engine and
//! exposes one handle, [`CoreService`], to the application. Desktop apps
//! typically enable the `desktop-shims` feature, which supplies SQLite
//! settings, a TCP reachability probe and a `reqwest` HTTP client from
//! `bridge-desktop`.

pub mod error;
mod service;

pub use error::{CoreError, Result};
pub use service::CoreService;

pub use core_content::{ContentItem, IndexEntry, ProgressRecord, ProgressStatus};
pub use core_runtime::config::{CoreConfig, FeatureFlags, FetchPolicy, FreshnessPolicy};
pub use core_state::{AppState, Settings, Theme};
pub use core_sync::{CachedValue, Connectivity, Fetched, ProgressAck};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
mod desktop {
    use super::*;
    use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteSettingsStore};
    use bridge_traits::content::RemoteContentSource;
    use provider_content::HttpContentSource;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Start the engine with desktop defaults rooted at `data_dir`.
    ///
    /// Creates `content.db` and `settings.db` inside the directory and probes
    /// connectivity over TCP.
    ///
    /// ```ignore
    /// use core_service::{bootstrap_desktop, desktop_content_source};
    ///
    /// let dir = bridge_desktop::default_data_dir()?;
    /// let source = desktop_content_source("https://content.example.com/v1", None)?;
    /// let core = bootstrap_desktop(dir, source).await?;
    /// let index = core.get_index().await?;
    /// ```
    pub async fn bootstrap_desktop(
        data_dir: impl Into<PathBuf>,
        source: Arc<dyn RemoteContentSource>,
    ) -> Result<CoreService> {
        let data_dir = data_dir.into();
        let settings = SqliteSettingsStore::new(data_dir.join("settings.db"))
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("settings store: {}", e)))?;

        let config = CoreConfig::builder()
            .database_path(data_dir.join("content.db"))
            .content_source(source)
            .settings_store(Arc::new(settings))
            .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
            .build()
            .await?;

        CoreService::start(config).await
    }

    /// HTTP content source over the desktop `reqwest` client.
    pub fn desktop_content_source(
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Arc<dyn RemoteContentSource>> {
        let timeout = FetchPolicy::default().timeout;
        let client = ReqwestHttpClient::with_timeout(timeout)
            .map_err(|e| CoreError::InitializationFailed(format!("http client: {}", e)))?;
        let mut source = HttpContentSource::new(Arc::new(client), base_url)?;
        if let Some(key) = api_key {
            source = source.with_api_key(key);
        }
        Ok(Arc::new(source))
    }
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use desktop::{bootstrap_desktop, desktop_content_source};
