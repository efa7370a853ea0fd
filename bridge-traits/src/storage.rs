//! Key-Value Storage Abstraction
//!
//! Durable key-value store for user settings and the serialized pieces of
//! the global state container.

use crate::{error::Result, platform::PlatformSend, platform::PlatformSendSync};

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Desktop: SQLite table (`bridge-desktop`)
/// - Mobile: UserDefaults / DataStore
/// - Web: localStorage / IndexedDB
///
/// Writes must be durable once the returned future resolves.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_theme(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("settings.theme", "dark").await
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait SettingsStore: PlatformSendSync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// List keys starting with `prefix`
    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;

    /// Begin a transaction for atomic updates
    ///
    /// Nothing is written until [`SettingsTransaction::commit`] is called.
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction>>;
}

/// Transaction for atomic settings updates
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait SettingsTransaction: PlatformSend {
    /// Set a value within the transaction
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a value within the transaction
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore(Mutex<BTreeMap<String, String>>);

    #[async_trait::async_trait]
    impl SettingsStore for MapStore {
        async fn set_string(&self, key: &str, value: &str) -> Result<()> {
            self.0.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }
        async fn get_string(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
            self.set_string(key, &value.to_string()).await
        }
        async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
            Ok(self.get_string(key).await?.map(|v| v == "true"))
        }
        async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
            self.set_string(key, &value.to_string()).await
        }
        async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
            Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
        async fn has_key(&self, key: &str) -> Result<bool> {
            Ok(self.0.lock().unwrap().contains_key(key))
        }
        async fn list_keys(&self) -> Result<Vec<String>> {
            Ok(self.0.lock().unwrap().keys().cloned().collect())
        }
        async fn clear_all(&self) -> Result<()> {
            self.0.lock().unwrap().clear();
            Ok(())
        }
        async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction>> {
            Err(crate::BridgeError::NotAvailable("transactions".into()))
        }
    }

    #[tokio::test]
    async fn test_list_keys_with_prefix_default() {
        let store = MapStore::default();
        store.set_string("settings.theme", "dark").await.unwrap();
        store.set_i64("settings.font_size", 18).await.unwrap();
        store.set_string("state.current_selection", "go-basics").await.unwrap();

        let keys = store.list_keys_with_prefix("settings.").await.unwrap();
        assert_eq!(keys, vec!["settings.font_size", "settings.theme"]);
    }
}
