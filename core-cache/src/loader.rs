//! The seam between the cache and whatever produces its values.

use bridge_traits::platform::PlatformSendSync;
use chrono::{DateTime, Utc};
use core_runtime::config::FreshnessPolicy;

/// A value produced by a [`Loader`], with the instant its freshness is
/// measured from.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<V> {
    pub value: V,
    pub as_of: DateTime<Utc>,
}

impl<V> Loaded<V> {
    pub fn new(value: V, as_of: DateTime<Utc>) -> Self {
        Self { value, as_of }
    }
}

/// Produces values for cache keys.
///
/// `load` serves misses and expired entries and may consult slower local
/// tiers. `revalidate` refreshes a stale entry and should go to the origin.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait Loader<V: Send + 'static, E: Send + 'static>: PlatformSendSync {
    async fn load(&self, key: &str) -> Result<Loaded<V>, E>;

    async fn revalidate(&self, key: &str) -> Result<Loaded<V>, E> {
        self.load(key).await
    }

    fn freshness(&self, key: &str) -> FreshnessPolicy;

    /// Whether a background refresh can make progress right now.
    fn can_revalidate(&self) -> bool {
        true
    }
}
