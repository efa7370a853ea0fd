//! Eviction and revalidation limits.

use crate::error::{CacheError, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Maximum summed entry weight; 0 disables the bound.
    pub max_weight: usize,
    /// Entries not read for this long are dropped by
    /// [`ReactiveCache::purge_expired`](crate::ReactiveCache::purge_expired).
    pub max_idle: Option<Duration>,
    /// Serve stale entries while refreshing them in the background. When
    /// off, stale entries are returned as-is and only refreshed on request.
    pub background_revalidation: bool,
}

impl CachePolicy {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_max_weight(mut self, max_weight: usize) -> Self {
        self.max_weight = max_weight;
        self
    }

    pub fn with_max_idle(mut self, max_idle: Option<Duration>) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_background_revalidation(mut self, enabled: bool) -> Self {
        self.background_revalidation = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidPolicy(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if matches!(self.max_idle, Some(idle) if idle.is_zero()) {
            return Err(CacheError::InvalidPolicy(
                "max_idle must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_weight: 0,
            max_idle: Some(Duration::from_secs(24 * 60 * 60)),
            background_revalidation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(CachePolicy::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(CachePolicy::new(0).validate().is_err());
        assert!(CachePolicy::new(4)
            .with_max_idle(Some(Duration::ZERO))
            .validate()
            .is_err());
    }
}
