use bridge_traits::content::SourceError;
use core_cache::CacheError;
use core_content::StorageError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Offline, with nothing usable stored locally. Callers turn this into
    /// an explicit "unavailable" outcome instead of surfacing an error.
    #[error("'{key}' is not available offline")]
    UnavailableOffline { key: String },

    #[error("Remote source failed for '{key}' after {attempts} attempt(s): {source}")]
    Remote {
        key: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("Remote returned '{returned}' when asked for '{requested}'")]
    KeyMismatch { requested: String, returned: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Content '{content_id}' has not been resolved yet")]
    ContentNotResolvable { content_id: String },

    #[error("Invalid progress update for '{content_id}': {reason}")]
    InvalidProgress { content_id: String, reason: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network monitor error: {0}")]
    Monitor(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether asking again later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::UnavailableOffline { .. } => true,
            SyncError::Remote { source, .. } => source.is_transient(),
            SyncError::Cache(CacheError::LoadAborted { .. }) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let offline = SyncError::UnavailableOffline {
            key: "content/go-basics".into(),
        };
        assert!(offline.is_retryable());

        let rejected = SyncError::Remote {
            key: "content/x".into(),
            attempts: 1,
            source: SourceError::InvalidRequest("unknown".into()),
        };
        assert!(!rejected.is_retryable());

        let throttled = SyncError::Remote {
            key: "content/x".into(),
            attempts: 4,
            source: SourceError::RateLimited { retry_after: None },
        };
        assert!(throttled.is_retryable());
        assert!(throttled.to_string().contains("4 attempt(s)"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: SyncError = StorageError::InvalidInput {
            field: "id".into(),
            message: "empty".into(),
        }
        .into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(!err.is_retryable());
    }
}
