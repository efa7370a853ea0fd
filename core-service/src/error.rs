use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] core_content::StorageError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("State error: {0}")]
    State(#[from] core_state::StateError),

    #[error("Content provider error: {0}")]
    Provider(#[from] provider_content::ProviderError),

    #[error("Service has been shut down")]
    ShutDown,
}

impl CoreError {
    /// Whether the caller may simply try the same call again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Sync(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
