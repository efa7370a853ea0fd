use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache policy: {0}")]
    InvalidPolicy(String),

    /// The load task ended without producing a result.
    #[error("Load for '{key}' was aborted")]
    LoadAborted { key: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;
