use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The backing medium refused the write because it is full.
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// The backing medium returned data that failed integrity checks.
    #[error("Storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
