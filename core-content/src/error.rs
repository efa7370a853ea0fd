use bridge_traits::error::BridgeError;
use std::fmt;
use thiserror::Error;

/// Operation being performed when a storage error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Open,
    Migrate,
    Put,
    Get,
    Query,
    Delete,
    Touch,
    Quarantine,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageOp::Open => "open",
            StorageOp::Migrate => "migrate",
            StorageOp::Put => "put",
            StorageOp::Get => "get",
            StorageOp::Query => "query",
            StorageOp::Delete => "delete",
            StorageOp::Touch => "touch",
            StorageOp::Quarantine => "quarantine",
        };
        f.write_str(name)
    }
}

/// Coarse classification of [`StorageError`], used by callers that only
/// need to branch on the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    QuotaExceeded,
    Corrupt,
    SchemaMismatch,
    Backend,
    InvalidInput,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage quota exceeded during {operation} of '{entity_id}'")]
    QuotaExceeded {
        entity_id: String,
        operation: StorageOp,
    },

    #[error("Corrupt record '{entity_id}' during {operation}: {detail}")]
    Corrupt {
        entity_id: String,
        operation: StorageOp,
        detail: String,
    },

    #[error("Schema mismatch: database at version {found}, expected {expected}: {reason}")]
    SchemaMismatch {
        found: i64,
        expected: i64,
        reason: String,
    },

    #[error("Storage backend failed during {operation} of '{entity_id}': {message}")]
    Backend {
        entity_id: String,
        operation: StorageOp,
        message: String,
    },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::QuotaExceeded { .. } => StorageErrorKind::QuotaExceeded,
            StorageError::Corrupt { .. } => StorageErrorKind::Corrupt,
            StorageError::SchemaMismatch { .. } => StorageErrorKind::SchemaMismatch,
            StorageError::Backend { .. } => StorageErrorKind::Backend,
            StorageError::InvalidInput { .. } => StorageErrorKind::InvalidInput,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }

    /// Translate an adapter failure into the storage taxonomy, keeping the
    /// entity and operation that triggered it.
    pub fn from_bridge(err: BridgeError, entity_id: impl Into<String>, operation: StorageOp) -> Self {
        let entity_id = entity_id.into();
        match err {
            BridgeError::StorageFull(_) => StorageError::QuotaExceeded {
                entity_id,
                operation,
            },
            BridgeError::StorageCorrupt(detail) => StorageError::Corrupt {
                entity_id,
                operation,
                detail,
            },
            other => StorageError::Backend {
                entity_id,
                operation,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn corrupt(
        entity_id: impl Into<String>,
        operation: StorageOp,
        detail: impl Into<String>,
    ) -> Self {
        StorageError::Corrupt {
            entity_id: entity_id.into(),
            operation,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        StorageError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
