use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Invalid content id: {0}")]
    InvalidSelection(String),

    #[error("Settings store error: {0}")]
    Store(String),

    #[error("State persister has stopped")]
    PersisterStopped,
}

impl From<BridgeError> for StateError {
    fn from(err: BridgeError) -> Self {
        StateError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
