//! Remote Content Source Contract
//!
//! The remote provider is opaque beyond two calls: fetch one content item by
//! key, and fetch the index of everything available. Failures are classified
//! so the orchestrator can decide between retrying and giving up.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::platform::PlatformSendSync;

/// A content item as delivered by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub key: String,
    /// Grouping such as the programming language
    pub category: String,
    pub version: i64,
    /// Structured lesson data, opaque to the engine
    pub body: serde_json::Value,
}

/// One entry of the remote index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub key: String,
    pub category: String,
    pub version: i64,
    pub title: String,
}

/// Transport-level failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkErrorKind {
    Timeout,
    Unreachable,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkErrorKind::Timeout => write!(f, "timeout"),
            NetworkErrorKind::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Errors reported by a [`RemoteContentSource`].
///
/// Messages must never contain credentials or request headers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Rate limited by content source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Content source server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },
}

impl SourceError {
    pub fn timeout(message: impl Into<String>) -> Self {
        SourceError::Network {
            kind: NetworkErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        SourceError::Network {
            kind: NetworkErrorKind::Unreachable,
            message: message.into(),
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::InvalidRequest(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Network { .. })
    }

    /// Server-provided hint for how long to wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Remote provider of tutorial content.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::content::RemoteContentSource;
///
/// async fn titles(source: &dyn RemoteContentSource) -> Vec<String> {
///     match source.fetch_index().await {
///         Ok(index) => index.into_iter().map(|m| m.title).collect(),
///         Err(_) => Vec::new(),
///     }
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait RemoteContentSource: PlatformSendSync {
    /// Fetch a single content item by key.
    async fn fetch_content(&self, key: &str) -> Result<ContentPayload, SourceError>;

    /// Fetch the list of available content.
    async fn fetch_index(&self) -> Result<Vec<ContentMetadata>, SourceError>;
}
