//! Error types for the HTTP content provider

use bridge_traits::content::SourceError;
use bridge_traits::error::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// HTTP content provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Base URL is not an absolute http(s) URL
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The server answered with a non-success status
    #[error("Content API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Too many requests; the server may say how long to wait
    #[error("Rate limited by content API")]
    RateLimited { retry_after: Option<Duration> },

    /// Body did not match the expected shape
    #[error("Failed to parse content API response: {0}")]
    ParseError(String),

    /// Transport failure from the HTTP bridge
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for SourceError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::RateLimited { retry_after } => SourceError::RateLimited { retry_after },
            ProviderError::ApiError {
                status_code,
                message,
            } if status_code >= 500 => SourceError::ServerError {
                status: status_code,
                message,
            },
            ProviderError::ApiError {
                status_code,
                message,
            } => SourceError::InvalidRequest(format!("status {}: {}", status_code, message)),
            // A body we cannot read is the server's fault; another attempt may get a good one.
            ProviderError::ParseError(message) => SourceError::ServerError {
                status: 200,
                message,
            },
            ProviderError::InvalidBaseUrl(url) => {
                SourceError::InvalidRequest(format!("invalid base URL '{}'", url))
            }
            ProviderError::Bridge(BridgeError::Timeout(message)) => SourceError::timeout(message),
            ProviderError::Bridge(BridgeError::Unreachable(message)) => {
                SourceError::unreachable(message)
            }
            ProviderError::Bridge(other) => SourceError::unreachable(other.to_string()),
        }
    }
}
