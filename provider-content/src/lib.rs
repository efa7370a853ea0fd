//! # Content Provider
//!
//! Implements [`bridge_traits::content::RemoteContentSource`] against a JSON
//! content API:
//!
//! - `GET {base}/content/{key}` returns one content payload
//! - `GET {base}/index` returns the list of available content
//!
//! Non-2xx statuses are classified into [`bridge_traits::content::SourceError`]
//! so the fetch orchestrator can decide whether to retry.

pub mod error;
mod source;
mod types;

pub use error::{ProviderError, Result};
pub use source::HttpContentSource;
