//! # Host Bridge Traits
//!
//! Capability contracts that the offline content engine needs from its host.
//!
//! ## Overview
//!
//! The core crates never talk to the operating system directly. Durable
//! key-value storage, connectivity probing, HTTP transport and the remote
//! content provider are all reached through the traits in this crate so each
//! host (desktop, mobile, web) can ship its own adapters.
//!
//! ## Traits
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value store for settings and serialized state
//! - [`DatabaseAdapter`](database::DatabaseAdapter) - Relational backend used by the persistent store
//!
//! ### Networking
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity status and change notifications
//! - [`HttpClient`](http::HttpClient) - Single-shot async HTTP transport
//! - [`RemoteContentSource`](content::RemoteContentSource) - Provider of tutorial content and its index
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Mobile   | TBD                 | 📋 Planned |
//! | Web      | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! not injected:
//!
//! ```ignore
//! let source = builder.content_source
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "RemoteContentSource".to_string(),
//!         message: "No content source provided".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Host plumbing reports failures through [`BridgeError`](error::BridgeError).
//! The remote content contract has its own [`SourceError`](content::SourceError)
//! because callers must distinguish transient from permanent failures.
//!
//! ## Thread Safety
//!
//! All bridge traits carry the [`PlatformSendSync`](platform::PlatformSendSync)
//! bound, which is `Send + Sync` on native targets.

pub mod content;
pub mod database;
pub mod error;
pub mod http;
pub mod network;
pub mod platform;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use content::{
    ContentMetadata, ContentPayload, NetworkErrorKind, RemoteContentSource, SourceError,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use platform::{PlatformSend, PlatformSendSync};
pub use storage::{SettingsStore, SettingsTransaction};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
