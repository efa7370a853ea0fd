//! # Reactive Cache
//!
//! In-memory, stale-while-revalidate cache in front of a [`Loader`].
//!
//! ```rust,ignore
//! let cache = ReactiveCache::builder(loader)
//!     .policy(CachePolicy::new(256))
//!     .clock(clock)
//!     .build()?;
//!
//! let lookup = cache.get_or_fetch("content/rust-intro").await?;
//! let mut updates = cache.subscribe("content/rust-intro");
//! while let Some(snapshot) = updates.next().await {
//!     // Loading -> Ready, Stale -> Ready after a revalidation, ...
//! }
//! ```

pub mod cache;
pub mod error;
pub mod loader;
pub mod policy;
pub mod subscription;

pub use cache::{
    CacheBuilder, CacheFailure, CacheStats, CacheValue, EntryState, Lookup, Origin, ReactiveCache,
};
pub use error::{CacheError, Result};
pub use loader::{Loaded, Loader};
pub use policy::CachePolicy;
pub use subscription::{Snapshot, SnapshotStatus, Subscription};
