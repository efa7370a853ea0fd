//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the engine crates:
//! - Logging and tracing bootstrap
//! - Configuration (`CoreConfig` builder, freshness and fetch policies)
//! - Event bus
//!
//! Everything above this crate reports through [`events::EventBus`] and
//! reads its tunables from [`config::CoreConfig`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
