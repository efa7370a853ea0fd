//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature, which maps onto `core-service` and
//! the desktop bridge implementations. Host applications can depend on
//! `tutor-workspace` instead of wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service;
