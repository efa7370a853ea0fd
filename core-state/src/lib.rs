//! # Application State
//!
//! The process-wide state container: current selection, connectivity,
//! user settings and session flags. Settings and the selection survive
//! restarts through a [`bridge_traits::storage::SettingsStore`].

pub mod container;
pub mod error;
pub mod settings;

pub use container::{AppState, StateContainer, SELECTION_KEY, SETTINGS_PREFIX};
pub use error::{Result, StateError};
pub use settings::{SettingChange, Settings, Theme, FONT_SIZE, FONT_SIZE_RANGE, LANGUAGE_FOCUS, THEME};
