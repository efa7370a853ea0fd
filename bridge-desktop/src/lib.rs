//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `SettingsStore` using an SQLite-backed key-value table
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_data_dir, DesktopNetworkMonitor, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = default_data_dir()?;
//!     let settings = SqliteSettingsStore::new(dir.join("settings.db")).await?;
//!     let network = DesktopNetworkMonitor::new();
//!     // Hand both to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod http;
mod network;
mod paths;
mod settings;

pub use http::ReqwestHttpClient;
pub use network::{DesktopNetworkMonitor, ProbeConfig};
pub use paths::default_data_dir;
pub use settings::SqliteSettingsStore;
