use bridge_traits::error::{BridgeError, Result};
use std::path::PathBuf;

const APP_DIR: &str = "tutor-core";

/// Per-user data directory for the content database and settings.
///
/// Resolves to the platform data directory (for example
/// `~/.local/share/tutor-core` on Linux).
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|base| base.join(APP_DIR))
        .ok_or_else(|| BridgeError::NotAvailable("No user data directory on this host".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_dir_is_app_scoped() {
        if let Ok(dir) = default_data_dir() {
            assert!(dir.ends_with(APP_DIR));
        }
    }
}
