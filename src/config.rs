//! Where to find the native library

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the native library path
pub const LIBRARY_ENV: &str = "FG_BRIDGE_LIBRARY";

/// Base name of the native library when no path is configured
pub const DEFAULT_LIBRARY_NAME: &str = "fgbridge_native";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub library_path: PathBuf,
}

impl BridgeConfig {
    /// Read the configuration from the process environment
    ///
    /// Without `FG_BRIDGE_LIBRARY`, the platform file name of
    /// `fgbridge_native` is used and resolved by the system loader.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let library_path = lookup(LIBRARY_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(libloading::library_filename(DEFAULT_LIBRARY_NAME)));
        Self { library_path }
    }

    pub fn with_library_path(mut self, path: impl AsRef<Path>) -> Self {
        self.library_path = path.as_ref().to_path_buf();
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
