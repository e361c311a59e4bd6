//! Configuration for the framechain host
//!
//! The engine reads a single TOML file. Lookup order:
//!
//! 1. An explicit path (the `--config` flag)
//! 2. The `FRAMECHAIN_CONFIG` environment variable
//! 3. `<config dir>/framechain/config.toml`
//!
//! where the config dir is platform-specific:
//! - **Linux**: `~/.config/`
//! - **macOS**: `~/Library/Application Support/`
//! - **Windows**: `%APPDATA%\`
//!
//! A missing file yields the defaults. A file that exists but does not
//! parse is an error.
//!
//! # Example
//!
//! ```ignore
//! use framechain::config::EngineConfig;
//!
//! let config = EngineConfig::load_or_default(None)?;
//! println!("poll interval: {:?}", config.dispatch.max_poll_interval());
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{FrameChainError, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Application identifier for the config directory
pub const APP_ID: &str = "framechain";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "FRAMECHAIN_CONFIG";

/// Platform config directory for framechain
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Path the engine should read, honouring the override order.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => default_config_path(),
    }
}

impl EngineConfig {
    /// Load a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(FrameChainError::from)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Load from the resolved path, falling back to defaults if no file exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            Some(path) if explicit.is_some() => Err(FrameChainError::Config(format!(
                "Config file {} does not exist",
                path.display()
            ))),
            _ => Ok(Self::default()),
        }
    }

    /// Write the config, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FrameChainError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .map_err(|e| FrameChainError::Config(format!("Failed to write config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_explicit_path_wins() {
        let path = Path::new("/tmp/explicit.toml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "[dispatch]\nmax_poll_interval_ms = 7\n").unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let resolved = resolve_config_path(None);
        let config = EngineConfig::load_or_default(None);
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(resolved, Some(path));
        assert_eq!(config.unwrap().dispatch.max_poll_interval_ms, 7);
    }

    #[test]
    #[serial]
    fn test_missing_env_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_ENV, dir.path().join("absent.toml"));
        let config = EngineConfig::load_or_default(None);
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(config.unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(EngineConfig::load_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[dispatch\nmax_poll_interval_ms = ").unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = EngineConfig::default();
        config.events.channel_capacity = 64;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
