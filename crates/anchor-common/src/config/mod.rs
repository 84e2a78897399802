//! Configuration management for Anchor

mod agent;
mod server;
pub mod serde_utils;

pub use agent::AgentConfig;
pub use server::CoreConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Shared secret used when nothing else is configured
pub const DEFAULT_SHARED_SECRET: &str = "anchor_secure_dev_key";

/// Environment variable that overrides the configured shared secret
pub const SHARED_SECRET_ENV: &str = "ANCHOR_SECRET_KEY";

/// Default multicast group for discovery datagrams
pub const DEFAULT_DISCOVERY_GROUP: &str = "239.255.42.99:53530";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anchor")
}

/// Get the default core configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("core.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration from `path`, falling back to defaults when the file is
/// absent or unreadable
pub fn load_or_default<T>(path: &Path) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match load_config(path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => {
            tracing::info!("No config at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load config from {:?}: {}", path, e);
            T::default()
        }
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
