//! Error types shared across Anchor crates

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Discovery transport errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Socket failure
    #[error("Discovery socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram could not be encoded
    #[error("Discovery encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Group address could not be parsed
    #[error("Invalid discovery group: {0}")]
    InvalidGroup(String),
}
