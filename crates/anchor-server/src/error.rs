//! Error types for the core

use thiserror::Error;

/// Missing or incorrect shared secret
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Missing or incorrect shared secret")]
pub struct AuthError;

/// Registry rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Event carries no device id
    #[error("Missing ID")]
    MissingId,
}
