//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding relay frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not valid JSON, or a field has the wrong shape
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Frame type outside the relay taxonomy
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(String),
}
