//! Shared-secret authentication
//!
//! A single process-wide secret guards heartbeats and the relay. There is
//! no rotation and no per-device scoping.

use std::fmt;
use std::sync::Arc;

/// Header carrying the secret on HTTP requests
pub const API_KEY_HEADER: &str = "x-api-key";

/// The process-wide shared secret
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    /// Wrap a secret
    pub fn new(secret: impl AsRef<str>) -> Self {
        Self(Arc::from(secret.as_ref()))
    }

    /// Check a caller-provided key; absent keys never match
    pub fn verify(&self, provided: Option<&str>) -> bool {
        match provided {
            Some(key) => constant_time_eq(key, &self.0),
            None => false,
        }
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}
