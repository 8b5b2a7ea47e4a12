//! Error types for the weak identity cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the weak identity cache
///
/// Cache misses are never errors; lookups report absence through `Option`.
#[derive(Error, Debug)]
pub enum Error {
    /// Identity cannot be turned into an unambiguous cache key
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A live value exists under the key but has a different concrete type
    #[error("Cached value under {key} does not hold type {expected}")]
    KindMismatch { key: String, expected: &'static str },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Logging setup failed
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}
