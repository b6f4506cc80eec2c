//! Error types for configuration operations.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Stored value had a different type than the key expects.
    #[error("setting has unexpected type")]
    TypeMismatch {
        /// Key that was read.
        key: String,
        /// Type the key expects.
        expected: &'static str,
    },
    /// JSON seed document could not be parsed.
    #[error("invalid settings document")]
    InvalidDocument {
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// JSON seed document was not an object of key/value pairs.
    #[error("settings document must be an object")]
    NotAnObject,
    /// JSON value could not be mapped onto a setting value.
    #[error("unsupported settings value")]
    UnsupportedValue {
        /// Key holding the unsupported value.
        key: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
