//! Error types for configuration operations.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key contained an invalid value.
    #[error("invalid value {value:?} for '{key}': {reason}")]
    InvalidField {
        /// Fully qualified config key.
        key: String,
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The selected remote has no URL and no explicit endpoint.
    #[error("remote '{remote}' has no URL configured")]
    MissingRemote {
        /// Remote name.
        remote: String,
    },
    /// A remote or endpoint URL could not be parsed.
    #[error("invalid URL {value:?}")]
    InvalidUrl {
        /// Offending URL text.
        value: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
