//! # Design
//!
//! - Centralize application-level errors for bootstrap.
//! - Keep error messages constant while carrying context fields for debugging.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The settings document could not be read.
    #[error("failed to read settings file")]
    SettingsRead {
        /// Settings file path.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: sluice_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: sluice_telemetry::TelemetryError,
    },
    /// Session operations failed.
    #[error("session operation failed")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Source session error.
        source: sluice_session::SessionError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("failed to listen for shutdown signal")]
    Signal {
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: sluice_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: sluice_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn session(
        operation: &'static str,
        source: sluice_session::SessionError,
    ) -> Self {
        Self::Session { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn session_errors_keep_their_source() {
        let err = AppError::session("session.start", sluice_session::SessionError::Closed);
        assert_eq!(err.to_string(), "session operation failed");
        assert!(err.source().is_some());
    }
}
