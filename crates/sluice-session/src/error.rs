//! Error types surfaced by the session.

use std::error::Error;
use std::path::PathBuf;

use sluice_events::InfoHash;
use thiserror::Error;

/// Primary error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A torrent with this hash is registered, pending or fetching metadata.
    #[error("torrent already exists")]
    AlreadyExists {
        /// Conflicting torrent.
        info_hash: InfoHash,
    },
    /// The URL is already being downloaded.
    #[error("torrent url already pending")]
    UrlPending {
        /// Conflicting URL.
        url: String,
    },
    /// No download is pending for the URL.
    #[error("torrent url not pending")]
    UnknownUrl {
        /// Requested URL.
        url: String,
    },
    /// No torrent with this hash is registered.
    #[error("torrent not found")]
    NotFound {
        /// Requested torrent.
        info_hash: InfoHash,
    },
    /// Metadata can only be fetched for magnet descriptors.
    #[error("descriptor is not a magnet link")]
    NotMagnet {
        /// Offending torrent.
        info_hash: InfoHash,
    },
    /// Category name failed validation.
    #[error("invalid category name")]
    InvalidCategoryName {
        /// Rejected name.
        name: String,
    },
    /// Category already exists.
    #[error("category already exists")]
    CategoryExists {
        /// Existing name.
        name: String,
    },
    /// Category does not exist.
    #[error("category not found")]
    CategoryNotFound {
        /// Requested name.
        name: String,
    },
    /// Tag failed validation.
    #[error("invalid tag")]
    InvalidTag {
        /// Rejected tag.
        tag: String,
    },
    /// Tag already exists.
    #[error("tag already exists")]
    TagExists {
        /// Existing tag.
        tag: String,
    },
    /// Tag does not exist.
    #[error("tag not found")]
    TagNotFound {
        /// Requested tag.
        tag: String,
    },
    /// Save path was empty.
    #[error("invalid save path")]
    InvalidSavePath {
        /// Rejected path.
        path: String,
    },
    /// Tracker or web seed URL was empty or contained whitespace.
    #[error("invalid url")]
    InvalidUrl {
        /// Rejected URL.
        url: String,
    },
    /// The torrent has no tracker with this URL.
    #[error("tracker not found")]
    TrackerNotFound {
        /// Requested URL.
        url: String,
    },
    /// The torrent already has a tracker with this URL.
    #[error("tracker already exists")]
    TrackerExists {
        /// Conflicting URL.
        url: String,
    },
    /// Address could not be parsed.
    #[error("invalid ip address")]
    InvalidIp {
        /// Rejected input.
        value: String,
    },
    /// The engine does not publish a counter the session depends on.
    #[error("engine metric missing from stats schema")]
    MissingMetric {
        /// Dotted metric name.
        name: &'static str,
    },
    /// Resume directory could not be used.
    #[error("resume store unavailable")]
    ResumeStore {
        /// Underlying failure.
        #[source]
        source: ResumeStoreError,
    },
    /// The engine rejected a request.
    #[error("engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The control task has stopped.
    #[error("session is shut down")]
    Closed,
}

impl SessionError {
    pub(crate) fn engine(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Engine {
            operation,
            source: source.into(),
        }
    }
}

/// Failures of the on-disk resume store.
#[derive(Debug, Error)]
pub enum ResumeStoreError {
    /// Another process holds the resume directory.
    #[error("resume directory is locked")]
    Locked {
        /// Lock file path.
        path: PathBuf,
    },
    /// Filesystem operation failed.
    #[error("resume store io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Metadata file could not be encoded or decoded.
    #[error("resume metadata is malformed")]
    Json {
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_source() {
        let err = SessionError::engine("pause", anyhow::anyhow!("handle gone"));
        assert_eq!(err.to_string(), "engine operation failed");
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("handle gone"));
    }
}
