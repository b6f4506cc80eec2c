#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Telemetry primitives for the Sluice workspace.
//!
//! This crate centralises logging initialisation and the Prometheus metrics
//! registry so every component reports through the same subscriber and
//! collectors.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
pub use metrics::{Metrics, MetricsSnapshot, TORRENT_STATE_BUCKETS};
