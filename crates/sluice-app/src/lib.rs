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
    rustdoc::bare_urls,
    missing_docs
)]

//! Sluice application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (environment loading and startup), `error.rs`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level errors.
pub mod error;

pub use bootstrap::{BootstrapDependencies, run_app, run_app_with};
pub use error::{AppError, AppResult};
