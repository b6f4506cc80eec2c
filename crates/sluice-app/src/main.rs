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

//! Binary entrypoint that starts a session and runs it until interrupted.

use sluice_app::{AppResult, run_app};

/// Bootstraps the session and blocks until ctrl-c.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
