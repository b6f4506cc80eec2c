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

//! BitTorrent session manager.
//!
//! A [`Session`] handle forwards requests to a single control task that owns
//! the torrent registry, the category/tag taxonomy and the status snapshot.
//! The task drains engine alerts, enforces queueing and share limits on
//! timers and hands fast-resume payloads to a background writer.
//!
//! Layout: `session.rs` (public handle), `worker/` (control task),
//! `registry.rs`, `taxonomy.rs`, `policy.rs` (queue planning and share
//! limits), `adapter.rs` (settings to engine configuration), `stats.rs`,
//! `resume.rs` (on-disk store and writer), `export.rs` (`.torrent` copies),
//! `stub.rs` (in-memory engine).

mod adapter;
mod command;
mod error;
mod export;
mod policy;
mod registry;
mod resume;
mod session;
mod stats;
/// In-memory engine for tests and local tooling.
pub mod stub;
mod taxonomy;
mod worker;

pub use error::{ResumeStoreError, SessionError, SessionResult};
pub use registry::{TorrentFault, TorrentView, TrackerStatus};
pub use session::{Session, SessionActivity, SessionConfig};
pub use stats::{NetworkCounters, REQUIRED_METRICS};
pub use stub::{StubCall, StubEngine};
pub use taxonomy::{expand_category, is_valid_category_name, is_valid_tag};
