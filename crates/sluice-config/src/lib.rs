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

//! Settings store and typed session configuration.
//!
//! Layout: `store.rs` (`SettingValue`, `SettingsStore`, `MemorySettingsStore`),
//! `keys.rs` (named keys), `model.rs` (`SessionSettings` and its enums),
//! `persisted.rs` (categories, tags and totals written by the session).

pub mod error;
pub mod keys;
pub mod model;
pub mod persisted;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    DEFAULT_PORT, DEFAULT_SAVE_PATH, EncryptionMode, MAX_RATIO, MAX_SEEDING_MINUTES,
    MaxRatioAction, ProxyKind, ProxySettings, SessionSettings, count_limit, rate_limit,
};
pub use persisted::{
    AllTimeTotals, load_all_time_totals, load_categories, load_tags, store_all_time_totals,
    store_categories, store_tags,
};
pub use store::{MemorySettingsStore, SettingValue, SettingsStore};
