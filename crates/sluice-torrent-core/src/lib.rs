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

//! Engine-agnostic torrent domain types and the transfer engine boundary.
//!
//! Layout: `model/` (descriptors, add parameters, engine status, status
//! snapshot, engine settings), `alert.rs` (engine alerts), `service/`
//! (`TransferEngine`).

pub mod alert;
pub mod model;
pub mod service;

pub use alert::{BlockReason, EngineAlert, FileErrorKind, MetricDescriptor, PortMapProtocol};
pub use model::{
    AddSource, AddTorrentParams, CacheStatus, DescriptorKind, EncryptionPolicy, EngineAddRequest,
    EnginePhase, EngineProxy, EngineSettings, EngineTorrentStatus, IpRange, ListenConfig,
    PeerClassConfig, ProxyProtocol, QueueMove, SessionStatus, ShareLimit, StatusSnapshot,
    TorrentDescriptor, TorrentStatusReport, TrackerEntry,
};
pub use service::TransferEngine;
