//! Alerts drained from the transfer engine.
//!
//! # Design
//! - Closed enum so the dispatcher matches exhaustively; alert kinds the
//!   adapter does not understand arrive as [`EngineAlert::Unrecognized`].
//! - Payloads carry only what the session consumes.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use sluice_events::InfoHash;

use crate::model::EngineTorrentStatus;

/// Kind of file error raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    /// A payload file disappeared.
    NotFound,
    /// Any other I/O failure.
    Other,
}

/// Port mapping protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortMapProtocol {
    /// UPnP IGD.
    Upnp,
    /// NAT-PMP.
    NatPmp,
}

/// Why a peer connection was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Matched the IP filter.
    IpFilter,
    /// Blocked by port filter.
    PortFilter,
    /// Blocked by the I2P mixed-mode policy.
    I2pMixed,
    /// Privileged port.
    PrivilegedPort,
    /// uTP disabled.
    UtpDisabled,
    /// TCP disabled.
    TcpDisabled,
    /// Invalid local interface.
    InvalidLocalInterface,
}

/// Entry in the engine's session statistics schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Dotted metric name such as `net.recv_bytes`.
    pub name: String,
    /// Slot in [`EngineAlert::SessionStats`] values.
    pub index: usize,
}

/// Asynchronous notification from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum EngineAlert {
    /// Outcome of an add request.
    AddResult {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Failure reason; `None` on success.
        error: Option<String>,
    },
    /// Batch of changed torrent statuses.
    StateUpdate {
        /// Latest statuses.
        statuses: Vec<EngineTorrentStatus>,
    },
    /// Metadata arrived for a magnet torrent.
    MetadataReceived {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Name from the info dictionary.
        name: String,
        /// Payload size.
        total_size: u64,
        /// Bencoded info dictionary.
        metadata: Vec<u8>,
    },
    /// Torrent stopped.
    TorrentPaused {
        /// Torrent identity.
        info_hash: InfoHash,
    },
    /// Every wanted piece was downloaded.
    TorrentFinished {
        /// Torrent identity.
        info_hash: InfoHash,
    },
    /// Hash check completed.
    TorrentChecked {
        /// Torrent identity.
        info_hash: InfoHash,
    },
    /// Reading or writing payload failed.
    FileError {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Affected file.
        path: String,
        /// Failure kind.
        kind: FileErrorKind,
        /// Engine message.
        message: String,
    },
    /// Torrent handle was destroyed.
    TorrentRemoved {
        /// Torrent identity.
        info_hash: InfoHash,
    },
    /// Payload files were deleted.
    TorrentDeleted {
        /// Torrent identity.
        info_hash: InfoHash,
    },
    /// Payload files could not be deleted.
    TorrentDeleteFailed {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Engine message.
        message: String,
    },
    /// Storage relocation finished.
    StorageMoved {
        /// Torrent identity.
        info_hash: InfoHash,
        /// New save path.
        path: String,
    },
    /// Storage relocation failed.
    StorageMoveFailed {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Engine message.
        message: String,
    },
    /// Fast-resume payload generated.
    ResumeDataReady {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Serialized fast-resume state.
        payload: Vec<u8>,
    },
    /// Fast-resume payload could not be generated.
    ResumeDataFailed {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Engine message.
        message: String,
    },
    /// Tracker announce succeeded.
    TrackerReply {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
        /// Peers returned.
        num_peers: u32,
    },
    /// Tracker returned a warning.
    TrackerWarning {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
        /// Warning text.
        message: String,
    },
    /// Tracker announce failed.
    TrackerError {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
        /// Failure text.
        message: String,
    },
    /// Web seed failed.
    UrlSeedError {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Web seed URL.
        url: String,
        /// Failure text.
        message: String,
    },
    /// Port mapping succeeded.
    Portmap {
        /// Mapping protocol.
        protocol: PortMapProtocol,
        /// External port.
        external_port: u16,
    },
    /// Port mapping failed.
    PortmapError {
        /// Mapping protocol.
        protocol: PortMapProtocol,
        /// Failure text.
        message: String,
    },
    /// Connection to a peer was refused.
    PeerBlocked {
        /// Peer address.
        ip: IpAddr,
        /// Block reason.
        reason: BlockReason,
    },
    /// Peer was banned for sending corrupt data.
    PeerBanned {
        /// Peer address.
        ip: IpAddr,
    },
    /// External address reported by a peer or router.
    ExternalIp {
        /// External address.
        ip: IpAddr,
    },
    /// Listening socket opened.
    ListenSucceeded {
        /// Bound endpoint.
        endpoint: SocketAddr,
    },
    /// Listening socket failed.
    ListenFailed {
        /// Requested endpoint.
        endpoint: String,
        /// Failure text.
        message: String,
    },
    /// Session counters sampled after `post_session_stats`.
    SessionStats {
        /// Values laid out by the metric schema.
        values: Vec<i64>,
    },
    /// Alert type the adapter does not translate.
    Unrecognized {
        /// Engine-specific alert name.
        kind: String,
    },
}

impl EngineAlert {
    /// Stable label used for logging and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddResult { .. } => "add_result",
            Self::StateUpdate { .. } => "state_update",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::TorrentPaused { .. } => "torrent_paused",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentChecked { .. } => "torrent_checked",
            Self::FileError { .. } => "file_error",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::TorrentDeleted { .. } => "torrent_deleted",
            Self::TorrentDeleteFailed { .. } => "torrent_delete_failed",
            Self::StorageMoved { .. } => "storage_moved",
            Self::StorageMoveFailed { .. } => "storage_move_failed",
            Self::ResumeDataReady { .. } => "resume_data_ready",
            Self::ResumeDataFailed { .. } => "resume_data_failed",
            Self::TrackerReply { .. } => "tracker_reply",
            Self::TrackerWarning { .. } => "tracker_warning",
            Self::TrackerError { .. } => "tracker_error",
            Self::UrlSeedError { .. } => "url_seed_error",
            Self::Portmap { .. } => "portmap",
            Self::PortmapError { .. } => "portmap_error",
            Self::PeerBlocked { .. } => "peer_blocked",
            Self::PeerBanned { .. } => "peer_banned",
            Self::ExternalIp { .. } => "external_ip",
            Self::ListenSucceeded { .. } => "listen_succeeded",
            Self::ListenFailed { .. } => "listen_failed",
            Self::SessionStats { .. } => "session_stats",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_events::INFO_HASH_LEN;

    #[test]
    fn alerts_serialize_with_alert_tag() -> Result<(), serde_json::Error> {
        let alert = EngineAlert::TorrentPaused {
            info_hash: InfoHash::new([7; INFO_HASH_LEN]),
        };
        let json = serde_json::to_value(&alert)?;
        assert_eq!(json["alert"], alert.kind());
        let back: EngineAlert = serde_json::from_value(json)?;
        assert_eq!(back, alert);
        Ok(())
    }

    #[test]
    fn variants_with_kind_fields_keep_them() -> Result<(), serde_json::Error> {
        let file_error = EngineAlert::FileError {
            info_hash: InfoHash::new([8; INFO_HASH_LEN]),
            path: "/data/a.bin".to_string(),
            kind: FileErrorKind::NotFound,
            message: "gone".to_string(),
        };
        let json = serde_json::to_value(&file_error)?;
        assert_eq!(json["alert"], "file_error");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(serde_json::from_value::<EngineAlert>(json)?, file_error);

        let unknown = EngineAlert::Unrecognized {
            kind: "dht_bootstrap".to_string(),
        };
        let json = serde_json::to_value(&unknown)?;
        assert_eq!(json["alert"], "unrecognized");
        assert_eq!(json["kind"], "dht_bootstrap");
        assert_eq!(serde_json::from_value::<EngineAlert>(json)?, unknown);
        Ok(())
    }
}
