//! Core torrent domain types shared between the session and engine adapters.

mod settings;
mod status;

pub use settings::{
    EncryptionPolicy, EngineProxy, EngineSettings, IpRange, ListenConfig, PeerClassConfig,
    ProxyProtocol,
};
pub use status::{
    CacheStatus, EnginePhase, EngineTorrentStatus, SessionStatus, StatusSnapshot,
    TorrentStatusReport,
};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sluice_events::InfoHash;

/// Payload carried by a torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DescriptorKind {
    /// Parsed `.torrent` metainfo.
    Metainfo {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
    },
    /// Magnet link; metadata arrives from peers.
    Magnet {
        /// Magnet URI.
        uri: String,
    },
}

/// Opaque output of torrent file or magnet parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentDescriptor {
    /// Content hash identifying the torrent.
    pub info_hash: InfoHash,
    /// Display name when known ahead of metadata.
    pub name: Option<String>,
    /// Metainfo or magnet payload.
    pub kind: DescriptorKind,
}

impl TorrentDescriptor {
    /// Descriptor backed by metainfo bytes.
    #[must_use]
    pub fn metainfo(info_hash: InfoHash, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            info_hash,
            name: Some(name.into()),
            kind: DescriptorKind::Metainfo { bytes },
        }
    }

    /// Descriptor backed by a magnet URI.
    #[must_use]
    pub fn magnet(info_hash: InfoHash, uri: impl Into<String>) -> Self {
        Self {
            info_hash,
            name: None,
            kind: DescriptorKind::Magnet { uri: uri.into() },
        }
    }

    /// Whether metadata still has to be fetched from peers.
    #[must_use]
    pub const fn is_magnet(&self) -> bool {
        matches!(self.kind, DescriptorKind::Magnet { .. })
    }

    /// Name to display, falling back to the hex hash.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.info_hash.to_hex())
    }
}

/// Where a new torrent comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddSource {
    /// Already parsed descriptor.
    Descriptor {
        /// The descriptor to add.
        descriptor: TorrentDescriptor,
    },
    /// Remote `.torrent` file that still has to be downloaded.
    Url {
        /// Source URL.
        url: String,
    },
}

impl From<TorrentDescriptor> for AddSource {
    fn from(descriptor: TorrentDescriptor) -> Self {
        Self::Descriptor { descriptor }
    }
}

/// Per-torrent override of a global share limit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ShareLimit<T> {
    /// Follow the session-wide limit.
    #[default]
    UseGlobal,
    /// Never stop this torrent.
    NoLimit,
    /// Stop at this value.
    Limit(T),
}

impl<T: Copy> ShareLimit<T> {
    /// Effective limit given the session-wide value (`None` = no limit).
    #[must_use]
    pub const fn resolve(self, global: Option<T>) -> Option<T> {
        match self {
            Self::UseGlobal => global,
            Self::NoLimit => None,
            Self::Limit(value) => Some(value),
        }
    }
}

/// Caller supplied knobs for a new torrent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddTorrentParams {
    /// Display name override.
    pub name: Option<String>,
    /// Existing category; empty means uncategorized.
    #[serde(default)]
    pub category: String,
    /// Existing tags to attach.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Explicit save path; ignored in automatic mode.
    pub save_path: Option<String>,
    /// Automatic torrent management; `None` follows the session default.
    pub auto_tmm: Option<bool>,
    /// Start paused; `None` follows the session default.
    pub paused: Option<bool>,
    /// Start force-started.
    #[serde(default)]
    pub force_start: bool,
    /// Ratio limit override.
    #[serde(default)]
    pub ratio_limit: ShareLimit<f64>,
    /// Seeding time limit override in minutes.
    #[serde(default)]
    pub seeding_time_limit: ShareLimit<i64>,
    /// Extra trackers for this torrent.
    #[serde(default)]
    pub trackers: Vec<String>,
    /// Web seeds for this torrent.
    #[serde(default)]
    pub url_seeds: Vec<String>,
    /// Fast-resume payload from a previous run.
    pub resume_data: Option<Vec<u8>>,
}

/// Announce URL and the tier it belongs to; lower tiers are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Announce URL.
    pub url: String,
    /// Tier index.
    #[serde(default)]
    pub tier: u32,
}

impl TrackerEntry {
    /// Tracker in the given tier.
    #[must_use]
    pub fn new(url: impl Into<String>, tier: u32) -> Self {
        Self {
            url: url.into(),
            tier,
        }
    }
}

/// Request handed to the engine when creating a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAddRequest {
    /// What to add.
    pub descriptor: TorrentDescriptor,
    /// Directory for payload data.
    pub save_path: String,
    /// Create the torrent paused.
    pub paused: bool,
    /// Trackers to append to the descriptor's own.
    pub trackers: Vec<TrackerEntry>,
    /// Web seeds to append to the descriptor's own.
    pub url_seeds: Vec<String>,
    /// Fast-resume payload.
    pub resume_data: Option<Vec<u8>>,
    /// Fetch metadata only; no payload is written.
    pub metadata_only: bool,
}

/// Queue reposition primitive mirrored to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMove {
    /// One step towards the front.
    Up,
    /// One step towards the back.
    Down,
    /// To the front.
    Top,
    /// To the back.
    Bottom,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_events::INFO_HASH_LEN;

    #[test]
    fn share_limit_resolution() {
        assert_eq!(ShareLimit::UseGlobal.resolve(Some(2.0)), Some(2.0));
        assert_eq!(ShareLimit::<f64>::UseGlobal.resolve(None), None);
        assert_eq!(ShareLimit::NoLimit.resolve(Some(2.0)), None);
        assert_eq!(ShareLimit::Limit(0.5).resolve(Some(2.0)), Some(0.5));
        assert_eq!(ShareLimit::Limit(30).resolve(None), Some(30));
    }

    #[test]
    fn display_name_falls_back_to_hash() {
        let hash = InfoHash::new([0xab; INFO_HASH_LEN]);
        let magnet = TorrentDescriptor::magnet(hash, "magnet:?xt=urn:btih:abab");
        assert!(magnet.is_magnet());
        assert_eq!(magnet.display_name(), "ab".repeat(INFO_HASH_LEN));

        let file = TorrentDescriptor::metainfo(hash, "debian.iso", vec![b'd', b'e']);
        assert!(!file.is_magnet());
        assert_eq!(file.display_name(), "debian.iso");
    }

    #[test]
    fn add_params_deserialize_with_defaults() -> Result<(), serde_json::Error> {
        let params: AddTorrentParams =
            serde_json::from_str(r#"{"category": "Movies", "ratio_limit": {"mode": "limit", "value": 1.5}}"#)?;
        assert_eq!(params.category, "Movies");
        assert_eq!(params.ratio_limit, ShareLimit::Limit(1.5));
        assert_eq!(params.seeding_time_limit, ShareLimit::UseGlobal);
        assert!(params.tags.is_empty());
        assert_eq!(params.auto_tmm, None);
        assert!(params.url_seeds.is_empty());
        Ok(())
    }

    #[test]
    fn tracker_tier_defaults_to_first() -> Result<(), serde_json::Error> {
        let entry: TrackerEntry = serde_json::from_str(r#"{"url": "udp://tracker.example:6969"}"#)?;
        assert_eq!(entry, TrackerEntry::new("udp://tracker.example:6969", 0));
        Ok(())
    }
}
