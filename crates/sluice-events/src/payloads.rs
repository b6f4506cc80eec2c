//! Event payload types carried across the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::InfoHash;

/// Identifier assigned to each event emitted by the session.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Lifecycle state of a torrent as tracked by the session registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Fast-resume data is being validated after admission.
    CheckingResumeData,
    /// Payload is being transferred from peers.
    Downloading,
    /// Magnet admission waiting for the info dictionary.
    DownloadingMetadata,
    /// Storage is being preallocated.
    Allocating,
    /// Waiting for a free download slot.
    QueuedDownloading,
    /// Waiting for a free upload slot.
    QueuedUploading,
    /// Hash check of an incomplete torrent.
    CheckingDownloading,
    /// Hash check of a complete torrent.
    CheckingUploading,
    /// Downloading without any transfer.
    StalledDownloading,
    /// Seeding without any transfer.
    StalledUploading,
    /// Storage relocation in progress.
    Moving,
    /// Engine reported an I/O or torrent error.
    Error,
    /// Files expected on disk could not be found.
    MissingFiles,
    /// Paused by the user (or a share limit) before completion.
    PausedDownloading,
    /// Paused by the user (or a share limit) after completion.
    PausedUploading,
    /// Seeding with active transfer.
    Uploading,
    /// Downloading regardless of queue limits.
    ForcedDownloading,
    /// Seeding regardless of queue limits.
    ForcedUploading,
}

impl TorrentState {
    /// Whether the torrent is paused by request.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        matches!(self, Self::PausedDownloading | Self::PausedUploading)
    }

    /// Whether the torrent is waiting for a queue slot.
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(self, Self::QueuedDownloading | Self::QueuedUploading)
    }

    /// Whether the torrent is hash checking.
    #[must_use]
    pub const fn is_checking(self) -> bool {
        matches!(
            self,
            Self::CheckingDownloading | Self::CheckingUploading | Self::CheckingResumeData
        )
    }

    /// Whether the torrent is in an error state.
    #[must_use]
    pub const fn is_errored(self) -> bool {
        matches!(self, Self::Error | Self::MissingFiles)
    }

    /// Whether the torrent still needs payload data.
    #[must_use]
    pub const fn is_downloading(self) -> bool {
        matches!(
            self,
            Self::Downloading
                | Self::DownloadingMetadata
                | Self::StalledDownloading
                | Self::CheckingDownloading
                | Self::PausedDownloading
                | Self::QueuedDownloading
                | Self::ForcedDownloading
        )
    }

    /// Whether the torrent holds the full payload.
    #[must_use]
    pub const fn is_uploading(self) -> bool {
        matches!(
            self,
            Self::Uploading
                | Self::StalledUploading
                | Self::CheckingUploading
                | Self::QueuedUploading
                | Self::ForcedUploading
        )
    }

    /// Whether the torrent has finished downloading, paused or not.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        self.is_uploading() || matches!(self, Self::PausedUploading)
    }

    /// Whether the torrent is currently moving data.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Downloading
                | Self::DownloadingMetadata
                | Self::Uploading
                | Self::ForcedDownloading
                | Self::ForcedUploading
                | Self::Moving
        )
    }
}

/// Typed notifications surfaced to presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A torrent record was created after the engine acknowledged the add.
    TorrentAdded {
        /// Identity of the new torrent.
        info_hash: InfoHash,
        /// Display name at admission time.
        name: String,
        /// Whether the torrent was restored from resume data.
        from_resume: bool,
    },
    /// The engine rejected an add request.
    AddTorrentFailed {
        /// Identity of the rejected torrent.
        info_hash: InfoHash,
        /// Engine-provided reason.
        reason: String,
    },
    /// Fetching a torrent from a URL failed.
    UrlDownloadFailed {
        /// Source URL.
        url: String,
        /// Failure detail.
        reason: String,
    },
    /// A torrent record was removed from the registry.
    TorrentRemoved {
        /// Identity of the removed torrent.
        info_hash: InfoHash,
        /// Display name at removal time.
        name: String,
    },
    /// A torrent was paused by request or by a share limit.
    TorrentPaused {
        /// Paused torrent.
        info_hash: InfoHash,
    },
    /// A torrent was resumed by request.
    TorrentResumed {
        /// Resumed torrent.
        info_hash: InfoHash,
    },
    /// A torrent finished downloading its payload.
    TorrentFinished {
        /// Finished torrent.
        info_hash: InfoHash,
    },
    /// A hash check completed.
    TorrentFinishedChecking {
        /// Checked torrent.
        info_hash: InfoHash,
    },
    /// Metadata for a registered magnet torrent arrived.
    TorrentMetadataLoaded {
        /// Torrent whose metadata arrived.
        info_hash: InfoHash,
    },
    /// A metadata-only fetch completed.
    MetadataLoaded {
        /// Identity of the fetched torrent.
        info_hash: InfoHash,
        /// Name from the info dictionary.
        name: String,
        /// Total payload size.
        total_size: u64,
        /// Raw info dictionary as delivered by the engine.
        metadata: Vec<u8>,
    },
    /// Bulk state update processed for the listed torrents.
    TorrentsUpdated {
        /// Torrents whose status changed.
        info_hashes: Vec<InfoHash>,
    },
    /// Torrent category changed.
    TorrentCategoryChanged {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Previous category (empty when uncategorized).
        old_category: String,
        /// New category (empty when uncategorized).
        new_category: String,
    },
    /// Torrent save path changed.
    TorrentSavePathChanged {
        /// Affected torrent.
        info_hash: InfoHash,
        /// New save path.
        save_path: String,
    },
    /// Torrent switched between automatic and manual management.
    TorrentSavingModeChanged {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Whether automatic management is now enabled.
        auto_managed: bool,
    },
    /// Tag attached to a torrent.
    TorrentTagAdded {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Attached tag.
        tag: String,
    },
    /// Tag detached from a torrent.
    TorrentTagRemoved {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Detached tag.
        tag: String,
    },
    /// Tracker announce succeeded.
    TrackerSuccess {
        /// Announcing torrent.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
    },
    /// Tracker replied with a warning.
    TrackerWarning {
        /// Announcing torrent.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
        /// Warning text.
        message: String,
    },
    /// Tracker announce failed.
    TrackerError {
        /// Announcing torrent.
        info_hash: InfoHash,
        /// Tracker URL.
        tracker: String,
        /// Error text.
        message: String,
    },
    /// Trackers were added to a torrent.
    TrackersAdded {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Added announce URLs.
        trackers: Vec<String>,
    },
    /// Trackers were removed from a torrent.
    TrackersRemoved {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Removed announce URLs.
        trackers: Vec<String>,
    },
    /// A tracker URL was edited in place.
    TrackersChanged {
        /// Affected torrent.
        info_hash: InfoHash,
    },
    /// A torrent gained its first tracker or lost its last one.
    TrackerlessStateChanged {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Whether the torrent now has no trackers.
        trackerless: bool,
    },
    /// Web seeds were added to a torrent.
    UrlSeedsAdded {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Added seed URLs.
        urls: Vec<String>,
    },
    /// Web seeds were removed from a torrent.
    UrlSeedsRemoved {
        /// Affected torrent.
        info_hash: InfoHash,
        /// Removed seed URLs.
        urls: Vec<String>,
    },
    /// Queue order changed; lists the new order of queued torrents.
    QueueChanged {
        /// Queue from position 1 upwards.
        order: Vec<InfoHash>,
    },
    /// Engine reported a file error for a torrent.
    FileError {
        /// Affected torrent.
        info_hash: InfoHash,
        /// File path reported by the engine.
        path: String,
        /// Error detail.
        message: String,
    },
    /// Category created.
    CategoryAdded {
        /// Category name.
        name: String,
    },
    /// Category deleted.
    CategoryRemoved {
        /// Category name.
        name: String,
    },
    /// Tag created.
    TagAdded {
        /// Tag name.
        tag: String,
    },
    /// Tag deleted.
    TagRemoved {
        /// Tag name.
        tag: String,
    },
    /// External IP filter rules were parsed.
    IpFilterParsed {
        /// Whether parsing failed.
        error: bool,
        /// Number of rules loaded.
        rule_count: usize,
    },
    /// Status snapshot was refreshed.
    StatsUpdated,
    /// The last unfinished torrent completed.
    AllTorrentsFinished,
    /// Listening state changed.
    ListenStateChanged {
        /// Whether at least one socket is listening.
        listening: bool,
        /// Endpoint involved in the change.
        endpoint: String,
    },
    /// Configuration was re-applied to the engine.
    SettingsChanged {
        /// Description of the applied configuration change.
        description: String,
    },
    /// Component health changed.
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for subscribers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TorrentAdded { .. } => "torrent_added",
            Self::AddTorrentFailed { .. } => "add_torrent_failed",
            Self::UrlDownloadFailed { .. } => "url_download_failed",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::TorrentPaused { .. } => "torrent_paused",
            Self::TorrentResumed { .. } => "torrent_resumed",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentFinishedChecking { .. } => "torrent_finished_checking",
            Self::TorrentMetadataLoaded { .. } => "torrent_metadata_loaded",
            Self::MetadataLoaded { .. } => "metadata_loaded",
            Self::TorrentsUpdated { .. } => "torrents_updated",
            Self::TorrentCategoryChanged { .. } => "torrent_category_changed",
            Self::TorrentSavePathChanged { .. } => "torrent_save_path_changed",
            Self::TorrentSavingModeChanged { .. } => "torrent_saving_mode_changed",
            Self::TorrentTagAdded { .. } => "torrent_tag_added",
            Self::TorrentTagRemoved { .. } => "torrent_tag_removed",
            Self::TrackerSuccess { .. } => "tracker_success",
            Self::TrackerWarning { .. } => "tracker_warning",
            Self::TrackerError { .. } => "tracker_error",
            Self::TrackersAdded { .. } => "trackers_added",
            Self::TrackersRemoved { .. } => "trackers_removed",
            Self::TrackersChanged { .. } => "trackers_changed",
            Self::TrackerlessStateChanged { .. } => "trackerless_state_changed",
            Self::UrlSeedsAdded { .. } => "url_seeds_added",
            Self::UrlSeedsRemoved { .. } => "url_seeds_removed",
            Self::QueueChanged { .. } => "queue_changed",
            Self::FileError { .. } => "file_error",
            Self::CategoryAdded { .. } => "category_added",
            Self::CategoryRemoved { .. } => "category_removed",
            Self::TagAdded { .. } => "tag_added",
            Self::TagRemoved { .. } => "tag_removed",
            Self::IpFilterParsed { .. } => "ip_filter_parsed",
            Self::StatsUpdated => "stats_updated",
            Self::AllTorrentsFinished => "all_torrents_finished",
            Self::ListenStateChanged { .. } => "listen_state_changed",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Torrent the event refers to, when it is torrent-scoped.
    #[must_use]
    pub const fn info_hash(&self) -> Option<InfoHash> {
        match self {
            Self::TorrentAdded { info_hash, .. }
            | Self::AddTorrentFailed { info_hash, .. }
            | Self::TorrentRemoved { info_hash, .. }
            | Self::TorrentPaused { info_hash }
            | Self::TorrentResumed { info_hash }
            | Self::TorrentFinished { info_hash }
            | Self::TorrentFinishedChecking { info_hash }
            | Self::TorrentMetadataLoaded { info_hash }
            | Self::MetadataLoaded { info_hash, .. }
            | Self::TorrentCategoryChanged { info_hash, .. }
            | Self::TorrentSavePathChanged { info_hash, .. }
            | Self::TorrentSavingModeChanged { info_hash, .. }
            | Self::TorrentTagAdded { info_hash, .. }
            | Self::TorrentTagRemoved { info_hash, .. }
            | Self::TrackerSuccess { info_hash, .. }
            | Self::TrackerWarning { info_hash, .. }
            | Self::TrackerError { info_hash, .. }
            | Self::TrackersAdded { info_hash, .. }
            | Self::TrackersRemoved { info_hash, .. }
            | Self::TrackersChanged { info_hash }
            | Self::TrackerlessStateChanged { info_hash, .. }
            | Self::UrlSeedsAdded { info_hash, .. }
            | Self::UrlSeedsRemoved { info_hash, .. }
            | Self::FileError { info_hash, .. } => Some(*info_hash),
            _ => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_groups_are_consistent() {
        assert!(TorrentState::PausedUploading.is_paused());
        assert!(TorrentState::PausedUploading.is_completed());
        assert!(!TorrentState::PausedUploading.is_uploading());
        assert!(TorrentState::QueuedDownloading.is_queued());
        assert!(TorrentState::QueuedDownloading.is_downloading());
        assert!(TorrentState::CheckingResumeData.is_checking());
        assert!(TorrentState::MissingFiles.is_errored());
        assert!(TorrentState::ForcedUploading.is_active());
        assert!(!TorrentState::StalledUploading.is_active());
    }

    #[test]
    fn kind_and_hash_accessors() {
        let hash = InfoHash::new([7; 20]);
        let event = Event::TorrentPaused { info_hash: hash };
        assert_eq!(event.kind(), "torrent_paused");
        assert_eq!(event.info_hash(), Some(hash));
        assert_eq!(Event::StatsUpdated.kind(), "stats_updated");
        assert_eq!(Event::StatsUpdated.info_hash(), None);

        let seeds = Event::UrlSeedsRemoved {
            info_hash: hash,
            urls: vec!["https://mirror.example/iso/".into()],
        };
        assert_eq!(seeds.kind(), "url_seeds_removed");
        assert_eq!(seeds.info_hash(), Some(hash));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::CategoryAdded {
            name: "Movies".into(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "category_added");
        assert_eq!(json["name"], "Movies");
    }
}
