//! Engine-reported torrent status and the session status snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_events::InfoHash;

/// Coarse torrent phase as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    /// Validating fast-resume data.
    CheckingResumeData,
    /// Hash checking payload on disk.
    CheckingFiles,
    /// Fetching metadata from peers.
    DownloadingMetadata,
    /// Downloading payload.
    Downloading,
    /// All wanted pieces present, some unwanted missing.
    Finished,
    /// Complete payload present.
    Seeding,
    /// Preallocating storage.
    Allocating,
}

/// One torrent's status from a state update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTorrentStatus {
    /// Torrent identity.
    pub info_hash: InfoHash,
    /// Engine phase.
    pub phase: EnginePhase,
    /// Metadata is present.
    pub has_metadata: bool,
    /// Payload size.
    pub total_size: u64,
    /// Bytes of wanted pieces.
    pub total_wanted: u64,
    /// Bytes of wanted pieces already verified.
    pub total_wanted_done: u64,
    /// Bytes verified on disk.
    pub total_done: u64,
    /// Payload downloaded across all sessions.
    pub all_time_download: u64,
    /// Payload uploaded across all sessions.
    pub all_time_upload: u64,
    /// Payload download rate in bytes per second.
    pub download_rate: u64,
    /// Payload upload rate in bytes per second.
    pub upload_rate: u64,
    /// Connected peers.
    pub num_peers: u32,
    /// Connected seeds.
    pub num_seeds: u32,
    /// Time spent seeding across all sessions.
    pub seeding_time: Duration,
    /// Storage relocation in progress.
    pub moving_storage: bool,
}

impl EngineTorrentStatus {
    /// Fresh status for a torrent that has not reported yet.
    #[must_use]
    pub const fn pending(info_hash: InfoHash, has_metadata: bool) -> Self {
        Self {
            info_hash,
            phase: if has_metadata {
                EnginePhase::CheckingResumeData
            } else {
                EnginePhase::DownloadingMetadata
            },
            has_metadata,
            total_size: 0,
            total_wanted: 0,
            total_wanted_done: 0,
            total_done: 0,
            all_time_download: 0,
            all_time_upload: 0,
            download_rate: 0,
            upload_rate: 0,
            num_peers: 0,
            num_seeds: 0,
            seeding_time: Duration::ZERO,
            moving_storage: false,
        }
    }

    /// Every wanted byte is present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        match self.phase {
            EnginePhase::Finished | EnginePhase::Seeding => true,
            EnginePhase::CheckingResumeData | EnginePhase::CheckingFiles => {
                self.has_metadata
                    && self.total_wanted > 0
                    && self.total_wanted_done >= self.total_wanted
            }
            EnginePhase::DownloadingMetadata
            | EnginePhase::Downloading
            | EnginePhase::Allocating => false,
        }
    }

    /// Engine is hash checking.
    #[must_use]
    pub const fn is_checking(&self) -> bool {
        matches!(
            self.phase,
            EnginePhase::CheckingResumeData | EnginePhase::CheckingFiles
        )
    }

    /// Share ratio: uploaded over downloaded, capped at `max_ratio`.
    ///
    /// When nothing was downloaded the ratio is zero if nothing was uploaded
    /// either, otherwise `max_ratio`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self, max_ratio: f64) -> f64 {
        let downloaded = self.all_time_download.max(self.total_done);
        let uploaded = self.all_time_upload;
        if downloaded == 0 {
            return if uploaded == 0 { 0.0 } else { max_ratio };
        }
        let ratio = uploaded as f64 / downloaded as f64;
        ratio.min(max_ratio)
    }
}

/// Torrent counts by status bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TorrentStatusReport {
    /// Still needs payload.
    pub downloading: usize,
    /// Holds the payload and is not paused.
    pub seeding: usize,
    /// Holds the payload.
    pub completed: usize,
    /// Moving data.
    pub active: usize,
    /// Not moving data.
    pub inactive: usize,
    /// Paused by request.
    pub paused: usize,
    /// Not paused.
    pub resumed: usize,
    /// In `Error` or `MissingFiles`.
    pub errored: usize,
}

/// Session-wide transfer figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    /// An incoming connection has been accepted.
    pub has_incoming_connections: bool,

    /// Payload download rate (bytes/s).
    pub payload_download_rate: u64,
    /// Payload upload rate (bytes/s).
    pub payload_upload_rate: u64,
    /// Total download rate including overhead (bytes/s).
    pub download_rate: u64,
    /// Total upload rate including overhead (bytes/s).
    pub upload_rate: u64,
    /// IP overhead download rate (bytes/s).
    pub ip_overhead_download_rate: u64,
    /// IP overhead upload rate (bytes/s).
    pub ip_overhead_upload_rate: u64,
    /// Tracker download rate (bytes/s).
    pub tracker_download_rate: u64,
    /// Tracker upload rate (bytes/s).
    pub tracker_upload_rate: u64,
    /// DHT download rate (bytes/s).
    pub dht_download_rate: u64,
    /// DHT upload rate (bytes/s).
    pub dht_upload_rate: u64,

    /// Bytes received this session.
    pub total_download: u64,
    /// Bytes sent this session.
    pub total_upload: u64,
    /// Payload bytes received this session.
    pub total_payload_download: u64,
    /// Payload bytes sent this session.
    pub total_payload_upload: u64,
    /// IP overhead bytes received.
    pub ip_overhead_download: u64,
    /// IP overhead bytes sent.
    pub ip_overhead_upload: u64,
    /// Tracker bytes received.
    pub tracker_download: u64,
    /// Tracker bytes sent.
    pub tracker_upload: u64,
    /// DHT bytes received.
    pub dht_download: u64,
    /// DHT bytes sent.
    pub dht_upload: u64,
    /// Redundant and hash-failed bytes.
    pub total_wasted: u64,

    /// DHT routing table size.
    pub dht_nodes: u64,
    /// Connected peers.
    pub peers_count: u64,
    /// Peers waiting on disk reads.
    pub disk_read_queue: u64,
    /// Peers waiting on disk writes.
    pub disk_write_queue: u64,

    /// Downloaded bytes across all sessions.
    pub all_time_download: u64,
    /// Uploaded bytes across all sessions.
    pub all_time_upload: u64,
}

/// Disk cache figures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Blocks held by the disk cache.
    pub total_used_buffers: u64,
    /// Cache hits over blocks read; `-1` when nothing was read.
    pub read_ratio: f64,
    /// Disk jobs waiting.
    pub jobs_queue_length: u64,
    /// Mean disk job time in milliseconds.
    pub average_job_time_ms: u64,
}

/// Aggregate view rebuilt on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Torrent counts.
    pub torrents: TorrentStatusReport,
    /// Transfer figures.
    pub session: SessionStatus,
    /// Disk cache figures.
    pub cache: CacheStatus,
    /// When the snapshot was built.
    pub refreshed_at: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            torrents: TorrentStatusReport::default(),
            session: SessionStatus::default(),
            cache: CacheStatus {
                read_ratio: -1.0,
                ..CacheStatus::default()
            },
            refreshed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_events::INFO_HASH_LEN;

    fn status() -> EngineTorrentStatus {
        EngineTorrentStatus::pending(InfoHash::new([1; INFO_HASH_LEN]), true)
    }

    #[test]
    fn ratio_handles_zero_download() {
        let mut status = status();
        assert!(status.ratio(9999.0).abs() < f64::EPSILON);
        status.all_time_upload = 10;
        assert!((status.ratio(9999.0) - 9999.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_uses_larger_download_figure_and_caps() {
        let mut status = status();
        status.all_time_download = 100;
        status.total_done = 400;
        status.all_time_upload = 1_000;
        assert!((status.ratio(9999.0) - 2.5).abs() < f64::EPSILON);
        status.total_done = 0;
        status.all_time_download = 1;
        status.all_time_upload = 1_000_000;
        assert!((status.ratio(9999.0) - 9999.0).abs() < f64::EPSILON);
    }

    #[test]
    fn completeness_follows_phase_and_progress() {
        let mut status = status();
        assert!(!status.is_complete());
        status.total_wanted = 10;
        status.total_wanted_done = 10;
        assert!(status.is_complete());
        status.phase = EnginePhase::Downloading;
        assert!(!status.is_complete());
        status.phase = EnginePhase::Seeding;
        assert!(status.is_complete());
    }
}
