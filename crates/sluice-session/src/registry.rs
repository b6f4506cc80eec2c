//! Torrent records, the download queue and lifecycle state derivation.
//!
//! # Design
//! - Records live in a map keyed by info hash; the queue is a separate vector
//!   of hashes whose index plus one is the queue position.
//! - Only incomplete torrents sit in the queue, so positions are always
//!   exactly `1..=N`.
//! - Lifecycle state is derived from flags and the last engine status rather
//!   than stored independently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use sluice_events::{InfoHash, TorrentState};
use sluice_torrent_core::{
    EnginePhase, EngineTorrentStatus, QueueMove, ShareLimit, TorrentDescriptor, TrackerEntry,
};

/// Engine-reported failure that parks a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentFault {
    /// Engine message.
    pub message: String,
    /// The failure was a missing payload file.
    pub missing_files: bool,
}

/// Last known outcome of announcing to one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Last announce succeeded.
    Working,
    /// Last announce succeeded with a warning.
    Warning(String),
    /// Last announce failed.
    NotWorking(String),
}

/// Read-only copy of a torrent record handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentView {
    /// Identity.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: TorrentState,
    /// Category; empty when uncategorized.
    pub category: String,
    /// Attached tags.
    pub tags: BTreeSet<String>,
    /// Automatic torrent management.
    pub auto_tmm: bool,
    /// Final payload directory.
    pub save_path: String,
    /// Temporary directory holding the payload until it finishes.
    pub download_path: Option<String>,
    /// Queue position; `None` for complete torrents.
    pub queue_position: Option<usize>,
    /// Ratio limit override.
    pub ratio_limit: ShareLimit<f64>,
    /// Seeding time limit override in minutes.
    pub seeding_time_limit: ShareLimit<i64>,
    /// Force started.
    pub forced: bool,
    /// Paused by request or by a share limit.
    pub paused: bool,
    /// Parked by an engine failure.
    pub error: Option<TorrentFault>,
    /// Configured trackers in tier order.
    pub trackers: Vec<TrackerEntry>,
    /// Tracker outcomes keyed by URL.
    pub tracker_status: BTreeMap<String, TrackerStatus>,
    /// Web seeds.
    pub url_seeds: Vec<String>,
    /// Latest engine status.
    pub status: EngineTorrentStatus,
}

/// Authoritative per-torrent state owned by the control task.
#[derive(Debug, Clone)]
pub(crate) struct TorrentRecord {
    pub(crate) descriptor: TorrentDescriptor,
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) auto_tmm: bool,
    pub(crate) save_path: String,
    pub(crate) download_path: Option<String>,
    pub(crate) ratio_limit: ShareLimit<f64>,
    pub(crate) seeding_time_limit: ShareLimit<i64>,
    pub(crate) status: EngineTorrentStatus,
    pub(crate) forced: bool,
    pub(crate) user_paused: bool,
    pub(crate) queued: bool,
    pub(crate) moving: bool,
    pub(crate) error: Option<TorrentFault>,
    pub(crate) trackers: Vec<TrackerEntry>,
    pub(crate) tracker_status: BTreeMap<String, TrackerStatus>,
    pub(crate) url_seeds: Vec<String>,
    pub(crate) share_limit_reached: bool,
    pub(crate) finish_announced: bool,
    pub(crate) slow_since: Option<Instant>,
    pub(crate) file_error_reported: bool,
    pub(crate) needs_resume_save: bool,
    pub(crate) admission: u64,
}

impl TorrentRecord {
    pub(crate) fn info_hash(&self) -> InfoHash {
        self.descriptor.info_hash
    }

    /// Directory the engine currently writes to.
    pub(crate) fn data_path(&self) -> &str {
        self.download_path.as_deref().unwrap_or(&self.save_path)
    }

    pub(crate) const fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Lifecycle state from flags and the latest engine status.
    pub(crate) fn state(&self) -> TorrentState {
        let complete = self.is_complete();
        if self.moving || self.status.moving_storage {
            return TorrentState::Moving;
        }
        if let Some(fault) = &self.error {
            return if fault.missing_files {
                TorrentState::MissingFiles
            } else {
                TorrentState::Error
            };
        }
        if self.user_paused {
            return if complete {
                TorrentState::PausedUploading
            } else {
                TorrentState::PausedDownloading
            };
        }
        if self.queued {
            return if complete {
                TorrentState::QueuedUploading
            } else {
                TorrentState::QueuedDownloading
            };
        }
        match self.status.phase {
            EnginePhase::CheckingResumeData => TorrentState::CheckingResumeData,
            EnginePhase::CheckingFiles if complete => TorrentState::CheckingUploading,
            EnginePhase::CheckingFiles => TorrentState::CheckingDownloading,
            EnginePhase::DownloadingMetadata => TorrentState::DownloadingMetadata,
            EnginePhase::Allocating => TorrentState::Allocating,
            EnginePhase::Downloading if self.forced => TorrentState::ForcedDownloading,
            EnginePhase::Downloading if self.status.download_rate > 0 => {
                TorrentState::Downloading
            }
            EnginePhase::Downloading => TorrentState::StalledDownloading,
            EnginePhase::Finished | EnginePhase::Seeding if self.forced => {
                TorrentState::ForcedUploading
            }
            EnginePhase::Finished | EnginePhase::Seeding if self.status.upload_rate > 0 => {
                TorrentState::Uploading
            }
            EnginePhase::Finished | EnginePhase::Seeding => TorrentState::StalledUploading,
        }
    }

    /// Running in the engine: not paused, queued or parked by an error.
    pub(crate) const fn is_running(&self) -> bool {
        !self.user_paused && !self.queued && self.error.is_none()
    }
}

/// Torrent records plus the ordered download queue.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    records: HashMap<InfoHash, TorrentRecord>,
    queue: Vec<InfoHash>,
    next_admission: u64,
}

impl Registry {
    pub(crate) fn contains(&self, info_hash: &InfoHash) -> bool {
        self.records.contains_key(info_hash)
    }

    pub(crate) fn get(&self, info_hash: &InfoHash) -> Option<&TorrentRecord> {
        self.records.get(info_hash)
    }

    pub(crate) fn get_mut(&mut self, info_hash: &InfoHash) -> Option<&mut TorrentRecord> {
        self.records.get_mut(info_hash)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &TorrentRecord> {
        self.records.values()
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut TorrentRecord> {
        self.records.values_mut()
    }

    /// Hashes sorted for deterministic iteration.
    pub(crate) fn hashes(&self) -> Vec<InfoHash> {
        let mut hashes: Vec<InfoHash> = self.records.keys().copied().collect();
        hashes.sort_unstable();
        hashes
    }

    /// Admit a record at the back of the queue.
    pub(crate) fn insert(&mut self, mut record: TorrentRecord) {
        record.admission = self.next_admission;
        self.next_admission += 1;
        let info_hash = record.info_hash();
        if !record.is_complete() {
            self.queue.push(info_hash);
        }
        self.records.insert(info_hash, record);
    }

    pub(crate) fn remove(&mut self, info_hash: &InfoHash) -> Option<TorrentRecord> {
        let record = self.records.remove(info_hash)?;
        self.queue.retain(|queued| queued != info_hash);
        Some(record)
    }

    /// Queue order, position 1 first.
    pub(crate) fn queue(&self) -> &[InfoHash] {
        &self.queue
    }

    pub(crate) fn queue_position(&self, info_hash: &InfoHash) -> Option<usize> {
        self.queue
            .iter()
            .position(|queued| queued == info_hash)
            .map(|index| index + 1)
    }

    /// Keep queue membership in line with completion; `true` when it changed.
    pub(crate) fn sync_queue_membership(&mut self, info_hash: &InfoHash) -> bool {
        let Some(record) = self.records.get(info_hash) else {
            return false;
        };
        let queued = self.queue.contains(info_hash);
        if record.is_complete() && queued {
            self.queue.retain(|entry| entry != info_hash);
            true
        } else if !record.is_complete() && !queued {
            self.queue.push(*info_hash);
            true
        } else {
            false
        }
    }

    /// Apply a reposition over `targets`; returns the engine moves to mirror.
    ///
    /// Targets outside the queue are ignored. Selected torrents keep their
    /// relative order, and a block of selected torrents at an edge stays put.
    pub(crate) fn reposition(
        &mut self,
        targets: &[InfoHash],
        direction: QueueMove,
    ) -> Vec<(InfoHash, QueueMove)> {
        let selected: BTreeSet<InfoHash> = targets
            .iter()
            .filter(|hash| self.queue.contains(hash))
            .copied()
            .collect();
        if selected.is_empty() {
            return Vec::new();
        }

        let mut moves = Vec::new();
        match direction {
            QueueMove::Up => {
                for index in 1..self.queue.len() {
                    if selected.contains(&self.queue[index])
                        && !selected.contains(&self.queue[index - 1])
                    {
                        moves.push((self.queue[index], QueueMove::Up));
                        self.queue.swap(index, index - 1);
                    }
                }
            }
            QueueMove::Down => {
                for index in (0..self.queue.len().saturating_sub(1)).rev() {
                    if selected.contains(&self.queue[index])
                        && !selected.contains(&self.queue[index + 1])
                    {
                        moves.push((self.queue[index], QueueMove::Down));
                        self.queue.swap(index, index + 1);
                    }
                }
            }
            QueueMove::Top => {
                let (mut front, rest): (Vec<_>, Vec<_>) =
                    self.queue.iter().copied().partition(|hash| selected.contains(hash));
                if self.queue.starts_with(&front) {
                    return Vec::new();
                }
                moves.extend(front.iter().rev().map(|hash| (*hash, QueueMove::Top)));
                front.extend(rest);
                self.queue = front;
            }
            QueueMove::Bottom => {
                let (back, mut rest): (Vec<_>, Vec<_>) =
                    self.queue.iter().copied().partition(|hash| selected.contains(hash));
                if self.queue.ends_with(&back) {
                    return Vec::new();
                }
                moves.extend(back.iter().map(|hash| (*hash, QueueMove::Bottom)));
                rest.extend(back);
                self.queue = rest;
            }
        }
        moves
    }

    /// Replace the queue order, keeping only incomplete registered torrents.
    pub(crate) fn restore_queue_order(&mut self, order: &[InfoHash]) {
        let mut restored: Vec<InfoHash> = order
            .iter()
            .filter(|hash| self.queue.contains(hash))
            .copied()
            .collect();
        for hash in &self.queue {
            if !restored.contains(hash) {
                restored.push(*hash);
            }
        }
        self.queue = restored;
    }

    pub(crate) fn view(&self, info_hash: &InfoHash) -> Option<TorrentView> {
        let record = self.records.get(info_hash)?;
        Some(TorrentView {
            info_hash: *info_hash,
            name: record.name.clone(),
            state: record.state(),
            category: record.category.clone(),
            tags: record.tags.clone(),
            auto_tmm: record.auto_tmm,
            save_path: record.save_path.clone(),
            download_path: record.download_path.clone(),
            queue_position: self.queue_position(info_hash),
            ratio_limit: record.ratio_limit,
            seeding_time_limit: record.seeding_time_limit,
            forced: record.forced,
            paused: record.user_paused,
            error: record.error.clone(),
            trackers: record.trackers.clone(),
            tracker_status: record.tracker_status.clone(),
            url_seeds: record.url_seeds.clone(),
            status: record.status.clone(),
        })
    }
}
