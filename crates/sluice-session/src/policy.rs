//! Active-count and share-limit evaluation.
//!
//! # Design
//! - Pure functions over plain inputs; the control task gathers candidates
//!   and applies the resulting transitions to the engine.
//! - Forced, paused and errored torrents never reach the planner.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use sluice_config::{MAX_RATIO, SessionSettings, count_limit};
use sluice_events::InfoHash;
use sluice_torrent_core::EngineTorrentStatus;

/// Slot limits and slow-torrent thresholds in force for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueLimits {
    pub(crate) downloads: Option<usize>,
    pub(crate) uploads: Option<usize>,
    pub(crate) torrents: Option<usize>,
    pub(crate) ignore_slow: bool,
    pub(crate) slow_download_rate: u64,
    pub(crate) slow_upload_rate: u64,
    pub(crate) slow_inactivity: Duration,
}

impl QueueLimits {
    pub(crate) fn from_settings(settings: &SessionSettings) -> Self {
        let kib = |value: i64| u64::try_from(value).unwrap_or_default() * 1024;
        Self {
            downloads: count_limit(settings.max_active_downloads),
            uploads: count_limit(settings.max_active_uploads),
            torrents: count_limit(settings.max_active_torrents),
            ignore_slow: settings.ignore_slow_torrents,
            slow_download_rate: kib(settings.slow_torrent_download_rate),
            slow_upload_rate: kib(settings.slow_torrent_upload_rate),
            slow_inactivity: settings.slow_torrent_inactivity,
        }
    }

    /// Both rates sit at or below the slow thresholds.
    pub(crate) const fn is_below_thresholds(&self, status: &EngineTorrentStatus) -> bool {
        status.download_rate <= self.slow_download_rate
            && status.upload_rate <= self.slow_upload_rate
    }

    /// The torrent has been below the thresholds for the whole inactivity window.
    pub(crate) fn is_slow(&self, slow_since: Option<Instant>, now: Instant) -> bool {
        self.ignore_slow
            && slow_since.is_some_and(|since| now.duration_since(since) >= self.slow_inactivity)
    }
}

/// Torrent competing for an active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub(crate) info_hash: InfoHash,
    /// Currently running and past the slow inactivity window.
    pub(crate) slow: bool,
}

/// Decide which candidates are queued.
///
/// `downloads` must be in queue-position order and `seeds` in admission
/// order. Downloads are admitted first; both kinds share the total limit.
/// Slow candidates stay active without consuming a slot.
pub(crate) fn plan_queue(
    downloads: &[Candidate],
    seeds: &[Candidate],
    limits: &QueueLimits,
) -> BTreeMap<InfoHash, bool> {
    let within = |used: usize, limit: Option<usize>| limit.is_none_or(|limit| used < limit);
    let mut plan = BTreeMap::new();
    let mut total = 0;

    let mut active_downloads = 0;
    for candidate in downloads {
        if candidate.slow {
            plan.insert(candidate.info_hash, false);
        } else if within(active_downloads, limits.downloads) && within(total, limits.torrents) {
            active_downloads += 1;
            total += 1;
            plan.insert(candidate.info_hash, false);
        } else {
            plan.insert(candidate.info_hash, true);
        }
    }

    let mut active_seeds = 0;
    for candidate in seeds {
        if candidate.slow {
            plan.insert(candidate.info_hash, false);
        } else if within(active_seeds, limits.uploads) && within(total, limits.torrents) {
            active_seeds += 1;
            total += 1;
            plan.insert(candidate.info_hash, false);
        } else {
            plan.insert(candidate.info_hash, true);
        }
    }
    plan
}

/// Whether a seeding torrent has reached either of its effective limits.
///
/// `ratio_limit` is a share ratio and `seeding_limit` is in minutes; `None`
/// disables the corresponding check.
pub(crate) fn share_limit_exceeded(
    status: &EngineTorrentStatus,
    ratio_limit: Option<f64>,
    seeding_limit: Option<i64>,
) -> bool {
    let ratio = status.ratio(MAX_RATIO);
    let ratio_hit = ratio_limit.is_some_and(|limit| ratio >= limit);
    let seeding_minutes = i64::try_from(status.seeding_time.as_secs() / 60).unwrap_or(i64::MAX);
    let seeding_hit = seeding_limit.is_some_and(|limit| seeding_minutes >= limit);
    ratio_hit || seeding_hit
}
