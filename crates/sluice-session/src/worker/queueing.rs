//! Active-slot enforcement, queue repositioning and share limits.

use std::collections::BTreeMap;
use std::time::Instant;

use sluice_config::MaxRatioAction;
use sluice_events::{Event, InfoHash};
use sluice_torrent_core::QueueMove;
use tracing::{debug, info, warn};

use super::Worker;
use crate::policy::{self, Candidate, QueueLimits};
use crate::registry::TorrentRecord;

impl Worker {
    pub(super) async fn enforce_queue(&mut self) {
        self.queue_dirty = false;
        let plan = self.plan_queue(Instant::now());
        for (info_hash, queued) in plan {
            let Some(record) = self.registry.get_mut(&info_hash) else {
                continue;
            };
            if record.queued == queued {
                continue;
            }
            record.queued = queued;
            record.slow_since = None;
            let result = if queued {
                self.engine.pause_torrent(info_hash).await
            } else {
                self.engine.resume_torrent(info_hash).await
            };
            if let Err(err) = result {
                warn!(info_hash = %info_hash, queued, error = %err, "queue transition failed");
            } else {
                debug!(info_hash = %info_hash, queued, "queue slot changed");
            }
        }
    }

    fn plan_queue(&self, now: Instant) -> BTreeMap<InfoHash, bool> {
        let eligible = |record: &TorrentRecord| {
            !record.forced && !record.user_paused && record.error.is_none()
        };
        if !self.settings.queueing_enabled {
            return self
                .registry
                .records()
                .filter(|record| eligible(record))
                .map(|record| (record.info_hash(), false))
                .collect();
        }

        let limits = QueueLimits::from_settings(&self.settings);
        let candidate = |record: &TorrentRecord| Candidate {
            info_hash: record.info_hash(),
            slow: !record.queued && limits.is_slow(record.slow_since, now),
        };
        let downloads: Vec<Candidate> = self
            .registry
            .queue()
            .iter()
            .filter_map(|info_hash| self.registry.get(info_hash))
            .filter(|record| eligible(record) && !record.is_complete())
            .map(candidate)
            .collect();
        let mut seeds: Vec<&TorrentRecord> = self
            .registry
            .records()
            .filter(|record| eligible(record) && record.is_complete())
            .collect();
        seeds.sort_by_key(|record| record.admission);
        let seeds: Vec<Candidate> = seeds.into_iter().map(candidate).collect();
        policy::plan_queue(&downloads, &seeds, &limits)
    }

    /// Start or reset the slow window of every running torrent.
    pub(super) fn track_slow_torrents(&mut self, now: Instant) {
        let limits = QueueLimits::from_settings(&self.settings);
        for record in self.registry.records_mut() {
            if record.is_running() && limits.is_below_thresholds(&record.status) {
                record.slow_since.get_or_insert(now);
            } else {
                record.slow_since = None;
            }
        }
    }

    pub(super) async fn reposition(&mut self, targets: &[InfoHash], direction: QueueMove) {
        let moves = self.registry.reposition(targets, direction);
        if moves.is_empty() {
            return;
        }
        for (info_hash, step) in moves {
            if let Err(err) = self.engine.move_queue(info_hash, step).await {
                warn!(info_hash = %info_hash, error = %err, "engine queue move failed");
            }
        }
        let _ = self.events.publish(Event::QueueChanged {
            order: self.registry.queue().to_vec(),
        });
        self.queue_dirty = true;
    }

    /// Apply the configured action to seeds that crossed a share limit.
    pub(super) async fn enforce_share_limits(&mut self) {
        let ratio_global = self.settings.global_ratio_limit();
        let seeding_global = self.settings.global_seeding_limit();
        let mut crossed = Vec::new();
        for record in self.registry.records_mut() {
            if record.share_limit_reached || record.user_paused || !record.is_complete() {
                continue;
            }
            let ratio_limit = record.ratio_limit.resolve(ratio_global);
            let seeding_limit = record.seeding_time_limit.resolve(seeding_global);
            if policy::share_limit_exceeded(&record.status, ratio_limit, seeding_limit) {
                record.share_limit_reached = true;
                crossed.push(record.info_hash());
            }
        }
        crossed.sort_unstable();

        for info_hash in crossed {
            match self.settings.max_ratio_action {
                MaxRatioAction::Pause => {
                    info!(info_hash = %info_hash, "share limit reached; pausing torrent");
                    if let Err(err) = self.pause(info_hash).await {
                        warn!(info_hash = %info_hash, error = %err, "share limit pause failed");
                    }
                }
                MaxRatioAction::Remove => {
                    info!(info_hash = %info_hash, "share limit reached; removing torrent");
                    if let Err(err) = self.remove_torrent(info_hash, false).await {
                        warn!(info_hash = %info_hash, error = %err, "share limit removal failed");
                    }
                }
            }
        }
    }
}
