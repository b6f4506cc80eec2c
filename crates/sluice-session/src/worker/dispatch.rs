//! Engine alert drain and per-kind handlers.

use std::time::Instant;

use sluice_events::{Event, InfoHash};
use sluice_torrent_core::{DescriptorKind, EngineAlert, EngineTorrentStatus, FileErrorKind};
use tracing::{debug, info, warn};

use crate::export;
use crate::registry::{TorrentFault, TrackerStatus};
use crate::resume::ResumeJob;

use super::Worker;

impl Worker {
    pub(super) async fn drain_alerts(&mut self) {
        let alerts = match self.engine.poll_alerts().await {
            Ok(alerts) => {
                self.mark_recovered("engine_alerts");
                alerts
            }
            Err(err) => {
                let detail = err.to_string();
                self.mark_degraded("engine_alerts", Some(&detail));
                return;
            }
        };
        for alert in alerts {
            self.metrics.inc_alert(alert.kind());
            self.dispatch(alert).await;
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch(&mut self, alert: EngineAlert) {
        match alert {
            EngineAlert::AddResult { info_hash, error } => {
                self.handle_add_result(info_hash, error).await;
            }
            EngineAlert::StateUpdate { statuses } => self.handle_state_update(statuses),
            EngineAlert::MetadataReceived {
                info_hash,
                name,
                total_size,
                metadata,
            } => {
                self.handle_metadata(info_hash, name, total_size, metadata)
                    .await;
            }
            EngineAlert::TorrentPaused { info_hash } => {
                debug!(info_hash = %info_hash, "engine paused torrent");
            }
            EngineAlert::TorrentFinished { info_hash } => self.handle_finished(info_hash).await,
            EngineAlert::TorrentChecked { info_hash } => {
                if self.registry.contains(&info_hash) {
                    let _ = self
                        .events
                        .publish(Event::TorrentFinishedChecking { info_hash });
                }
            }
            EngineAlert::FileError {
                info_hash,
                path,
                kind,
                message,
            } => self.handle_file_error(info_hash, path, kind, message),
            EngineAlert::TorrentRemoved { info_hash } => {
                if self
                    .removing
                    .get(&info_hash)
                    .is_some_and(|removing| !removing.delete_files)
                {
                    self.removing.remove(&info_hash);
                    debug!(info_hash = %info_hash, "engine teardown complete");
                }
            }
            EngineAlert::TorrentDeleted { info_hash } => {
                if let Some(removing) = self.removing.remove(&info_hash) {
                    info!(
                        info_hash = %info_hash,
                        name = %removing.name,
                        save_path = %removing.save_path,
                        "torrent files deleted"
                    );
                }
            }
            EngineAlert::TorrentDeleteFailed { info_hash, message } => {
                if let Some(removing) = self.removing.remove(&info_hash) {
                    warn!(
                        info_hash = %info_hash,
                        name = %removing.name,
                        save_path = %removing.save_path,
                        error = %message,
                        "failed to delete torrent files"
                    );
                }
            }
            EngineAlert::StorageMoved { info_hash, path } => {
                if let Some(record) = self.registry.get_mut(&info_hash) {
                    record.moving = false;
                    if record.download_path.as_deref() == Some(path.as_str()) {
                        return;
                    }
                    if record.download_path.take().is_some() {
                        record.needs_resume_save = true;
                    }
                    if record.save_path != path {
                        record.save_path.clone_from(&path);
                        record.needs_resume_save = true;
                        let _ = self.events.publish(Event::TorrentSavePathChanged {
                            info_hash,
                            save_path: path,
                        });
                    }
                }
            }
            EngineAlert::StorageMoveFailed { info_hash, message } => {
                if let Some(record) = self.registry.get_mut(&info_hash) {
                    record.moving = false;
                    warn!(info_hash = %info_hash, error = %message, "storage move failed");
                }
            }
            EngineAlert::ResumeDataReady { info_hash, payload } => {
                self.awaiting_resume.remove(&info_hash);
                if let Some(record) = self.registry.get_mut(&info_hash) {
                    record.needs_resume_save = false;
                    let metadata = Box::new(Self::stored_metadata(record));
                    self.send_resume_job(ResumeJob::Save {
                        info_hash,
                        fastresume: payload,
                        metadata,
                    });
                }
            }
            EngineAlert::ResumeDataFailed { info_hash, message } => {
                self.awaiting_resume.remove(&info_hash);
                warn!(info_hash = %info_hash, error = %message, "resume data generation failed");
            }
            EngineAlert::TrackerReply {
                info_hash,
                tracker,
                num_peers,
            } => {
                debug!(info_hash = %info_hash, tracker = %tracker, num_peers, "tracker reply");
                if self.set_tracker_status(info_hash, &tracker, TrackerStatus::Working) {
                    let _ = self
                        .events
                        .publish(Event::TrackerSuccess { info_hash, tracker });
                }
            }
            EngineAlert::TrackerWarning {
                info_hash,
                tracker,
                message,
            } => {
                let status = TrackerStatus::Warning(message.clone());
                if self.set_tracker_status(info_hash, &tracker, status) {
                    let _ = self.events.publish(Event::TrackerWarning {
                        info_hash,
                        tracker,
                        message,
                    });
                }
            }
            EngineAlert::TrackerError {
                info_hash,
                tracker,
                message,
            } => {
                let status = TrackerStatus::NotWorking(message.clone());
                if self.set_tracker_status(info_hash, &tracker, status) {
                    let _ = self.events.publish(Event::TrackerError {
                        info_hash,
                        tracker,
                        message,
                    });
                }
            }
            EngineAlert::UrlSeedError {
                info_hash,
                url,
                message,
            } => {
                warn!(info_hash = %info_hash, url = %url, error = %message, "web seed failed");
            }
            EngineAlert::Portmap {
                protocol,
                external_port,
            } => {
                self.network.port_mappings += 1;
                info!(protocol = ?protocol, external_port, "port mapped");
            }
            EngineAlert::PortmapError { protocol, message } => {
                self.network.port_mapping_failures += 1;
                warn!(protocol = ?protocol, error = %message, "port mapping failed");
            }
            EngineAlert::PeerBlocked { ip, reason } => {
                self.network.blocked_peers += 1;
                debug!(ip = %ip, reason = ?reason, "peer blocked");
            }
            EngineAlert::PeerBanned { ip } => {
                self.network.banned_peers += 1;
                info!(ip = %ip, "peer banned");
            }
            EngineAlert::ExternalIp { ip } => {
                if self.network.external_ip.replace(ip) != Some(ip) {
                    info!(ip = %ip, "external address detected");
                }
            }
            EngineAlert::ListenSucceeded { endpoint } => {
                let endpoint = endpoint.to_string();
                info!(endpoint = %endpoint, "listening");
                self.network.listening.insert(endpoint.clone());
                let _ = self.events.publish(Event::ListenStateChanged {
                    listening: true,
                    endpoint,
                });
            }
            EngineAlert::ListenFailed { endpoint, message } => {
                warn!(endpoint = %endpoint, error = %message, "failed to listen");
                self.network.listen_failures += 1;
                self.network.listening.remove(&endpoint);
                let _ = self.events.publish(Event::ListenStateChanged {
                    listening: !self.network.listening.is_empty(),
                    endpoint,
                });
            }
            EngineAlert::SessionStats { values } => self.stats.ingest(&values, Instant::now()),
            EngineAlert::Unrecognized { kind } => {
                debug!(kind = %kind, "ignoring unrecognized engine alert");
            }
        }
    }

    async fn handle_add_result(&mut self, info_hash: InfoHash, error: Option<String>) {
        if let Some(stale) = self.stale_add_results.get_mut(&info_hash) {
            *stale -= 1;
            if *stale == 0 {
                self.stale_add_results.remove(&info_hash);
            }
            debug!(info_hash = %info_hash, "ignoring add result of superseded metadata fetch");
            return;
        }
        if let Some(fetch) = self.metadata_loads.get_mut(&info_hash)
            && !fetch.acknowledged
        {
            match error {
                None => fetch.acknowledged = true,
                Some(reason) => {
                    self.metadata_loads.remove(&info_hash);
                    warn!(info_hash = %info_hash, reason = %reason, "metadata fetch rejected");
                    let _ = self
                        .events
                        .publish(Event::AddTorrentFailed { info_hash, reason });
                }
            }
            return;
        }
        let Some(pending) = self.pending_adds.remove(&info_hash) else {
            debug!(info_hash = %info_hash, "add result without a pending request");
            return;
        };
        match error {
            None => self.admit(pending).await,
            Some(reason) => {
                warn!(info_hash = %info_hash, reason = %reason, "engine rejected torrent");
                let _ = self
                    .events
                    .publish(Event::AddTorrentFailed { info_hash, reason });
            }
        }
    }

    fn handle_state_update(&mut self, statuses: Vec<EngineTorrentStatus>) {
        let mut updated = Vec::with_capacity(statuses.len());
        let mut queue_changed = false;
        for status in statuses {
            let info_hash = status.info_hash;
            let Some(record) = self.registry.get_mut(&info_hash) else {
                continue;
            };
            if record.status.total_done != status.total_done
                || record.status.phase != status.phase
                || record.status.all_time_upload != status.all_time_upload
            {
                record.needs_resume_save = true;
            }
            if status.has_metadata && !status.is_checking() && !status.is_complete() {
                record.finish_announced = false;
            }
            record.status = status;
            queue_changed |= self.registry.sync_queue_membership(&info_hash);
            updated.push(info_hash);
        }
        if queue_changed {
            let _ = self.events.publish(Event::QueueChanged {
                order: self.registry.queue().to_vec(),
            });
            self.queue_dirty = true;
        }
        if !updated.is_empty() {
            let _ = self.events.publish(Event::TorrentsUpdated {
                info_hashes: updated,
            });
        }
    }

    async fn handle_metadata(
        &mut self,
        info_hash: InfoHash,
        name: String,
        total_size: u64,
        metadata: Vec<u8>,
    ) {
        if self.metadata_loads.remove(&info_hash).is_some() {
            info!(info_hash = %info_hash, name = %name, "metadata fetched");
            let _ = self.events.publish(Event::MetadataLoaded {
                info_hash,
                name,
                total_size,
                metadata,
            });
            if let Err(err) = self.engine.remove_torrent(info_hash, true).await {
                warn!(info_hash = %info_hash, error = %err, "failed to drop metadata fetch");
            }
            return;
        }
        let Some(record) = self.registry.get_mut(&info_hash) else {
            debug!(info_hash = %info_hash, "discarding metadata for cancelled fetch");
            return;
        };
        record.status.has_metadata = true;
        record.needs_resume_save = true;
        if record.name == info_hash.to_hex() && !name.trim().is_empty() {
            record.name = name;
        }
        let _ = self
            .events
            .publish(Event::TorrentMetadataLoaded { info_hash });
    }

    async fn handle_finished(&mut self, info_hash: InfoHash) {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return;
        };
        if record.finish_announced {
            return;
        }
        record.finish_announced = true;
        record.needs_resume_save = true;
        info!(info_hash = %info_hash, name = %record.name, "torrent finished");
        let finished_export = self.settings.finished_torrent_export_dir.trim();
        if !finished_export.is_empty()
            && let DescriptorKind::Metainfo { bytes } = &record.descriptor.kind
        {
            export::spawn_export(
                info_hash,
                finished_export.to_string(),
                record.name.clone(),
                bytes.clone(),
            );
        }
        let _ = self.events.publish(Event::TorrentFinished { info_hash });
        self.leave_temp_path(info_hash).await;
        self.queue_dirty = true;
        if !self.has_unfinished_torrents() {
            let _ = self.events.publish(Event::AllTorrentsFinished);
        }
    }

    fn handle_file_error(
        &mut self,
        info_hash: InfoHash,
        path: String,
        kind: FileErrorKind,
        message: String,
    ) {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return;
        };
        record.error = Some(TorrentFault {
            message: message.clone(),
            missing_files: kind == FileErrorKind::NotFound,
        });
        record.needs_resume_save = true;
        self.queue_dirty = true;
        if record.file_error_reported {
            return;
        }
        record.file_error_reported = true;
        warn!(info_hash = %info_hash, path = %path, error = %message, "torrent file error");
        let _ = self.events.publish(Event::FileError {
            info_hash,
            path,
            message,
        });
    }

    /// Record a tracker outcome; `true` when the status changed.
    fn set_tracker_status(
        &mut self,
        info_hash: InfoHash,
        tracker: &str,
        status: TrackerStatus,
    ) -> bool {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return false;
        };
        let previous = record.tracker_status.insert(tracker.to_string(), status.clone());
        previous.as_ref() != Some(&status)
    }
}
