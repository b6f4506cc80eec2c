//! Torrent lifecycle commands: add, remove, metadata fetches and pause/resume.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use sluice_events::{Event, InfoHash};
use sluice_torrent_core::{
    AddSource, AddTorrentParams, DescriptorKind, EngineAddRequest, EngineTorrentStatus,
    TorrentDescriptor, TrackerEntry,
};
use tracing::{debug, info, warn};

use super::{MetadataFetch, PendingAdd, RemovingTorrent, Worker};
use crate::error::{SessionError, SessionResult};
use crate::export;
use crate::registry::TorrentRecord;
use crate::resume::{ResumeJob, StoredResume};

const METADATA_STAGING_DIR: &str = ".sluice-metadata";

impl Worker {
    pub(super) async fn add_torrent(
        &mut self,
        source: AddSource,
        params: AddTorrentParams,
    ) -> SessionResult<()> {
        match source {
            AddSource::Descriptor { descriptor } => self.add_descriptor(descriptor, params).await,
            AddSource::Url { url } => {
                if self.pending_urls.contains_key(&url) {
                    return Err(SessionError::UrlPending { url });
                }
                self.validate_labels(&params)?;
                debug!(url = %url, "torrent url download pending");
                self.pending_urls.insert(url, params);
                Ok(())
            }
        }
    }

    pub(super) async fn url_download_finished(
        &mut self,
        url: String,
        result: Result<TorrentDescriptor, String>,
    ) -> SessionResult<()> {
        let Some(params) = self.pending_urls.remove(&url) else {
            return Err(SessionError::UnknownUrl { url });
        };
        match result {
            Ok(descriptor) => self.add_descriptor(descriptor, params).await,
            Err(reason) => {
                warn!(url = %url, reason = %reason, "torrent url download failed");
                let _ = self.events.publish(Event::UrlDownloadFailed { url, reason });
                Ok(())
            }
        }
    }

    async fn add_descriptor(
        &mut self,
        descriptor: TorrentDescriptor,
        params: AddTorrentParams,
    ) -> SessionResult<()> {
        let info_hash = descriptor.info_hash;
        if self.registry.contains(&info_hash) || self.pending_adds.contains_key(&info_hash) {
            return Err(SessionError::AlreadyExists { info_hash });
        }
        self.validate_labels(&params)?;
        if self.forget_metadata_fetch(info_hash) {
            debug!(info_hash = %info_hash, "superseding metadata fetch with full add");
            if let Err(err) = self.engine.remove_torrent(info_hash, true).await {
                warn!(info_hash = %info_hash, error = %err, "failed to cancel metadata fetch");
            }
        }

        let default_save_path = self.settings.default_save_path.clone();
        let auto_tmm = params
            .auto_tmm
            .unwrap_or(!self.settings.auto_tmm_disabled_by_default);
        let save_path = if auto_tmm {
            self.taxonomy
                .category_save_path(&params.category, &default_save_path)
        } else {
            params
                .save_path
                .as_deref()
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map_or(default_save_path, str::to_string)
        };
        let user_paused = params.paused.unwrap_or(self.settings.add_torrent_paused);
        let forced = params.force_start;
        let name = params
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| descriptor.display_name());

        let mut trackers: Vec<TrackerEntry> = Vec::new();
        for url in params
            .trackers
            .into_iter()
            .chain(self.settings.additional_tracker_list())
        {
            let url = url.trim();
            if !url.is_empty() && !trackers.iter().any(|entry| entry.url == url) {
                trackers.push(TrackerEntry::new(url, 0));
            }
        }
        let mut url_seeds: Vec<String> = Vec::new();
        for url in params.url_seeds {
            let url = url.trim();
            if !url.is_empty() && !url_seeds.iter().any(|seed| seed == url) {
                url_seeds.push(url.to_string());
            }
        }

        let record = TorrentRecord {
            status: EngineTorrentStatus::pending(info_hash, !descriptor.is_magnet()),
            descriptor,
            name,
            category: params.category,
            tags: params.tags,
            auto_tmm,
            save_path,
            download_path: self.settings.temp_path(),
            ratio_limit: params.ratio_limit,
            seeding_time_limit: params.seeding_time_limit,
            forced,
            user_paused,
            queued: false,
            moving: false,
            error: None,
            trackers,
            tracker_status: BTreeMap::new(),
            url_seeds,
            share_limit_reached: false,
            finish_announced: false,
            slow_since: None,
            file_error_reported: false,
            needs_resume_save: true,
            admission: 0,
        };
        self.submit(record, params.resume_data, false).await
    }

    /// Hand a prepared record to the engine and park it until the add result.
    async fn submit(
        &mut self,
        mut record: TorrentRecord,
        resume_data: Option<Vec<u8>>,
        from_resume: bool,
    ) -> SessionResult<()> {
        let info_hash = record.info_hash();
        record.queued = !record.user_paused && !record.forced && self.settings.queueing_enabled;
        let request = EngineAddRequest {
            descriptor: record.descriptor.clone(),
            save_path: record.data_path().to_string(),
            paused: record.user_paused || record.queued,
            trackers: record.trackers.clone(),
            url_seeds: record.url_seeds.clone(),
            resume_data,
            metadata_only: false,
        };
        self.engine
            .add_torrent(request)
            .await
            .map_err(|err| SessionError::engine("add_torrent", err))?;
        debug!(info_hash = %info_hash, from_resume, "torrent add submitted");
        self.pending_adds
            .insert(info_hash, PendingAdd { record, from_resume });
        Ok(())
    }

    pub(super) async fn restore_torrent(&mut self, stored: StoredResume) {
        let metadata = stored.metadata;
        let info_hash = metadata.descriptor.info_hash;
        let mut category = metadata.category;
        if !category.is_empty() && !self.taxonomy.has_category(&category) {
            warn!(
                info_hash = %info_hash,
                category = %category,
                "restored torrent references unknown category"
            );
            category.clear();
        }
        let tags: BTreeSet<String> = metadata
            .tags
            .into_iter()
            .filter(|tag| self.taxonomy.has_tag(tag))
            .collect();

        let record = TorrentRecord {
            status: EngineTorrentStatus::pending(info_hash, !metadata.descriptor.is_magnet()),
            descriptor: metadata.descriptor,
            name: metadata.name,
            category,
            tags,
            auto_tmm: metadata.auto_tmm,
            save_path: metadata.save_path,
            download_path: metadata.download_path,
            ratio_limit: metadata.ratio_limit,
            seeding_time_limit: metadata.seeding_time_limit,
            forced: metadata.forced,
            user_paused: metadata.paused,
            queued: false,
            moving: false,
            error: None,
            trackers: metadata.trackers,
            tracker_status: BTreeMap::new(),
            url_seeds: metadata.url_seeds,
            share_limit_reached: false,
            finish_announced: true,
            slow_since: None,
            file_error_reported: false,
            needs_resume_save: false,
            admission: 0,
        };
        if let Err(err) = self.submit(record, stored.fastresume, true).await {
            warn!(info_hash = %info_hash, error = %err, "failed to restore torrent");
        }
    }

    /// Register a record once the engine has acknowledged it.
    pub(super) async fn admit(&mut self, pending: PendingAdd) {
        let PendingAdd {
            record,
            from_resume,
        } = pending;
        let info_hash = record.info_hash();
        let name = record.name.clone();
        let forced = record.forced && !record.user_paused;
        if !from_resume && !self.settings.torrent_export_dir.trim().is_empty()
            && let DescriptorKind::Metainfo { bytes } = &record.descriptor.kind
        {
            export::spawn_export(
                info_hash,
                self.settings.torrent_export_dir.trim().to_string(),
                name.clone(),
                bytes.clone(),
            );
        }
        self.registry.insert(record);
        if from_resume {
            self.registry.restore_queue_order(&self.restore_order);
        }
        if forced {
            if let Err(err) = self.engine.set_force_start(info_hash, true).await {
                warn!(info_hash = %info_hash, error = %err, "failed to force start torrent");
            }
        }

        info!(info_hash = %info_hash, name = %name, from_resume, "torrent added");
        let _ = self.events.publish(Event::TorrentAdded {
            info_hash,
            name,
            from_resume,
        });
        if self.registry.queue_position(&info_hash).is_some() {
            let _ = self.events.publish(Event::QueueChanged {
                order: self.registry.queue().to_vec(),
            });
        }
        self.queue_dirty = true;
    }

    pub(super) async fn remove_torrent(
        &mut self,
        info_hash: InfoHash,
        delete_files: bool,
    ) -> SessionResult<()> {
        let was_queued = self.registry.queue_position(&info_hash).is_some();
        let Some(record) = self.registry.remove(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        self.awaiting_resume.remove(&info_hash);
        self.removing.insert(
            info_hash,
            RemovingTorrent {
                name: record.name.clone(),
                save_path: record.data_path().to_string(),
                delete_files,
            },
        );
        self.send_resume_job(ResumeJob::Delete { info_hash });

        info!(info_hash = %info_hash, name = %record.name, delete_files, "torrent removed");
        let _ = self.events.publish(Event::TorrentRemoved {
            info_hash,
            name: record.name,
        });
        if was_queued {
            let _ = self.events.publish(Event::QueueChanged {
                order: self.registry.queue().to_vec(),
            });
        }
        self.queue_dirty = true;

        if let Err(err) = self.engine.remove_torrent(info_hash, delete_files).await {
            self.removing.remove(&info_hash);
            warn!(info_hash = %info_hash, error = %err, "engine teardown request failed");
        }
        Ok(())
    }

    pub(super) async fn load_metadata(&mut self, descriptor: TorrentDescriptor) -> SessionResult<()> {
        let info_hash = descriptor.info_hash;
        if !descriptor.is_magnet() {
            return Err(SessionError::NotMagnet { info_hash });
        }
        if self.registry.contains(&info_hash)
            || self.pending_adds.contains_key(&info_hash)
            || self.metadata_loads.contains_key(&info_hash)
        {
            return Err(SessionError::AlreadyExists { info_hash });
        }
        let request = EngineAddRequest {
            descriptor,
            save_path: self.metadata_staging_path(),
            paused: false,
            trackers: self
                .settings
                .additional_tracker_list()
                .into_iter()
                .map(|url| TrackerEntry::new(url, 0))
                .collect(),
            url_seeds: Vec::new(),
            resume_data: None,
            metadata_only: true,
        };
        self.engine
            .add_torrent(request)
            .await
            .map_err(|err| SessionError::engine("load_metadata", err))?;
        debug!(info_hash = %info_hash, "metadata fetch started");
        self.metadata_loads
            .insert(info_hash, MetadataFetch::default());
        Ok(())
    }

    pub(super) async fn cancel_load_metadata(&mut self, info_hash: InfoHash) -> SessionResult<bool> {
        if !self.forget_metadata_fetch(info_hash) {
            return Ok(false);
        }
        debug!(info_hash = %info_hash, "metadata fetch cancelled");
        self.engine
            .remove_torrent(info_hash, true)
            .await
            .map_err(|err| SessionError::engine("cancel_load_metadata", err))?;
        Ok(true)
    }

    /// Scratch directory for metadata-only fetches, under the temporary path
    /// when enabled and the default save path otherwise.
    fn metadata_staging_path(&self) -> String {
        let base = self
            .settings
            .temp_path()
            .unwrap_or_else(|| self.settings.default_save_path.clone());
        Path::new(&base)
            .join(METADATA_STAGING_DIR)
            .to_string_lossy()
            .into_owned()
    }

    /// Drop a fetch; an add result still owed by the engine is swallowed later.
    fn forget_metadata_fetch(&mut self, info_hash: InfoHash) -> bool {
        let Some(fetch) = self.metadata_loads.remove(&info_hash) else {
            return false;
        };
        if !fetch.acknowledged {
            *self.stale_add_results.entry(info_hash).or_default() += 1;
        }
        true
    }

    pub(super) async fn pause(&mut self, info_hash: InfoHash) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.user_paused {
            return Ok(());
        }
        let engine_running = !record.queued;
        record.user_paused = true;
        record.queued = false;
        record.slow_since = None;
        record.needs_resume_save = true;
        if engine_running {
            self.engine
                .pause_torrent(info_hash)
                .await
                .map_err(|err| SessionError::engine("pause_torrent", err))?;
        }
        info!(info_hash = %info_hash, "torrent paused");
        let _ = self.events.publish(Event::TorrentPaused { info_hash });
        self.queue_dirty = true;
        Ok(())
    }

    pub(super) async fn resume(&mut self, info_hash: InfoHash) -> SessionResult<()> {
        let queueing = self.settings.queueing_enabled;
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if !record.user_paused {
            return Ok(());
        }
        record.user_paused = false;
        record.share_limit_reached = false;
        record.needs_resume_save = true;
        if record.forced || !queueing {
            self.engine
                .resume_torrent(info_hash)
                .await
                .map_err(|err| SessionError::engine("resume_torrent", err))?;
        } else {
            record.queued = true;
        }
        info!(info_hash = %info_hash, "torrent resumed");
        let _ = self.events.publish(Event::TorrentResumed { info_hash });
        self.queue_dirty = true;
        Ok(())
    }

    pub(super) async fn set_force_start(
        &mut self,
        info_hash: InfoHash,
        forced: bool,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.forced == forced && !(forced && record.user_paused) {
            return Ok(());
        }
        record.forced = forced;
        record.needs_resume_save = true;
        self.engine
            .set_force_start(info_hash, forced)
            .await
            .map_err(|err| SessionError::engine("set_force_start", err))?;
        if forced {
            let was_paused = record.user_paused;
            let engine_paused = was_paused || record.queued;
            record.user_paused = false;
            record.share_limit_reached = false;
            record.queued = false;
            record.slow_since = None;
            if engine_paused {
                self.engine
                    .resume_torrent(info_hash)
                    .await
                    .map_err(|err| SessionError::engine("resume_torrent", err))?;
            }
            if was_paused {
                let _ = self.events.publish(Event::TorrentResumed { info_hash });
            }
        }
        info!(info_hash = %info_hash, forced, "torrent force start changed");
        self.queue_dirty = true;
        Ok(())
    }

    pub(super) async fn recheck(&mut self, info_hash: InfoHash) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.error.take().is_some() {
            debug!(info_hash = %info_hash, "error cleared by recheck");
        }
        record.file_error_reported = false;
        self.engine
            .force_recheck(info_hash)
            .await
            .map_err(|err| SessionError::engine("force_recheck", err))?;
        info!(info_hash = %info_hash, "torrent recheck requested");
        self.queue_dirty = true;
        Ok(())
    }

    /// Move a payload out of the temporary path into its save path.
    pub(super) async fn leave_temp_path(&mut self, info_hash: InfoHash) {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return;
        };
        if record.download_path.is_none() || record.moving {
            return;
        }
        record.moving = true;
        let target = record.save_path.clone();
        debug!(info_hash = %info_hash, save_path = %target, "moving payload out of temporary path");
        if let Err(err) = self.engine.move_storage(info_hash, target).await {
            record.moving = false;
            warn!(info_hash = %info_hash, error = %err, "storage move request failed");
        }
    }

    /// Point a torrent at a new save path and ask the engine to move the data.
    pub(super) async fn relocate(&mut self, info_hash: InfoHash, path: String) {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return;
        };
        if record.save_path == path {
            return;
        }
        record.save_path.clone_from(&path);
        record.needs_resume_save = true;
        let _ = self.events.publish(Event::TorrentSavePathChanged {
            info_hash,
            save_path: path.clone(),
        });
        if record.download_path.is_some() && !record.is_complete() {
            debug!(info_hash = %info_hash, "payload stays in temporary path until finished");
            return;
        }
        record.moving = true;
        record.error = None;
        if let Err(err) = self.engine.move_storage(info_hash, path).await {
            record.moving = false;
            warn!(info_hash = %info_hash, error = %err, "storage move request failed");
        }
    }
}
