//! Public handle for the session control task.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use sluice_config::{SettingValue, SettingsStore, keys};
use sluice_events::{EventBus, EventId, EventStream, InfoHash};
use sluice_telemetry::Metrics;
use sluice_torrent_core::{
    AddSource, AddTorrentParams, IpRange, QueueMove, ShareLimit, StatusSnapshot,
    TorrentDescriptor, TrackerEntry, TransferEngine,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::command::{Reply, SessionCommand};
use crate::error::{SessionError, SessionResult};
use crate::registry::TorrentView;
use crate::resume::ResumeStore;
use crate::stats::{MetricIndices, NetworkCounters, StatsTracker};
use crate::taxonomy::Taxonomy;
use crate::worker::{self, WorkerSetup};

const COMMAND_BUFFER: usize = 128;

/// Startup options that are not runtime settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding fast-resume payloads, metadata and the queue file.
    pub resume_dir: PathBuf,
}

/// Aggregate activity flags used for shutdown and power management decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionActivity {
    /// Any torrent is transferring or checking.
    pub has_active_torrents: bool,
    /// A downloading torrent has not finished yet.
    pub has_unfinished_torrents: bool,
    /// A complete torrent is still running.
    pub has_running_seed: bool,
}

/// Cloneable handle; every call is executed on the control task.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<SessionCommand>,
    events: EventBus,
    store: Arc<dyn SettingsStore>,
}

impl Session {
    /// Open the resume store, resolve the engine's metric schema and spawn the
    /// control task. Stored torrents are restored in queue order.
    ///
    /// # Errors
    ///
    /// Fails when the resume directory is locked or unusable, or when the
    /// engine does not publish a counter the status snapshot depends on.
    pub fn start(
        config: SessionConfig,
        engine: Box<dyn TransferEngine>,
        store: Arc<dyn SettingsStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> SessionResult<Self> {
        let resume = ResumeStore::open(config.resume_dir.clone())
            .map_err(|source| SessionError::ResumeStore { source })?;
        let indices = MetricIndices::resolve(&engine.metric_schema())?;

        let taxonomy = Taxonomy::from_persisted(
            sluice_config::load_categories(store.as_ref()),
            sluice_config::load_tags(store.as_ref()),
        );
        let stats = StatsTracker::new(indices, sluice_config::load_all_time_totals(store.as_ref()));

        let (restore, warnings) = resume
            .load_all()
            .map_err(|source| SessionError::ResumeStore { source })?;
        for warning in &warnings {
            warn!(warning = %warning, "resume entry skipped");
        }
        let restore_order = resume.load_queue();
        info!(
            resume_dir = %config.resume_dir.display(),
            stored = restore.len(),
            "session starting"
        );

        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        worker::spawn(
            WorkerSetup {
                events: events.clone(),
                engine,
                store: Arc::clone(&store),
                metrics,
                stats,
                taxonomy,
                resume: Arc::new(resume),
                restore,
                restore_order,
            },
            rx,
        );

        Ok(Self {
            commands,
            events,
            store,
        })
    }

    /// Event bus carrying session notifications.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to notifications, replaying anything after `since`.
    #[must_use]
    pub fn subscribe(&self, since: Option<EventId>) -> EventStream {
        self.events.subscribe(since)
    }

    /// Queue a torrent for addition. Parsed descriptors go straight to the
    /// engine; URL sources wait for [`Session::url_download_finished`].
    ///
    /// # Errors
    ///
    /// Rejects duplicates, pending URLs and unknown categories or tags.
    pub async fn add_torrent(
        &self,
        source: impl Into<AddSource>,
        params: AddTorrentParams,
    ) -> SessionResult<()> {
        let source = source.into();
        self.request(|respond_to| SessionCommand::AddTorrent {
            source,
            params: Box::new(params),
            respond_to,
        })
        .await
    }

    /// Complete a URL add with the downloaded descriptor or the failure reason.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownUrl`] when no add is pending for `url`,
    /// or any validation error of the resumed add.
    pub async fn url_download_finished(
        &self,
        url: impl Into<String>,
        result: Result<TorrentDescriptor, String>,
    ) -> SessionResult<()> {
        let url = url.into();
        self.request(|respond_to| SessionCommand::UrlDownloadFinished {
            url,
            result,
            respond_to,
        })
        .await
    }

    /// Remove a torrent; it disappears immediately while the engine tears it down.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn remove_torrent(&self, info_hash: InfoHash, delete_files: bool) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::RemoveTorrent {
            info_hash,
            delete_files,
            respond_to,
        })
        .await
    }

    /// Fetch metadata for a magnet without adding the torrent.
    ///
    /// # Errors
    ///
    /// Rejects non-magnet descriptors and torrents that already exist.
    pub async fn load_metadata(&self, descriptor: TorrentDescriptor) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::LoadMetadata {
            descriptor,
            respond_to,
        })
        .await
    }

    /// Abandon a metadata fetch; returns whether one was in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn cancel_load_metadata(&self, info_hash: InfoHash) -> SessionResult<bool> {
        self.request(|respond_to| SessionCommand::CancelLoadMetadata {
            info_hash,
            respond_to,
        })
        .await
    }

    /// Pause a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn pause(&self, info_hash: InfoHash) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::Pause {
            info_hash,
            respond_to,
        })
        .await
    }

    /// Resume a torrent, subject to queueing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn resume(&self, info_hash: InfoHash) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::Resume {
            info_hash,
            respond_to,
        })
        .await
    }

    /// Toggle force start, which bypasses queueing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn set_force_start(&self, info_hash: InfoHash, forced: bool) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::SetForceStart {
            info_hash,
            forced,
            respond_to,
        })
        .await
    }

    /// Re-verify payload on disk, clearing any file error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn recheck(&self, info_hash: InfoHash) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::Recheck {
            info_hash,
            respond_to,
        })
        .await
    }

    /// Move torrents within the download queue. Hashes outside the queue are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn reposition(&self, targets: Vec<InfoHash>, direction: QueueMove) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::Reposition {
            targets,
            direction,
            respond_to,
        })
        .await
    }

    /// Assign a category; empty means uncategorized.
    ///
    /// # Errors
    ///
    /// Rejects unknown categories and unknown torrents.
    pub async fn set_category(
        &self,
        info_hash: InfoHash,
        category: impl Into<String>,
    ) -> SessionResult<()> {
        let category = category.into();
        self.request(|respond_to| SessionCommand::SetCategory {
            info_hash,
            category,
            respond_to,
        })
        .await
    }

    /// Attach an existing tag; returns `false` when already attached.
    ///
    /// # Errors
    ///
    /// Rejects unknown tags and unknown torrents.
    pub async fn add_torrent_tag(
        &self,
        info_hash: InfoHash,
        tag: impl Into<String>,
    ) -> SessionResult<bool> {
        let tag = tag.into();
        self.request(|respond_to| SessionCommand::AddTorrentTag {
            info_hash,
            tag,
            respond_to,
        })
        .await
    }

    /// Detach a tag; returns `false` when it was not attached.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn remove_torrent_tag(
        &self,
        info_hash: InfoHash,
        tag: impl Into<String>,
    ) -> SessionResult<bool> {
        let tag = tag.into();
        self.request(|respond_to| SessionCommand::RemoveTorrentTag {
            info_hash,
            tag,
            respond_to,
        })
        .await
    }

    /// Switch automatic torrent management on or off.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn set_auto_tmm(&self, info_hash: InfoHash, enabled: bool) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::SetAutoTmm {
            info_hash,
            enabled,
            respond_to,
        })
        .await
    }

    /// Relocate payload manually; the torrent leaves automatic mode.
    ///
    /// # Errors
    ///
    /// Rejects empty paths and unknown torrents.
    pub async fn move_storage(&self, info_hash: InfoHash, path: impl Into<String>) -> SessionResult<()> {
        let path = path.into();
        self.request(|respond_to| SessionCommand::MoveStorage {
            info_hash,
            path,
            respond_to,
        })
        .await
    }

    /// Override the ratio and seeding-time limits of one torrent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn set_share_limits(
        &self,
        info_hash: InfoHash,
        ratio_limit: ShareLimit<f64>,
        seeding_time_limit: ShareLimit<i64>,
    ) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::SetShareLimits {
            info_hash,
            ratio_limit,
            seeding_time_limit,
            respond_to,
        })
        .await
    }

    /// Append trackers; URLs already present are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents and
    /// [`SessionError::InvalidUrl`] for blank URLs.
    pub async fn add_trackers(
        &self,
        info_hash: InfoHash,
        trackers: Vec<TrackerEntry>,
    ) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::AddTrackers {
            info_hash,
            trackers,
            respond_to,
        })
        .await
    }

    /// Drop trackers by URL; unknown URLs are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn remove_trackers(&self, info_hash: InfoHash, urls: Vec<String>) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::RemoveTrackers {
            info_hash,
            urls,
            respond_to,
        })
        .await
    }

    /// Replace one tracker URL, keeping its tier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TrackerNotFound`] when `old_url` is not
    /// attached and [`SessionError::TrackerExists`] when `new_url` already is.
    pub async fn edit_tracker(
        &self,
        info_hash: InfoHash,
        old_url: impl Into<String>,
        new_url: impl Into<String>,
    ) -> SessionResult<()> {
        let old_url = old_url.into();
        let new_url = new_url.into();
        self.request(|respond_to| SessionCommand::EditTracker {
            info_hash,
            old_url,
            new_url,
            respond_to,
        })
        .await
    }

    /// Append web seeds; URLs already present are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents and
    /// [`SessionError::InvalidUrl`] for blank URLs.
    pub async fn add_url_seeds(&self, info_hash: InfoHash, urls: Vec<String>) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::AddUrlSeeds {
            info_hash,
            urls,
            respond_to,
        })
        .await
    }

    /// Drop web seeds by URL.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn remove_url_seeds(
        &self,
        info_hash: InfoHash,
        urls: Vec<String>,
    ) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::RemoveUrlSeeds {
            info_hash,
            urls,
            respond_to,
        })
        .await
    }

    /// Create a category; an empty save path derives one from the default path.
    ///
    /// # Errors
    ///
    /// Rejects invalid or existing names.
    pub async fn add_category(
        &self,
        name: impl Into<String>,
        save_path: impl Into<String>,
    ) -> SessionResult<()> {
        let (name, save_path) = (name.into(), save_path.into());
        self.request(|respond_to| SessionCommand::AddCategory {
            name,
            save_path,
            respond_to,
        })
        .await
    }

    /// Change a category's save path and cascade it to automatic-mode members.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CategoryNotFound`] for unknown categories.
    pub async fn edit_category(
        &self,
        name: impl Into<String>,
        save_path: impl Into<String>,
    ) -> SessionResult<()> {
        let (name, save_path) = (name.into(), save_path.into());
        self.request(|respond_to| SessionCommand::EditCategory {
            name,
            save_path,
            respond_to,
        })
        .await
    }

    /// Delete a category and its subcategories.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CategoryNotFound`] for unknown categories.
    pub async fn remove_category(&self, name: impl Into<String>) -> SessionResult<()> {
        let name = name.into();
        self.request(|respond_to| SessionCommand::RemoveCategory { name, respond_to })
            .await
    }

    /// Create a global tag.
    ///
    /// # Errors
    ///
    /// Rejects invalid or existing tags.
    pub async fn add_tag(&self, tag: impl Into<String>) -> SessionResult<()> {
        let tag = tag.into();
        self.request(|respond_to| SessionCommand::AddTag { tag, respond_to })
            .await
    }

    /// Delete a global tag and detach it everywhere.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TagNotFound`] for unknown tags.
    pub async fn remove_tag(&self, tag: impl Into<String>) -> SessionResult<()> {
        let tag = tag.into();
        self.request(|respond_to| SessionCommand::RemoveTag { tag, respond_to })
            .await
    }

    /// Add an address to the banned list.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidIp`] when `ip` does not parse.
    pub async fn ban_ip(&self, ip: impl Into<String>) -> SessionResult<()> {
        let ip = ip.into();
        self.request(|respond_to| SessionCommand::BanIp { ip, respond_to })
            .await
    }

    /// Install externally parsed IP filter rules, or clear them on a parse failure.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn apply_ip_filter(&self, result: Result<Vec<IpRange>, String>) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::ApplyIpFilter { result, respond_to })
            .await
    }

    /// Toggle the alternative global speed limits.
    pub fn set_alt_limits_enabled(&self, enabled: bool) {
        self.store
            .set(keys::ALT_LIMITS_ENABLED, SettingValue::Bool(enabled));
    }

    /// Change the default save path; automatic-mode torrents follow it.
    pub fn set_default_save_path(&self, path: impl Into<String>) {
        self.store
            .set(keys::DEFAULT_SAVE_PATH, SettingValue::String(path.into()));
    }

    /// Current view of one torrent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown torrents.
    pub async fn torrent(&self, info_hash: InfoHash) -> SessionResult<TorrentView> {
        self.request(|respond_to| SessionCommand::Torrent {
            info_hash,
            respond_to,
        })
        .await
    }

    /// Views of every registered torrent, ordered by hash.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn torrents(&self) -> SessionResult<Vec<TorrentView>> {
        self.request(|respond_to| SessionCommand::Torrents { respond_to })
            .await
    }

    /// Download queue, front first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn queue(&self) -> SessionResult<Vec<InfoHash>> {
        self.request(|respond_to| SessionCommand::Queue { respond_to })
            .await
    }

    /// Categories and their explicit save paths.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn categories(&self) -> SessionResult<BTreeMap<String, String>> {
        self.request(|respond_to| SessionCommand::Categories { respond_to })
            .await
    }

    /// Global tag set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn tags(&self) -> SessionResult<BTreeSet<String>> {
        self.request(|respond_to| SessionCommand::Tags { respond_to })
            .await
    }

    /// Most recent status snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn status(&self) -> SessionResult<StatusSnapshot> {
        self.request(|respond_to| SessionCommand::Status { respond_to })
            .await
    }

    /// Listen, port mapping and peer filtering counters.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn network(&self) -> SessionResult<NetworkCounters> {
        self.request(|respond_to| SessionCommand::Network { respond_to })
            .await
    }

    /// Aggregate activity flags.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after shutdown.
    pub async fn activity(&self) -> SessionResult<SessionActivity> {
        self.request(|respond_to| SessionCommand::Activity { respond_to })
            .await
    }

    /// Flush resume data and stop the control task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when the task had already stopped.
    pub async fn shutdown(&self) -> SessionResult<()> {
        let (respond_to, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Shutdown { respond_to })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (respond_to, rx) = oneshot::channel();
        self.commands
            .send(build(respond_to))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}
