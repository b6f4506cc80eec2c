//! Control task owning the registry, taxonomy and status snapshot.
//!
//! # Design
//! - Every mutation happens on this task in response to a command or a timer
//!   tick; nothing else touches the registry.
//! - A record that is `queued` is paused in the engine; queue enforcement only
//!   talks to the engine on transitions.
//! - Settings changes mark the configuration dirty and are applied once at the
//!   end of the loop iteration, so a burst of writes costs one engine apply.
//! - Resume data is written by a separate task; outcomes come back on a
//!   channel and failures are retried on the next cycle.

#![allow(clippy::redundant_pub_crate)]

mod dispatch;
mod labels;
mod queueing;
mod torrents;
mod trackers;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sluice_config::{SessionSettings, SettingsStore, store_all_time_totals};
use sluice_events::{Event, EventBus, InfoHash};
use sluice_telemetry::{Metrics, TORRENT_STATE_BUCKETS};
use sluice_torrent_core::{
    AddTorrentParams, EngineSettings, IpRange, StatusSnapshot, TorrentStatusReport,
    TransferEngine,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::adapter::EngineSettingsPlan;
use crate::command::SessionCommand;
use crate::error::SessionError;
use crate::registry::{Registry, TorrentRecord};
use crate::resume::{
    self, JobTarget, ResumeJob, ResumeOutcome, ResumeStore, StoredResume, StoredTorrent,
};
use crate::session::SessionActivity;
use crate::stats::{NetworkCounters, StatsTracker};
use crate::taxonomy::Taxonomy;

const MIN_TICK: Duration = Duration::from_millis(10);
const SHUTDOWN_RESUME_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);
const RESUME_FAILURE_THRESHOLD: u32 = 3;

/// Everything the control task needs, prepared by `Session::start`.
pub(crate) struct WorkerSetup {
    pub(crate) events: EventBus,
    pub(crate) engine: Box<dyn TransferEngine>,
    pub(crate) store: Arc<dyn SettingsStore>,
    pub(crate) metrics: Metrics,
    pub(crate) stats: StatsTracker,
    pub(crate) taxonomy: Taxonomy,
    pub(crate) resume: Arc<ResumeStore>,
    pub(crate) restore: Vec<(InfoHash, StoredResume)>,
    pub(crate) restore_order: Vec<InfoHash>,
}

pub(crate) fn spawn(setup: WorkerSetup, mut commands: mpsc::Receiver<SessionCommand>) {
    tokio::spawn(async move {
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
        let writer = resume::spawn_writer(Arc::clone(&setup.resume), job_rx, outcome_tx);
        let mut settings_rx = setup.store.watch();
        let restore = setup.restore;
        let mut worker = Worker::new(
            setup.events,
            setup.engine,
            setup.store,
            setup.metrics,
            setup.stats,
            setup.taxonomy,
            jobs,
        );
        worker.restore_order = setup.restore_order;
        drop(setup.resume);

        let settings = worker.settings.clone();
        let mut alerts = ticker(settings.alert_poll_interval, false);
        let mut refresh = ticker(settings.refresh_interval, false);
        let mut share_limits = ticker(settings.share_limit_check_interval, true);
        let resume_enabled = !settings.save_resume_data_interval.is_zero();
        let mut resume_cycle = ticker(settings.save_resume_data_interval, true);
        let mut settings_open = true;

        worker.settle().await;
        worker.restore(restore).await;

        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown { respond_to }) => {
                            shutdown_reply = Some(respond_to);
                            break;
                        }
                        Some(command) => worker.handle(command).await,
                        None => break,
                    }
                }
                _ = alerts.tick() => worker.drain_alerts().await,
                _ = refresh.tick() => worker.refresh().await,
                _ = share_limits.tick() => worker.enforce_share_limits().await,
                _ = resume_cycle.tick(), if resume_enabled => worker.save_resume_data().await,
                changed = settings_rx.changed(), if settings_open => {
                    if changed.is_ok() {
                        worker.config_dirty = true;
                    } else {
                        settings_open = false;
                    }
                }
                Some(outcome) = outcomes.recv() => worker.record_outcome(outcome),
            }
            worker.settle().await;
        }

        worker.shutdown().await;
        if let Err(err) = writer.await {
            warn!(error = %err, "resume writer terminated abnormally");
        }
        while let Ok(outcome) = outcomes.try_recv() {
            worker.record_outcome(outcome);
        }
        drop(commands);
        drop(worker);
        info!("session stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    });
}

fn ticker(period: Duration, delay_first: bool) -> tokio::time::Interval {
    let period = period.max(MIN_TICK);
    let mut ticker = if delay_first {
        interval_at(Instant::now() + period, period)
    } else {
        interval(period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Addition acknowledged by the caller but not yet by the engine.
#[derive(Debug)]
struct PendingAdd {
    record: TorrentRecord,
    from_resume: bool,
}

/// Metadata-only fetch in flight.
#[derive(Debug, Default)]
struct MetadataFetch {
    /// The engine's add result for the fetch has been seen.
    acknowledged: bool,
}

/// Snapshot taken when a removal is requested.
#[derive(Debug)]
struct RemovingTorrent {
    name: String,
    save_path: String,
    delete_files: bool,
}

struct Worker {
    events: EventBus,
    engine: Box<dyn TransferEngine>,
    store: Arc<dyn SettingsStore>,
    metrics: Metrics,
    settings: SessionSettings,
    last_applied: Option<EngineSettings>,
    config_dirty: bool,
    queue_dirty: bool,
    ip_filter_rules: Vec<IpRange>,
    registry: Registry,
    taxonomy: Taxonomy,
    pending_adds: HashMap<InfoHash, PendingAdd>,
    pending_urls: HashMap<String, AddTorrentParams>,
    metadata_loads: HashMap<InfoHash, MetadataFetch>,
    stale_add_results: HashMap<InfoHash, usize>,
    removing: HashMap<InfoHash, RemovingTorrent>,
    stats: StatsTracker,
    snapshot: StatusSnapshot,
    network: NetworkCounters,
    health: BTreeSet<String>,
    resume_jobs: Option<mpsc::UnboundedSender<ResumeJob>>,
    resume_failures: u32,
    awaiting_resume: HashSet<InfoHash>,
    failed_deletes: HashSet<InfoHash>,
    restore_order: Vec<InfoHash>,
}

impl Worker {
    fn new(
        events: EventBus,
        engine: Box<dyn TransferEngine>,
        store: Arc<dyn SettingsStore>,
        metrics: Metrics,
        stats: StatsTracker,
        taxonomy: Taxonomy,
        resume_jobs: mpsc::UnboundedSender<ResumeJob>,
    ) -> Self {
        let settings = SessionSettings::load(store.as_ref());
        Self {
            events,
            engine,
            store,
            metrics,
            settings,
            last_applied: None,
            config_dirty: true,
            queue_dirty: false,
            ip_filter_rules: Vec::new(),
            registry: Registry::default(),
            taxonomy,
            pending_adds: HashMap::new(),
            pending_urls: HashMap::new(),
            metadata_loads: HashMap::new(),
            stale_add_results: HashMap::new(),
            removing: HashMap::new(),
            stats,
            snapshot: StatusSnapshot::default(),
            network: NetworkCounters::default(),
            health: BTreeSet::new(),
            resume_jobs: Some(resume_jobs),
            resume_failures: 0,
            awaiting_resume: HashSet::new(),
            failed_deletes: HashSet::new(),
            restore_order: Vec::new(),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::AddTorrent {
                source,
                params,
                respond_to,
            } => {
                let result = self.add_torrent(source, *params).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::UrlDownloadFinished {
                url,
                result,
                respond_to,
            } => {
                let result = self.url_download_finished(url, result).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveTorrent {
                info_hash,
                delete_files,
                respond_to,
            } => {
                let result = self.remove_torrent(info_hash, delete_files).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::LoadMetadata {
                descriptor,
                respond_to,
            } => {
                let result = self.load_metadata(descriptor).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::CancelLoadMetadata {
                info_hash,
                respond_to,
            } => {
                let result = self.cancel_load_metadata(info_hash).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Pause {
                info_hash,
                respond_to,
            } => {
                let result = self.pause(info_hash).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Resume {
                info_hash,
                respond_to,
            } => {
                let result = self.resume(info_hash).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::SetForceStart {
                info_hash,
                forced,
                respond_to,
            } => {
                let result = self.set_force_start(info_hash, forced).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Recheck {
                info_hash,
                respond_to,
            } => {
                let result = self.recheck(info_hash).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Reposition {
                targets,
                direction,
                respond_to,
            } => {
                self.reposition(&targets, direction).await;
                let _ = respond_to.send(Ok(()));
            }
            SessionCommand::SetCategory {
                info_hash,
                category,
                respond_to,
            } => {
                let result = self.set_category(info_hash, category).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::AddTorrentTag {
                info_hash,
                tag,
                respond_to,
            } => {
                let result = self.add_torrent_tag(info_hash, &tag);
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveTorrentTag {
                info_hash,
                tag,
                respond_to,
            } => {
                let result = self.remove_torrent_tag(info_hash, &tag);
                let _ = respond_to.send(result);
            }
            SessionCommand::SetAutoTmm {
                info_hash,
                enabled,
                respond_to,
            } => {
                let result = self.set_auto_tmm(info_hash, enabled).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::MoveStorage {
                info_hash,
                path,
                respond_to,
            } => {
                let result = self.move_storage(info_hash, &path).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::SetShareLimits {
                info_hash,
                ratio_limit,
                seeding_time_limit,
                respond_to,
            } => {
                let result = self.set_share_limits(info_hash, ratio_limit, seeding_time_limit);
                let _ = respond_to.send(result);
            }
            SessionCommand::AddTrackers {
                info_hash,
                trackers,
                respond_to,
            } => {
                let result = self.add_trackers(info_hash, trackers).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveTrackers {
                info_hash,
                urls,
                respond_to,
            } => {
                let result = self.remove_trackers(info_hash, urls).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::EditTracker {
                info_hash,
                old_url,
                new_url,
                respond_to,
            } => {
                let result = self.edit_tracker(info_hash, &old_url, &new_url).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::AddUrlSeeds {
                info_hash,
                urls,
                respond_to,
            } => {
                let result = self.add_url_seeds(info_hash, urls).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveUrlSeeds {
                info_hash,
                urls,
                respond_to,
            } => {
                let result = self.remove_url_seeds(info_hash, urls).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::AddCategory {
                name,
                save_path,
                respond_to,
            } => {
                let result = self.add_category(&name, &save_path);
                let _ = respond_to.send(result);
            }
            SessionCommand::EditCategory {
                name,
                save_path,
                respond_to,
            } => {
                let result = self.edit_category(&name, &save_path).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveCategory { name, respond_to } => {
                let result = self.remove_category(&name).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::AddTag { tag, respond_to } => {
                let result = self.add_tag(&tag);
                let _ = respond_to.send(result);
            }
            SessionCommand::RemoveTag { tag, respond_to } => {
                let result = self.remove_tag(&tag);
                let _ = respond_to.send(result);
            }
            SessionCommand::BanIp { ip, respond_to } => {
                let result = self.ban_ip(&ip);
                let _ = respond_to.send(result);
            }
            SessionCommand::ApplyIpFilter { result, respond_to } => {
                self.apply_ip_filter(result);
                let _ = respond_to.send(Ok(()));
            }
            SessionCommand::Torrent {
                info_hash,
                respond_to,
            } => {
                let view = self
                    .registry
                    .view(&info_hash)
                    .ok_or(SessionError::NotFound { info_hash });
                let _ = respond_to.send(view);
            }
            SessionCommand::Torrents { respond_to } => {
                let views = self
                    .registry
                    .hashes()
                    .iter()
                    .filter_map(|info_hash| self.registry.view(info_hash))
                    .collect();
                let _ = respond_to.send(Ok(views));
            }
            SessionCommand::Queue { respond_to } => {
                let _ = respond_to.send(Ok(self.registry.queue().to_vec()));
            }
            SessionCommand::Categories { respond_to } => {
                let _ = respond_to.send(Ok(self.taxonomy.categories().clone()));
            }
            SessionCommand::Tags { respond_to } => {
                let _ = respond_to.send(Ok(self.taxonomy.tags().clone()));
            }
            SessionCommand::Status { respond_to } => {
                let _ = respond_to.send(Ok(self.snapshot.clone()));
            }
            SessionCommand::Network { respond_to } => {
                let _ = respond_to.send(Ok(self.network.clone()));
            }
            SessionCommand::Activity { respond_to } => {
                let _ = respond_to.send(Ok(self.activity()));
            }
            SessionCommand::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    /// Deferred work run once at the end of every loop iteration.
    async fn settle(&mut self) {
        if self.config_dirty {
            self.configure().await;
        }
        if self.queue_dirty {
            self.enforce_queue().await;
        }
    }

    async fn configure(&mut self) {
        self.config_dirty = false;
        let previous = std::mem::replace(
            &mut self.settings,
            SessionSettings::load(self.store.as_ref()),
        );
        self.apply_setting_side_effects(&previous).await;
        self.queue_dirty = true;

        let plan = EngineSettingsPlan::from_settings(&self.settings, &self.ip_filter_rules);
        for warning in &plan.warnings {
            warn!(warning = %warning, "engine settings adjusted");
        }
        if self.last_applied.as_ref() == Some(&plan.settings) {
            debug!("engine settings unchanged");
            return;
        }
        match self.engine.apply_settings(&plan.settings).await {
            Ok(()) => {
                self.metrics.inc_engine_apply();
                self.mark_recovered("engine_settings");
                let description = describe_settings(&plan.settings);
                info!(settings = %description, "engine settings applied");
                self.last_applied = Some(plan.settings);
                let _ = self.events.publish(Event::SettingsChanged { description });
            }
            Err(err) => {
                let detail = err.to_string();
                self.mark_degraded("engine_settings", Some(&detail));
            }
        }
    }

    async fn apply_setting_side_effects(&mut self, previous: &SessionSettings) {
        if previous.default_save_path != self.settings.default_save_path {
            self.default_save_path_changed().await;
        }
        if previous.temp_path_enabled && !self.settings.temp_path_enabled {
            let in_temp: Vec<InfoHash> = self
                .registry
                .records()
                .filter(|record| record.download_path.is_some())
                .map(TorrentRecord::info_hash)
                .collect();
            for info_hash in in_temp {
                self.leave_temp_path(info_hash).await;
            }
        }
        if self.settings.subcategories_enabled && !previous.subcategories_enabled {
            let created = self.taxonomy.add_missing_parents();
            if !created.is_empty() {
                self.persist_taxonomy();
                for name in created {
                    let _ = self.events.publish(Event::CategoryAdded { name });
                }
            }
        }
        let limits_changed = previous.global_max_ratio.to_bits()
            != self.settings.global_max_ratio.to_bits()
            || previous.global_max_seeding_minutes != self.settings.global_max_seeding_minutes
            || previous.max_ratio_action != self.settings.max_ratio_action;
        if limits_changed {
            for record in self.registry.records_mut() {
                record.share_limit_reached = false;
            }
        }
    }

    async fn refresh(&mut self) {
        if let Err(err) = self.engine.post_torrent_updates().await {
            let detail = err.to_string();
            self.mark_degraded("engine_updates", Some(&detail));
        } else {
            self.mark_recovered("engine_updates");
        }
        if let Err(err) = self.engine.post_session_stats().await {
            let detail = err.to_string();
            self.mark_degraded("engine_stats", Some(&detail));
        } else {
            self.mark_recovered("engine_stats");
        }
        self.track_slow_torrents(std::time::Instant::now());
        for record in self.registry.records_mut() {
            record.file_error_reported = false;
        }
        self.queue_dirty = true;
        self.rebuild_snapshot();
    }

    fn rebuild_snapshot(&mut self) {
        let mut report = TorrentStatusReport::default();
        let mut queued = 0_usize;
        for record in self.registry.records() {
            let state = record.state();
            report.downloading += usize::from(state.is_downloading());
            report.seeding += usize::from(state.is_uploading());
            report.completed += usize::from(state.is_completed());
            report.active += usize::from(state.is_active());
            report.paused += usize::from(state.is_paused());
            report.errored += usize::from(state.is_errored());
            queued += usize::from(state.is_queued());
        }
        let total = self.registry.len();
        report.inactive = total - report.active;
        report.resumed = total - report.paused;

        self.snapshot = StatusSnapshot {
            torrents: report,
            session: self.stats.session(),
            cache: self.stats.cache(),
            refreshed_at: Utc::now(),
        };

        let buckets = [
            report.downloading,
            report.seeding,
            report.completed,
            report.active,
            report.inactive,
            report.paused,
            report.resumed,
            report.errored,
        ];
        for (state, count) in TORRENT_STATE_BUCKETS.iter().zip(buckets) {
            self.metrics.set_torrents(state, gauge_value(count));
        }
        self.metrics.set_queued_torrents(gauge_value(queued));
        let session = &self.snapshot.session;
        self.metrics.set_transfer_rates(
            gauge_value(session.payload_download_rate),
            gauge_value(session.payload_upload_rate),
        );
        self.metrics.set_peers_connected(gauge_value(session.peers_count));
        self.metrics.set_dht_nodes(gauge_value(session.dht_nodes));
        let _ = self.events.publish(Event::StatsUpdated);
    }

    fn activity(&self) -> SessionActivity {
        SessionActivity {
            has_active_torrents: self
                .registry
                .records()
                .any(|record| record.state().is_active()),
            has_unfinished_torrents: self.has_unfinished_torrents(),
            has_running_seed: self
                .registry
                .records()
                .any(|record| {
                    record.is_complete() && !record.user_paused && record.error.is_none()
                }),
        }
    }

    fn has_unfinished_torrents(&self) -> bool {
        self.registry.records().any(|record| {
            !record.is_complete()
                && !record.finish_announced
                && !record.user_paused
                && record.error.is_none()
        })
    }

    async fn restore(&mut self, stored: Vec<(InfoHash, StoredResume)>) {
        if stored.is_empty() {
            return;
        }
        let mut by_hash: HashMap<InfoHash, StoredResume> = stored.into_iter().collect();
        let mut order: Vec<InfoHash> = self
            .restore_order
            .iter()
            .filter(|info_hash| by_hash.contains_key(info_hash))
            .copied()
            .collect();
        let mut rest: Vec<InfoHash> = by_hash
            .keys()
            .filter(|info_hash| !order.contains(info_hash))
            .copied()
            .collect();
        rest.sort_unstable();
        order.extend(rest);

        info!(count = order.len(), "restoring torrents from resume data");
        for info_hash in order {
            if let Some(stored) = by_hash.remove(&info_hash) {
                self.restore_torrent(stored).await;
            }
        }
    }

    async fn save_resume_data(&mut self) {
        for info_hash in self.registry.hashes() {
            let wanted = self
                .registry
                .get(&info_hash)
                .is_some_and(|record| record.needs_resume_save);
            if !wanted || self.awaiting_resume.contains(&info_hash) {
                continue;
            }
            match self.engine.request_resume_data(info_hash).await {
                Ok(()) => {
                    self.awaiting_resume.insert(info_hash);
                }
                Err(err) => {
                    warn!(info_hash = %info_hash, error = %err, "resume data request failed");
                }
            }
        }
        self.retry_failed_deletes();
        self.send_resume_job(ResumeJob::SaveQueue {
            order: self.registry.queue().to_vec(),
        });
    }

    /// Resend deletions the writer could not complete; a torrent added back
    /// under the same hash keeps its files.
    fn retry_failed_deletes(&mut self) {
        let retries: Vec<InfoHash> = self.failed_deletes.drain().collect();
        for info_hash in retries {
            if self.registry.contains(&info_hash) || self.pending_adds.contains_key(&info_hash) {
                continue;
            }
            debug!(info_hash = %info_hash, "retrying resume data removal");
            self.send_resume_job(ResumeJob::Delete { info_hash });
        }
    }

    fn stored_metadata(record: &TorrentRecord) -> StoredTorrent {
        StoredTorrent {
            descriptor: record.descriptor.clone(),
            name: record.name.clone(),
            category: record.category.clone(),
            tags: record.tags.clone(),
            save_path: record.save_path.clone(),
            download_path: record.download_path.clone(),
            auto_tmm: record.auto_tmm,
            paused: record.user_paused,
            forced: record.forced,
            ratio_limit: record.ratio_limit,
            seeding_time_limit: record.seeding_time_limit,
            trackers: record.trackers.clone(),
            url_seeds: record.url_seeds.clone(),
        }
    }

    fn send_resume_job(&mut self, job: ResumeJob) {
        let Some(jobs) = &self.resume_jobs else {
            debug!("resume writer already closed");
            return;
        };
        if jobs.send(job).is_err() {
            self.resume_jobs = None;
            self.mark_degraded("resume_store", Some("resume writer stopped"));
        }
    }

    fn record_outcome(&mut self, outcome: ResumeOutcome) {
        match outcome {
            ResumeOutcome::Written => {
                self.resume_failures = 0;
                self.mark_recovered("resume_store");
            }
            ResumeOutcome::Failed { target, error } => {
                self.metrics.inc_resume_write_failure();
                self.resume_failures += 1;
                match target {
                    JobTarget::Save(info_hash) => {
                        if let Some(record) = self.registry.get_mut(&info_hash) {
                            record.needs_resume_save = true;
                        }
                    }
                    JobTarget::Delete(info_hash) => {
                        self.failed_deletes.insert(info_hash);
                    }
                    JobTarget::Queue => {}
                }
                warn!(
                    job = ?target,
                    error = %error,
                    failures = self.resume_failures,
                    "resume data write failed"
                );
                if self.resume_failures >= RESUME_FAILURE_THRESHOLD {
                    self.mark_degraded("resume_store", Some(&error));
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        for info_hash in self.registry.hashes() {
            match self.engine.request_resume_data(info_hash).await {
                Ok(()) => {
                    self.awaiting_resume.insert(info_hash);
                }
                Err(err) => {
                    warn!(info_hash = %info_hash, error = %err, "resume data request failed");
                }
            }
        }

        let deadline = Instant::now() + SHUTDOWN_RESUME_TIMEOUT;
        while !self.awaiting_resume.is_empty() && Instant::now() < deadline {
            self.drain_alerts().await;
            if !self.awaiting_resume.is_empty() {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        }
        if !self.awaiting_resume.is_empty() {
            warn!(
                pending = self.awaiting_resume.len(),
                "resume data not received before shutdown"
            );
        }

        self.retry_failed_deletes();
        self.send_resume_job(ResumeJob::SaveQueue {
            order: self.registry.queue().to_vec(),
        });
        store_all_time_totals(self.store.as_ref(), self.stats.all_time());
        self.resume_jobs = None;
    }

    fn persist_taxonomy(&self) {
        sluice_config::store_categories(self.store.as_ref(), self.taxonomy.categories());
        sluice_config::store_tags(self.store.as_ref(), self.taxonomy.tags());
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        let inserted = self.health.insert(component.to_string());
        if inserted {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            let _ = self.events.publish(Event::HealthChanged { degraded });
            if let Some(detail) = detail {
                warn!(
                    component = component,
                    detail = %detail,
                    "session component degraded"
                );
            } else {
                warn!(component = component, "session component degraded");
            }
        } else if let Some(detail) = detail {
            warn!(
                component = component,
                detail = %detail,
                "session component still degraded"
            );
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.health.remove(component) {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            let _ = self.events.publish(Event::HealthChanged { degraded });
            info!(component = component, "session component recovered");
        }
    }
}

fn describe_settings(settings: &EngineSettings) -> String {
    let listen = settings
        .listen
        .as_ref()
        .map_or_else(|| "unchanged".to_string(), |listen| listen.interfaces.join(","));
    let limit = |value: Option<u64>| value.map_or_else(|| "unlimited".to_string(), |v| v.to_string());
    format!(
        "listen={listen} download_limit={} upload_limit={} dht={} ip_filter_rules={}",
        limit(settings.download_rate_limit),
        limit(settings.upload_rate_limit),
        settings.dht,
        settings.ip_filter.len()
    )
}

fn gauge_value<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}
