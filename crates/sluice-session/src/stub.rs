//! In-memory transfer engine used by tests and local tooling.
//!
//! The stub answers every request with the alerts a real engine would raise,
//! queued until the next [`TransferEngine::poll_alerts`]. Clones share state,
//! so a test can keep one handle while the session owns another.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use sluice_events::InfoHash;
use sluice_torrent_core::{
    EngineAddRequest, EngineAlert, EnginePhase, EngineSettings, EngineTorrentStatus,
    MetricDescriptor, QueueMove, TrackerEntry, TransferEngine,
};

use crate::stats::REQUIRED_METRICS;

/// Request recorded by the stub, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    /// `add_torrent`.
    Add {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Requested save path.
        save_path: String,
        /// Created paused.
        paused: bool,
        /// Metadata-only fetch.
        metadata_only: bool,
    },
    /// `remove_torrent`.
    Remove {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Payload deletion requested.
        delete_files: bool,
    },
    /// `pause_torrent`.
    Pause(InfoHash),
    /// `resume_torrent`.
    Resume(InfoHash),
    /// `set_force_start`.
    ForceStart {
        /// Torrent identity.
        info_hash: InfoHash,
        /// New flag.
        forced: bool,
    },
    /// `move_storage`.
    MoveStorage {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Destination.
        path: String,
    },
    /// `replace_trackers`.
    ReplaceTrackers {
        /// Torrent identity.
        info_hash: InfoHash,
        /// New announce URLs in tier order.
        urls: Vec<String>,
    },
    /// `replace_url_seeds`.
    ReplaceUrlSeeds {
        /// Torrent identity.
        info_hash: InfoHash,
        /// New web seeds.
        urls: Vec<String>,
    },
    /// `force_recheck`.
    Recheck(InfoHash),
    /// `move_queue`.
    MoveQueue {
        /// Torrent identity.
        info_hash: InfoHash,
        /// Step applied.
        direction: QueueMove,
    },
    /// `request_resume_data`.
    RequestResumeData(InfoHash),
}

#[derive(Debug, Default)]
struct StubState {
    torrents: BTreeMap<InfoHash, EngineTorrentStatus>,
    paused: BTreeSet<InfoHash>,
    rejected: BTreeMap<InfoHash, String>,
    pending: Vec<EngineAlert>,
    calls: Vec<StubCall>,
    applied: Vec<EngineSettings>,
    stats_values: Option<Vec<i64>>,
}

/// Shared-state engine double.
#[derive(Debug, Clone)]
pub struct StubEngine {
    state: Arc<Mutex<StubState>>,
    schema: Vec<MetricDescriptor>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    /// Stub publishing every counter the session requires.
    #[must_use]
    pub fn new() -> Self {
        let schema = REQUIRED_METRICS
            .iter()
            .enumerate()
            .map(|(index, name)| MetricDescriptor {
                name: (*name).to_string(),
                index,
            })
            .collect();
        Self::with_schema(schema)
    }

    /// Stub publishing a custom metric schema.
    #[must_use]
    pub fn with_schema(schema: Vec<MetricDescriptor>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState::default())),
            schema,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an arbitrary alert for the next drain.
    pub fn push_alert(&self, alert: EngineAlert) {
        self.lock().pending.push(alert);
    }

    /// Replace the status reported for a torrent on the next torrent update.
    /// Statuses set before the add are kept when the torrent is created.
    pub fn set_status(&self, status: EngineTorrentStatus) {
        self.lock().torrents.insert(status.info_hash, status);
    }

    /// Make the next add of `info_hash` fail with `reason`.
    pub fn reject_add(&self, info_hash: InfoHash, reason: impl Into<String>) {
        self.lock().rejected.insert(info_hash, reason.into());
    }

    /// Counter values reported by session-stats alerts; zeros by default.
    pub fn set_stats_values(&self, values: Vec<i64>) {
        self.lock().stats_values = Some(values);
    }

    /// Every request seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StubCall> {
        self.lock().calls.clone()
    }

    /// Configurations applied so far.
    #[must_use]
    pub fn applied_settings(&self) -> Vec<EngineSettings> {
        self.lock().applied.clone()
    }

    /// Whether the torrent exists in the engine.
    #[must_use]
    pub fn has_torrent(&self, info_hash: &InfoHash) -> bool {
        self.lock().torrents.contains_key(info_hash)
    }

    /// Whether the engine currently holds the torrent paused.
    #[must_use]
    pub fn is_paused(&self, info_hash: &InfoHash) -> bool {
        self.lock().paused.contains(info_hash)
    }
}

#[async_trait]
impl TransferEngine for StubEngine {
    async fn add_torrent(&mut self, request: EngineAddRequest) -> Result<()> {
        let mut state = self.lock();
        let info_hash = request.descriptor.info_hash;
        state.calls.push(StubCall::Add {
            info_hash,
            save_path: request.save_path.clone(),
            paused: request.paused,
            metadata_only: request.metadata_only,
        });
        if let Some(reason) = state.rejected.remove(&info_hash) {
            state.pending.push(EngineAlert::AddResult {
                info_hash,
                error: Some(reason),
            });
            return Ok(());
        }
        if !request.metadata_only {
            let has_metadata = !request.descriptor.is_magnet();
            state.torrents.entry(info_hash).or_insert_with(|| {
                let mut status = EngineTorrentStatus::pending(info_hash, has_metadata);
                if has_metadata {
                    status.phase = EnginePhase::Downloading;
                }
                status
            });
            if request.paused {
                state.paused.insert(info_hash);
            } else {
                state.paused.remove(&info_hash);
            }
        }
        state.pending.push(EngineAlert::AddResult {
            info_hash,
            error: None,
        });
        Ok(())
    }

    async fn remove_torrent(&mut self, info_hash: InfoHash, delete_files: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::Remove {
            info_hash,
            delete_files,
        });
        state.torrents.remove(&info_hash);
        state.paused.remove(&info_hash);
        state.pending.push(EngineAlert::TorrentRemoved { info_hash });
        if delete_files {
            state.pending.push(EngineAlert::TorrentDeleted { info_hash });
        }
        Ok(())
    }

    async fn pause_torrent(&mut self, info_hash: InfoHash) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::Pause(info_hash));
        if !state.torrents.contains_key(&info_hash) {
            return Err(anyhow!("unknown torrent {info_hash}"));
        }
        if state.paused.insert(info_hash) {
            state.pending.push(EngineAlert::TorrentPaused { info_hash });
        }
        Ok(())
    }

    async fn resume_torrent(&mut self, info_hash: InfoHash) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::Resume(info_hash));
        if !state.torrents.contains_key(&info_hash) {
            return Err(anyhow!("unknown torrent {info_hash}"));
        }
        state.paused.remove(&info_hash);
        Ok(())
    }

    async fn set_force_start(&mut self, info_hash: InfoHash, forced: bool) -> Result<()> {
        self.lock().calls.push(StubCall::ForceStart { info_hash, forced });
        Ok(())
    }

    async fn move_storage(&mut self, info_hash: InfoHash, path: String) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::MoveStorage {
            info_hash,
            path: path.clone(),
        });
        state
            .pending
            .push(EngineAlert::StorageMoved { info_hash, path });
        Ok(())
    }

    async fn replace_trackers(
        &mut self,
        info_hash: InfoHash,
        trackers: Vec<TrackerEntry>,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::ReplaceTrackers {
            info_hash,
            urls: trackers.into_iter().map(|entry| entry.url).collect(),
        });
        if !state.torrents.contains_key(&info_hash) {
            return Err(anyhow!("unknown torrent {info_hash}"));
        }
        Ok(())
    }

    async fn replace_url_seeds(&mut self, info_hash: InfoHash, urls: Vec<String>) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(StubCall::ReplaceUrlSeeds { info_hash, urls });
        if !state.torrents.contains_key(&info_hash) {
            return Err(anyhow!("unknown torrent {info_hash}"));
        }
        Ok(())
    }

    async fn force_recheck(&mut self, info_hash: InfoHash) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::Recheck(info_hash));
        state.pending.push(EngineAlert::TorrentChecked { info_hash });
        Ok(())
    }

    async fn move_queue(&mut self, info_hash: InfoHash, direction: QueueMove) -> Result<()> {
        self.lock().calls.push(StubCall::MoveQueue {
            info_hash,
            direction,
        });
        Ok(())
    }

    async fn request_resume_data(&mut self, info_hash: InfoHash) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StubCall::RequestResumeData(info_hash));
        let Some(status) = state.torrents.get(&info_hash) else {
            state.pending.push(EngineAlert::ResumeDataFailed {
                info_hash,
                message: "unknown torrent".to_string(),
            });
            return Ok(());
        };
        let payload = json!({
            "info_hash": info_hash.to_hex(),
            "total_done": status.total_done,
            "all_time_upload": status.all_time_upload,
            "paused": state.paused.contains(&info_hash),
        })
        .to_string()
        .into_bytes();
        state
            .pending
            .push(EngineAlert::ResumeDataReady { info_hash, payload });
        Ok(())
    }

    async fn apply_settings(&mut self, settings: &EngineSettings) -> Result<()> {
        self.lock().applied.push(settings.clone());
        Ok(())
    }

    async fn post_torrent_updates(&mut self) -> Result<()> {
        let mut state = self.lock();
        let statuses: Vec<EngineTorrentStatus> = state.torrents.values().cloned().collect();
        if !statuses.is_empty() {
            state.pending.push(EngineAlert::StateUpdate { statuses });
        }
        Ok(())
    }

    async fn post_session_stats(&mut self) -> Result<()> {
        let slots = self
            .schema
            .iter()
            .map(|descriptor| descriptor.index + 1)
            .max()
            .unwrap_or(0);
        let mut state = self.lock();
        let values = state
            .stats_values
            .clone()
            .unwrap_or_else(|| vec![0; slots]);
        state.pending.push(EngineAlert::SessionStats { values });
        Ok(())
    }

    fn metric_schema(&self) -> Vec<MetricDescriptor> {
        self.schema.clone()
    }

    async fn poll_alerts(&mut self) -> Result<Vec<EngineAlert>> {
        Ok(std::mem::take(&mut self.lock().pending))
    }
}
