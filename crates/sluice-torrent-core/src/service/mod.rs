//! Transfer engine boundary implemented by adapters.

use async_trait::async_trait;
use sluice_events::InfoHash;

use crate::alert::{EngineAlert, MetricDescriptor};
use crate::model::{EngineAddRequest, EngineSettings, QueueMove, TrackerEntry};

/// Operations the session issues against the underlying transfer engine.
///
/// Calls return once the request has been handed to the engine; outcomes are
/// reported later through [`TransferEngine::poll_alerts`].
#[async_trait]
pub trait TransferEngine: Send {
    /// Create a torrent (or a metadata-only fetch).
    async fn add_torrent(&mut self, request: EngineAddRequest) -> anyhow::Result<()>;

    /// Destroy a torrent, optionally deleting its payload.
    async fn remove_torrent(&mut self, info_hash: InfoHash, delete_files: bool)
    -> anyhow::Result<()>;

    /// Stop transferring.
    async fn pause_torrent(&mut self, info_hash: InfoHash) -> anyhow::Result<()>;

    /// Start transferring.
    async fn resume_torrent(&mut self, info_hash: InfoHash) -> anyhow::Result<()>;

    /// Toggle force start.
    async fn set_force_start(&mut self, info_hash: InfoHash, forced: bool) -> anyhow::Result<()>;

    /// Relocate payload storage.
    async fn move_storage(&mut self, info_hash: InfoHash, path: String) -> anyhow::Result<()>;

    /// Replace the torrent's tracker list.
    async fn replace_trackers(
        &mut self,
        info_hash: InfoHash,
        trackers: Vec<TrackerEntry>,
    ) -> anyhow::Result<()>;

    /// Replace the torrent's web seeds.
    async fn replace_url_seeds(&mut self, info_hash: InfoHash, urls: Vec<String>)
    -> anyhow::Result<()>;

    /// Re-verify payload on disk.
    async fn force_recheck(&mut self, info_hash: InfoHash) -> anyhow::Result<()>;

    /// Reposition a torrent in the engine's queue.
    async fn move_queue(&mut self, info_hash: InfoHash, direction: QueueMove)
    -> anyhow::Result<()>;

    /// Ask for a fast-resume payload; answered with a resume-data alert.
    async fn request_resume_data(&mut self, info_hash: InfoHash) -> anyhow::Result<()>;

    /// Replace the engine configuration.
    async fn apply_settings(&mut self, settings: &EngineSettings) -> anyhow::Result<()>;

    /// Ask for a state-update alert covering changed torrents.
    async fn post_torrent_updates(&mut self) -> anyhow::Result<()>;

    /// Ask for a session-stats alert.
    async fn post_session_stats(&mut self) -> anyhow::Result<()>;

    /// Names and slots of the counters carried by session-stats alerts.
    fn metric_schema(&self) -> Vec<MetricDescriptor>;

    /// Drain every queued alert in engine order.
    async fn poll_alerts(&mut self) -> anyhow::Result<Vec<EngineAlert>>;
}
