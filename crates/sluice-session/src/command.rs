//! Requests carried from the public handle to the control task.

use std::collections::{BTreeMap, BTreeSet};

use sluice_events::InfoHash;
use sluice_torrent_core::{
    AddSource, AddTorrentParams, IpRange, QueueMove, ShareLimit, StatusSnapshot, TorrentDescriptor,
    TrackerEntry,
};
use tokio::sync::oneshot;

use crate::error::SessionResult;
use crate::registry::TorrentView;
use crate::session::SessionActivity;
use crate::stats::NetworkCounters;

/// Reply channel for a command.
pub(crate) type Reply<T> = oneshot::Sender<SessionResult<T>>;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    AddTorrent {
        source: AddSource,
        params: Box<AddTorrentParams>,
        respond_to: Reply<()>,
    },
    UrlDownloadFinished {
        url: String,
        result: Result<TorrentDescriptor, String>,
        respond_to: Reply<()>,
    },
    RemoveTorrent {
        info_hash: InfoHash,
        delete_files: bool,
        respond_to: Reply<()>,
    },
    LoadMetadata {
        descriptor: TorrentDescriptor,
        respond_to: Reply<()>,
    },
    CancelLoadMetadata {
        info_hash: InfoHash,
        respond_to: Reply<bool>,
    },
    Pause {
        info_hash: InfoHash,
        respond_to: Reply<()>,
    },
    Resume {
        info_hash: InfoHash,
        respond_to: Reply<()>,
    },
    SetForceStart {
        info_hash: InfoHash,
        forced: bool,
        respond_to: Reply<()>,
    },
    Recheck {
        info_hash: InfoHash,
        respond_to: Reply<()>,
    },
    Reposition {
        targets: Vec<InfoHash>,
        direction: QueueMove,
        respond_to: Reply<()>,
    },
    SetCategory {
        info_hash: InfoHash,
        category: String,
        respond_to: Reply<()>,
    },
    AddTorrentTag {
        info_hash: InfoHash,
        tag: String,
        respond_to: Reply<bool>,
    },
    RemoveTorrentTag {
        info_hash: InfoHash,
        tag: String,
        respond_to: Reply<bool>,
    },
    SetAutoTmm {
        info_hash: InfoHash,
        enabled: bool,
        respond_to: Reply<()>,
    },
    MoveStorage {
        info_hash: InfoHash,
        path: String,
        respond_to: Reply<()>,
    },
    SetShareLimits {
        info_hash: InfoHash,
        ratio_limit: ShareLimit<f64>,
        seeding_time_limit: ShareLimit<i64>,
        respond_to: Reply<()>,
    },
    AddTrackers {
        info_hash: InfoHash,
        trackers: Vec<TrackerEntry>,
        respond_to: Reply<()>,
    },
    RemoveTrackers {
        info_hash: InfoHash,
        urls: Vec<String>,
        respond_to: Reply<()>,
    },
    EditTracker {
        info_hash: InfoHash,
        old_url: String,
        new_url: String,
        respond_to: Reply<()>,
    },
    AddUrlSeeds {
        info_hash: InfoHash,
        urls: Vec<String>,
        respond_to: Reply<()>,
    },
    RemoveUrlSeeds {
        info_hash: InfoHash,
        urls: Vec<String>,
        respond_to: Reply<()>,
    },
    AddCategory {
        name: String,
        save_path: String,
        respond_to: Reply<()>,
    },
    EditCategory {
        name: String,
        save_path: String,
        respond_to: Reply<()>,
    },
    RemoveCategory {
        name: String,
        respond_to: Reply<()>,
    },
    AddTag {
        tag: String,
        respond_to: Reply<()>,
    },
    RemoveTag {
        tag: String,
        respond_to: Reply<()>,
    },
    BanIp {
        ip: String,
        respond_to: Reply<()>,
    },
    ApplyIpFilter {
        result: Result<Vec<IpRange>, String>,
        respond_to: Reply<()>,
    },
    Torrent {
        info_hash: InfoHash,
        respond_to: Reply<TorrentView>,
    },
    Torrents {
        respond_to: Reply<Vec<TorrentView>>,
    },
    Queue {
        respond_to: Reply<Vec<InfoHash>>,
    },
    Categories {
        respond_to: Reply<BTreeMap<String, String>>,
    },
    Tags {
        respond_to: Reply<BTreeSet<String>>,
    },
    Status {
        respond_to: Reply<StatusSnapshot>,
    },
    Network {
        respond_to: Reply<NetworkCounters>,
    },
    Activity {
        respond_to: Reply<SessionActivity>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}
