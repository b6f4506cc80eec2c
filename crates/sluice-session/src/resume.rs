//! Fast-resume persistence and the writer task that owns it.
//!
//! # Design
//! - One directory per session, guarded by an OS advisory lock on `.lock`.
//!   The lock dies with the process, so a file left behind by a crash does
//!   not block the next start. The owner's PID is cleared on drop.
//! - Each torrent has `<hash>.fastresume` (engine payload) and `<hash>.json`
//!   (session metadata); the queue order lives in `queue`.
//! - Writes go to a `.tmp` sibling and are renamed into place.
//! - The writer runs on its own task and reports every outcome back so the
//!   control task can retry failures on the next cycle.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_events::InfoHash;
use sluice_torrent_core::{ShareLimit, TorrentDescriptor, TrackerEntry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ResumeStoreError;

const LOCK_FILE: &str = ".lock";
const QUEUE_FILE: &str = "queue";
const FASTRESUME_EXT: &str = "fastresume";
const METADATA_EXT: &str = "json";

/// Session-side metadata stored next to each fast-resume payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredTorrent {
    pub(crate) descriptor: TorrentDescriptor,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) tags: BTreeSet<String>,
    pub(crate) save_path: String,
    #[serde(default)]
    pub(crate) download_path: Option<String>,
    pub(crate) auto_tmm: bool,
    #[serde(default)]
    pub(crate) paused: bool,
    #[serde(default)]
    pub(crate) forced: bool,
    #[serde(default)]
    pub(crate) ratio_limit: ShareLimit<f64>,
    #[serde(default)]
    pub(crate) seeding_time_limit: ShareLimit<i64>,
    #[serde(default)]
    pub(crate) trackers: Vec<TrackerEntry>,
    #[serde(default)]
    pub(crate) url_seeds: Vec<String>,
}

/// Everything persisted for one torrent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredResume {
    pub(crate) metadata: StoredTorrent,
    pub(crate) fastresume: Option<Vec<u8>>,
}

/// Lock-guarded resume directory.
#[derive(Debug)]
pub(crate) struct ResumeStore {
    dir: PathBuf,
    lock: File,
}

impl ResumeStore {
    /// Create the directory if needed and take its lock.
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self, ResumeStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ResumeStoreError::Io {
            operation: "create_dir",
            path: dir.clone(),
            source,
        })?;
        let lock = dir.join(LOCK_FILE);
        let io_error = |operation: &'static str| {
            let path = lock.clone();
            move |source| ResumeStoreError::Io {
                operation,
                path,
                source,
            }
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock)
            .map_err(io_error("open_lock"))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(ResumeStoreError::Locked { path: lock.clone() });
            }
            Err(TryLockError::Error(source)) => return Err(io_error("lock")(source)),
        }
        let previous = fs::read_to_string(&lock).unwrap_or_default();
        if !previous.trim().is_empty() {
            warn!(
                path = %lock.display(),
                previous_pid = %previous.trim(),
                "previous session did not shut down cleanly"
            );
        }
        file.set_len(0).map_err(io_error("write_lock"))?;
        writeln!(file, "{}", std::process::id()).map_err(io_error("write_lock"))?;
        Ok(Self { dir, lock: file })
    }

    fn path(&self, info_hash: &InfoHash, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{extension}", info_hash.to_hex()))
    }

    /// Persist payload and metadata for one torrent.
    pub(crate) fn save(
        &self,
        info_hash: &InfoHash,
        fastresume: &[u8],
        metadata: &StoredTorrent,
    ) -> Result<(), ResumeStoreError> {
        let metadata_path = self.path(info_hash, METADATA_EXT);
        let encoded =
            serde_json::to_vec_pretty(metadata).map_err(|source| ResumeStoreError::Json {
                path: metadata_path.clone(),
                source,
            })?;
        write_atomic(&self.path(info_hash, FASTRESUME_EXT), fastresume)?;
        write_atomic(&metadata_path, &encoded)
    }

    /// Forget a torrent; missing files are not an error.
    pub(crate) fn delete(&self, info_hash: &InfoHash) -> Result<(), ResumeStoreError> {
        for extension in [FASTRESUME_EXT, METADATA_EXT] {
            let path = self.path(info_hash, extension);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ResumeStoreError::Io {
                        operation: "remove",
                        path,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Persist the queue order, one hex hash per line.
    pub(crate) fn save_queue(&self, order: &[InfoHash]) -> Result<(), ResumeStoreError> {
        let mut body = String::with_capacity(order.len() * 41);
        for info_hash in order {
            body.push_str(&info_hash.to_hex());
            body.push('\n');
        }
        write_atomic(&self.dir.join(QUEUE_FILE), body.as_bytes())
    }

    /// Stored queue order; unreadable lines are skipped.
    pub(crate) fn load_queue(&self) -> Vec<InfoHash> {
        let path = self.dir.join(QUEUE_FILE);
        match fs::read_to_string(&path) {
            Ok(body) => body
                .lines()
                .filter_map(|line| line.parse::<InfoHash>().ok())
                .collect(),
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read queue file");
                Vec::new()
            }
        }
    }

    /// Every stored torrent plus warnings for entries that were skipped.
    pub(crate) fn load_all(
        &self,
    ) -> Result<(Vec<(InfoHash, StoredResume)>, Vec<String>), ResumeStoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ResumeStoreError::Io {
            operation: "read_dir",
            path: self.dir.clone(),
            source,
        })?;

        let mut stored = Vec::new();
        let mut warnings = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            let Some(info_hash) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<InfoHash>().ok())
            else {
                warnings.push(format!("ignoring unexpected file {}", path.display()));
                continue;
            };
            let metadata = match read_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warnings.push(format!("skipping {}: {err}", path.display()));
                    continue;
                }
            };
            if metadata.descriptor.info_hash != info_hash {
                warnings.push(format!(
                    "skipping {}: descriptor hash does not match file name",
                    path.display()
                ));
                continue;
            }
            let fastresume = fs::read(self.path(&info_hash, FASTRESUME_EXT)).ok();
            if fastresume.is_none() {
                warnings.push(format!("fastresume payload missing for {info_hash}"));
            }
            stored.push((
                info_hash,
                StoredResume {
                    metadata,
                    fastresume,
                },
            ));
        }
        stored.sort_by_key(|(info_hash, _)| *info_hash);
        Ok((stored, warnings))
    }
}

impl Drop for ResumeStore {
    fn drop(&mut self) {
        if let Err(err) = self.lock.set_len(0) {
            warn!(dir = %self.dir.display(), error = %err, "failed to clear resume lock owner");
        }
    }
}

fn read_metadata(path: &Path) -> Result<StoredTorrent, ResumeStoreError> {
    let bytes = fs::read(path).map_err(|source| ResumeStoreError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ResumeStoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ResumeStoreError> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|source| ResumeStoreError::Io {
        operation: "write",
        path: tmp.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(ResumeStoreError::Io {
            operation: "rename",
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Work handed to the writer task.
#[derive(Debug)]
pub(crate) enum ResumeJob {
    Save {
        info_hash: InfoHash,
        fastresume: Vec<u8>,
        metadata: Box<StoredTorrent>,
    },
    Delete {
        info_hash: InfoHash,
    },
    SaveQueue {
        order: Vec<InfoHash>,
    },
}

/// Which job a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobTarget {
    Save(InfoHash),
    Delete(InfoHash),
    Queue,
}

impl JobTarget {
    fn of(job: &ResumeJob) -> Self {
        match job {
            ResumeJob::Save { info_hash, .. } => Self::Save(*info_hash),
            ResumeJob::Delete { info_hash } => Self::Delete(*info_hash),
            ResumeJob::SaveQueue { .. } => Self::Queue,
        }
    }
}

/// Result reported back to the control task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResumeOutcome {
    Written,
    Failed { target: JobTarget, error: String },
}

/// Spawn the writer; it exits once every job sender is dropped and the queue
/// has been drained.
pub(crate) fn spawn_writer(
    store: Arc<ResumeStore>,
    mut jobs: mpsc::UnboundedReceiver<ResumeJob>,
    outcomes: mpsc::UnboundedSender<ResumeOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let target = JobTarget::of(&job);
            let store = Arc::clone(&store);
            let result = tokio::task::spawn_blocking(move || run_job(&store, job)).await;
            let outcome = match result {
                Ok(Ok(())) => ResumeOutcome::Written,
                Ok(Err(err)) => ResumeOutcome::Failed {
                    target,
                    error: error_chain(&err),
                },
                Err(err) => ResumeOutcome::Failed {
                    target,
                    error: err.to_string(),
                },
            };
            if outcomes.send(outcome).is_err() {
                debug!("resume outcome receiver dropped");
            }
        }
        debug!("resume writer stopped");
    })
}

fn run_job(store: &ResumeStore, job: ResumeJob) -> Result<(), ResumeStoreError> {
    match job {
        ResumeJob::Save {
            info_hash,
            fastresume,
            metadata,
        } => store.save(&info_hash, &fastresume, &metadata),
        ResumeJob::Delete { info_hash } => store.delete(&info_hash),
        ResumeJob::SaveQueue { order } => store.save_queue(&order),
    }
}

fn error_chain(err: &ResumeStoreError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sluice_events::INFO_HASH_LEN;
    use tempfile::TempDir;

    fn metadata(byte: u8) -> StoredTorrent {
        let info_hash = InfoHash::new([byte; INFO_HASH_LEN]);
        StoredTorrent {
            descriptor: TorrentDescriptor::magnet(info_hash, format!("magnet:?xt={byte}")),
            name: format!("t{byte}"),
            category: "Movies".to_string(),
            tags: BTreeSet::from(["hd".to_string()]),
            save_path: "/data/movies".to_string(),
            download_path: None,
            auto_tmm: true,
            paused: true,
            forced: false,
            ratio_limit: ShareLimit::Limit(1.5),
            seeding_time_limit: ShareLimit::NoLimit,
            trackers: vec![TrackerEntry::new("udp://tracker.example:6969", 0)],
            url_seeds: Vec::new(),
        }
    }

    #[test]
    fn second_open_reports_lock() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ResumeStore::open(dir.path())?;
        assert!(matches!(
            ResumeStore::open(dir.path()),
            Err(ResumeStoreError::Locked { .. })
        ));
        drop(store);
        let reopened = ResumeStore::open(dir.path());
        assert!(reopened.is_ok());
        Ok(())
    }

    #[test]
    fn stale_lock_file_is_taken_over() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join(LOCK_FILE), "999999\n")?;
        let store = ResumeStore::open(dir.path())?;
        let owner = fs::read_to_string(dir.path().join(LOCK_FILE))?;
        assert_eq!(owner.trim(), std::process::id().to_string());
        drop(store);
        assert!(fs::read_to_string(dir.path().join(LOCK_FILE))?.is_empty());
        assert!(ResumeStore::open(dir.path()).is_ok());
        Ok(())
    }

    #[test]
    fn saved_torrents_load_back_without_temp_files() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ResumeStore::open(dir.path())?;
        let first = metadata(1);
        let second = metadata(2);
        store.save(&first.descriptor.info_hash, b"resume-1", &first)?;
        store.save(&second.descriptor.info_hash, b"resume-2", &second)?;
        store.delete(&second.descriptor.info_hash)?;
        store.delete(&second.descriptor.info_hash)?;

        let (stored, warnings) = store.load_all()?;
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.metadata, first);
        assert_eq!(stored[0].1.fastresume.as_deref(), Some(&b"resume-1"[..]));

        let leftovers = fs::read_dir(dir.path())?
            .flatten()
            .filter(|entry| entry.path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn malformed_metadata_is_skipped_with_warning() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ResumeStore::open(dir.path())?;
        let hash = InfoHash::new([3; INFO_HASH_LEN]);
        fs::write(dir.path().join(format!("{}.json", hash.to_hex())), b"{not json")?;
        fs::write(dir.path().join("notes.json"), b"{}")?;
        let (stored, warnings) = store.load_all()?;
        assert!(stored.is_empty());
        assert_eq!(warnings.len(), 2);
        Ok(())
    }

    #[test]
    fn queue_order_is_persisted() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ResumeStore::open(dir.path())?;
        assert!(store.load_queue().is_empty());
        let order = vec![
            InfoHash::new([9; INFO_HASH_LEN]),
            InfoHash::new([4; INFO_HASH_LEN]),
        ];
        store.save_queue(&order)?;
        assert_eq!(store.load_queue(), order);
        Ok(())
    }

    #[tokio::test]
    async fn writer_reports_each_job() -> Result<()> {
        let dir = TempDir::new()?;
        let store = Arc::new(ResumeStore::open(dir.path())?);
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, mut outcomes_rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(Arc::clone(&store), jobs_rx, outcomes_tx);

        let stored = metadata(5);
        jobs_tx.send(ResumeJob::Save {
            info_hash: stored.descriptor.info_hash,
            fastresume: b"payload".to_vec(),
            metadata: Box::new(stored),
        })?;
        jobs_tx.send(ResumeJob::SaveQueue { order: Vec::new() })?;
        drop(jobs_tx);
        writer.await?;

        assert_eq!(outcomes_rx.recv().await, Some(ResumeOutcome::Written));
        assert_eq!(outcomes_rx.recv().await, Some(ResumeOutcome::Written));
        assert_eq!(store.load_all()?.0.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_delete_names_its_torrent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = Arc::new(ResumeStore::open(dir.path())?);
        let info_hash = InfoHash::new([6; INFO_HASH_LEN]);
        fs::create_dir(dir.path().join(format!("{}.{FASTRESUME_EXT}", info_hash.to_hex())))?;
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, mut outcomes_rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(Arc::clone(&store), jobs_rx, outcomes_tx);

        jobs_tx.send(ResumeJob::Delete { info_hash })?;
        drop(jobs_tx);
        writer.await?;

        match outcomes_rx.recv().await {
            Some(ResumeOutcome::Failed { target, error }) => {
                assert_eq!(target, JobTarget::Delete(info_hash));
                assert!(error.starts_with("resume store io failed"), "{error}");
            }
            other => panic!("expected a failed delete, got {other:?}"),
        }
        Ok(())
    }
}
