use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use sluice_config::{MemorySettingsStore, SettingValue, SettingsStore, keys};
use sluice_events::{Event, EventBus, EventStream, INFO_HASH_LEN, InfoHash, TorrentState};
use sluice_session::{
    ResumeStoreError, Session, SessionConfig, SessionError, StubCall, StubEngine, TrackerStatus,
};
use sluice_telemetry::Metrics;
use sluice_torrent_core::{
    AddSource, AddTorrentParams, EngineAlert, EnginePhase, EngineTorrentStatus, FileErrorKind,
    QueueMove, TorrentDescriptor, TrackerEntry,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

fn hash(byte: u8) -> InfoHash {
    InfoHash::new([byte; INFO_HASH_LEN])
}

fn descriptor(byte: u8) -> TorrentDescriptor {
    TorrentDescriptor::metainfo(hash(byte), format!("torrent-{byte}"), vec![b'd', b'e'])
}

fn fast_store(overrides: &[(&str, SettingValue)]) -> Arc<MemorySettingsStore> {
    let store = MemorySettingsStore::new();
    store.set(keys::ALERT_POLL_INTERVAL_MS, SettingValue::Int(5));
    store.set(keys::REFRESH_INTERVAL_MS, SettingValue::Int(20));
    store.set(keys::SHARE_LIMIT_CHECK_INTERVAL_SECS, SettingValue::Int(0));
    store.set(keys::SAVE_RESUME_DATA_INTERVAL_MINS, SettingValue::Int(0));
    for (key, value) in overrides {
        store.set(key, value.clone());
    }
    Arc::new(store)
}

struct Harness {
    session: Session,
    engine: StubEngine,
    store: Arc<MemorySettingsStore>,
    events: EventStream,
    _resume_dir: TempDir,
}

impl Harness {
    fn start(overrides: &[(&str, SettingValue)]) -> Result<Self> {
        let resume_dir = TempDir::new()?;
        let store = fast_store(overrides);
        let engine = StubEngine::new();
        let session = start_session(&resume_dir, engine.clone(), Arc::clone(&store))?;
        let events = session.subscribe(None);
        Ok(Self {
            session,
            engine,
            store,
            events,
            _resume_dir: resume_dir,
        })
    }

    async fn add(&mut self, byte: u8, params: AddTorrentParams) -> Result<()> {
        self.session.add_torrent(descriptor(byte), params).await?;
        let info_hash = hash(byte);
        wait_for(&mut self.events, |event| {
            matches!(event, Event::TorrentAdded { info_hash: added, .. } if *added == info_hash)
        })
        .await?;
        Ok(())
    }
}

fn start_session(
    resume_dir: &TempDir,
    engine: StubEngine,
    store: Arc<MemorySettingsStore>,
) -> Result<Session> {
    let store: Arc<dyn SettingsStore> = store;
    Ok(Session::start(
        SessionConfig {
            resume_dir: resume_dir.path().to_path_buf(),
        },
        Box::new(engine),
        store,
        EventBus::new(),
        Metrics::new()?,
    )?)
}

async fn wait_for(stream: &mut EventStream, matches: impl Fn(&Event) -> bool) -> Result<Event> {
    timeout(WAIT, async {
        while let Some(envelope) = stream.next().await {
            if matches(&envelope.event) {
                return Some(envelope.event);
            }
        }
        None
    })
    .await
    .context("timed out waiting for event")?
    .ok_or_else(|| anyhow!("event stream closed"))
}

async fn eventually<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    timeout(WAIT, async {
        loop {
            if check().await? {
                return Ok::<(), anyhow::Error>(());
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("condition not reached in time")?
}

fn seeding_status(byte: u8) -> EngineTorrentStatus {
    let mut status = EngineTorrentStatus::pending(hash(byte), true);
    status.phase = EnginePhase::Seeding;
    status.total_size = 400;
    status.total_wanted = 400;
    status.total_wanted_done = 400;
    status.total_done = 400;
    status.all_time_download = 400;
    status.all_time_upload = 1_000;
    status
}

#[tokio::test]
async fn category_save_path_applies_to_automatic_adds() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness
        .session
        .add_category("Movies", "/data/movies")
        .await?;
    harness
        .add(
            1,
            AddTorrentParams {
                category: "Movies".to_string(),
                auto_tmm: Some(true),
                ..AddTorrentParams::default()
            },
        )
        .await?;

    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(view.category, "Movies");
    assert_eq!(view.save_path, "/data/movies");
    assert!(view.auto_tmm);
    assert!(harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::Add { save_path, .. } if save_path == "/data/movies"
    )));
    Ok(())
}

#[tokio::test]
async fn active_download_limit_queues_the_tail() -> Result<()> {
    let mut harness = Harness::start(&[(keys::MAX_ACTIVE_DOWNLOADS, SettingValue::Int(2))])?;
    for byte in 1..=3 {
        harness.add(byte, AddTorrentParams::default()).await?;
    }

    let session = harness.session.clone();
    eventually(|| {
        let session = session.clone();
        async move {
            let tail = session.torrent(hash(3)).await?.state;
            let first = session.torrent(hash(1)).await?.state;
            let second = session.torrent(hash(2)).await?.state;
            Ok::<bool, anyhow::Error>(
                tail == TorrentState::QueuedDownloading
                    && !first.is_queued()
                    && !second.is_queued(),
            )
        }
    })
    .await?;
    assert!(!harness.engine.is_paused(&hash(1)));
    assert!(!harness.engine.is_paused(&hash(2)));
    assert!(harness.engine.is_paused(&hash(3)));

    let mut positions = Vec::new();
    for byte in 1..=3 {
        positions.push(harness.session.torrent(hash(byte)).await?.queue_position);
    }
    assert_eq!(positions, [Some(1), Some(2), Some(3)]);
    Ok(())
}

#[tokio::test]
async fn queue_positions_stay_contiguous() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    for byte in 1..=4 {
        harness.add(byte, AddTorrentParams::default()).await?;
    }

    harness
        .session
        .reposition(vec![hash(4), hash(9)], QueueMove::Top)
        .await?;
    harness
        .session
        .reposition(vec![hash(1)], QueueMove::Bottom)
        .await?;
    assert_eq!(
        harness.session.queue().await?,
        [hash(4), hash(2), hash(3), hash(1)]
    );

    harness.session.remove_torrent(hash(2), false).await?;
    let queue = harness.session.queue().await?;
    assert_eq!(queue, [hash(4), hash(3), hash(1)]);
    for (index, info_hash) in queue.iter().enumerate() {
        let view = harness.session.torrent(*info_hash).await?;
        assert_eq!(view.queue_position, Some(index + 1));
    }
    Ok(())
}

#[tokio::test]
async fn share_limit_crossing_pauses_exactly_once() -> Result<()> {
    let mut harness = Harness::start(&[
        (keys::GLOBAL_MAX_RATIO, SettingValue::Float(2.0)),
        (keys::MAX_RATIO_ACTION, SettingValue::String("pause".to_string())),
    ])?;
    harness.engine.set_status(seeding_status(1));
    harness.add(1, AddTorrentParams::default()).await?;

    wait_for(&mut harness.events, |event| {
        matches!(event, Event::TorrentPaused { info_hash } if *info_hash == hash(1))
    })
    .await?;
    sleep(Duration::from_millis(200)).await;

    let pauses = harness
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::TorrentPaused { .. }))
        .count();
    assert_eq!(pauses, 0, "share limit action repeated");
    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(view.state, TorrentState::PausedUploading);
    Ok(())
}

#[tokio::test]
async fn identical_settings_apply_once() -> Result<()> {
    let harness = Harness::start(&[])?;
    let engine = harness.engine.clone();
    eventually(|| {
        let engine = engine.clone();
        async move { Ok::<bool, anyhow::Error>(!engine.applied_settings().is_empty()) }
    })
    .await?;

    harness
        .store
        .set(keys::DHT_ENABLED, SettingValue::Bool(true));
    harness.session.queue().await?;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.applied_settings().len(), 1);

    harness
        .store
        .set(keys::GLOBAL_DOWNLOAD_LIMIT, SettingValue::Int(4_096));
    harness
        .store
        .set(keys::GLOBAL_UPLOAD_LIMIT, SettingValue::Int(2_048));
    harness.store.set(keys::DHT_ENABLED, SettingValue::Bool(false));
    eventually(|| {
        let engine = engine.clone();
        async move { Ok::<bool, anyhow::Error>(engine.applied_settings().len() == 2) }
    })
    .await?;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.applied_settings().len(), 2);

    harness
        .store
        .set(keys::GLOBAL_DOWNLOAD_LIMIT, SettingValue::Int(4_096));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.applied_settings().len(), 2);
    Ok(())
}

#[tokio::test]
async fn duplicate_and_unknown_label_adds_are_rejected() -> Result<()> {
    let harness = Harness::start(&[])?;
    harness
        .session
        .add_torrent(descriptor(1), AddTorrentParams::default())
        .await?;
    let duplicate = harness
        .session
        .add_torrent(descriptor(1), AddTorrentParams::default())
        .await;
    assert!(matches!(duplicate, Err(SessionError::AlreadyExists { .. })));

    let unknown = harness
        .session
        .add_torrent(
            descriptor(2),
            AddTorrentParams {
                category: "Nope".to_string(),
                ..AddTorrentParams::default()
            },
        )
        .await;
    assert!(matches!(unknown, Err(SessionError::CategoryNotFound { .. })));

    let adds = harness
        .engine
        .calls()
        .iter()
        .filter(|call| matches!(call, StubCall::Add { .. }))
        .count();
    assert_eq!(adds, 1);
    Ok(())
}

#[tokio::test]
async fn engine_rejection_creates_no_record() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness.engine.reject_add(hash(5), "bad metainfo");
    harness
        .session
        .add_torrent(descriptor(5), AddTorrentParams::default())
        .await?;
    let event = wait_for(&mut harness.events, |event| {
        matches!(event, Event::AddTorrentFailed { .. })
    })
    .await?;
    assert!(matches!(event, Event::AddTorrentFailed { reason, .. } if reason == "bad metainfo"));
    assert!(matches!(
        harness.session.torrent(hash(5)).await,
        Err(SessionError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn removal_hides_the_torrent_immediately() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness.add(1, AddTorrentParams::default()).await?;

    harness.session.remove_torrent(hash(1), true).await?;
    assert!(matches!(
        harness.session.remove_torrent(hash(1), true).await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(harness.session.torrents().await?.is_empty());
    assert!(harness.engine.calls().contains(&StubCall::Remove {
        info_hash: hash(1),
        delete_files: true,
    }));
    Ok(())
}

#[tokio::test]
async fn category_and_tag_removal_cascade() -> Result<()> {
    let mut harness = Harness::start(&[(keys::SUBCATEGORIES_ENABLED, SettingValue::Bool(true))])?;
    harness.session.add_category("Linux/Ubuntu", "").await?;
    assert_eq!(
        harness.session.categories().await?.keys().collect::<Vec<_>>(),
        ["Linux", "Linux/Ubuntu"]
    );
    harness.session.add_tag("iso").await?;
    harness
        .add(
            1,
            AddTorrentParams {
                category: "Linux/Ubuntu".to_string(),
                tags: BTreeSet::from(["iso".to_string()]),
                auto_tmm: Some(true),
                ..AddTorrentParams::default()
            },
        )
        .await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(view.save_path, "/downloads/Linux/Ubuntu");

    harness.session.remove_category("Linux").await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert!(view.category.is_empty());
    assert_eq!(view.save_path, "/downloads");
    assert!(harness.session.categories().await?.is_empty());

    harness.session.remove_tag("iso").await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert!(view.tags.is_empty());
    assert!(harness.session.tags().await?.is_empty());
    wait_for(&mut harness.events, |event| {
        matches!(event, Event::TagRemoved { tag } if tag == "iso")
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn file_errors_park_the_torrent_until_recheck() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness.add(1, AddTorrentParams::default()).await?;
    harness.engine.push_alert(EngineAlert::FileError {
        info_hash: hash(1),
        path: "/downloads/torrent-1/a.bin".to_string(),
        kind: FileErrorKind::NotFound,
        message: "no such file".to_string(),
    });
    wait_for(&mut harness.events, |event| {
        matches!(event, Event::FileError { .. })
    })
    .await?;
    assert_eq!(
        harness.session.torrent(hash(1)).await?.state,
        TorrentState::MissingFiles
    );

    harness.session.recheck(hash(1)).await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert!(view.error.is_none());
    assert!(!view.state.is_errored());
    Ok(())
}

#[tokio::test]
async fn url_adds_wait_for_the_download() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    let url = "https://example.org/debian.torrent";
    harness
        .session
        .add_torrent(
            AddSource::Url {
                url: url.to_string(),
            },
            AddTorrentParams::default(),
        )
        .await?;
    assert!(matches!(
        harness
            .session
            .add_torrent(
                AddSource::Url {
                    url: url.to_string(),
                },
                AddTorrentParams::default(),
            )
            .await,
        Err(SessionError::UrlPending { .. })
    ));

    harness
        .session
        .url_download_finished(url, Err("404".to_string()))
        .await?;
    wait_for(&mut harness.events, |event| {
        matches!(event, Event::UrlDownloadFailed { reason, .. } if reason == "404")
    })
    .await?;
    assert!(matches!(
        harness.session.url_download_finished(url, Ok(descriptor(1))).await,
        Err(SessionError::UnknownUrl { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn metadata_fetch_reports_and_discards() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    let magnet = TorrentDescriptor::magnet(hash(7), "magnet:?xt=urn:btih:0707");
    harness.session.load_metadata(magnet.clone()).await?;
    assert!(matches!(
        harness.session.load_metadata(magnet).await,
        Err(SessionError::AlreadyExists { .. })
    ));
    harness.engine.push_alert(EngineAlert::MetadataReceived {
        info_hash: hash(7),
        name: "fetched".to_string(),
        total_size: 1_024,
        metadata: vec![b'd', b'e'],
    });
    let event = wait_for(&mut harness.events, |event| {
        matches!(event, Event::MetadataLoaded { .. })
    })
    .await?;
    assert!(matches!(event, Event::MetadataLoaded { name, .. } if name == "fetched"));
    assert!(!harness.session.cancel_load_metadata(hash(7)).await?);
    assert!(harness.session.torrents().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn resume_directory_is_exclusive() -> Result<()> {
    let dir = TempDir::new()?;
    let _first = start_session(&dir, StubEngine::new(), fast_store(&[]))?;
    let second = start_session(&dir, StubEngine::new(), fast_store(&[]));
    let Err(err) = second else {
        return Err(anyhow!("second session on a locked directory started"));
    };
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::ResumeStore {
            source: ResumeStoreError::Locked { .. }
        })
    ));
    Ok(())
}

#[tokio::test]
async fn missing_metric_fails_startup() -> Result<()> {
    let dir = TempDir::new()?;
    let store: Arc<dyn SettingsStore> = fast_store(&[]);
    let result = Session::start(
        SessionConfig {
            resume_dir: dir.path().to_path_buf(),
        },
        Box::new(StubEngine::with_schema(Vec::new())),
        store,
        EventBus::new(),
        Metrics::new()?,
    );
    assert!(matches!(result, Err(SessionError::MissingMetric { .. })));
    Ok(())
}

#[tokio::test]
async fn torrents_survive_a_restart() -> Result<()> {
    let resume_dir = TempDir::new()?;
    let store = fast_store(&[]);
    let session = start_session(&resume_dir, StubEngine::new(), Arc::clone(&store))?;
    session.add_category("Movies", "/data/movies").await?;
    session.add_tag("hd").await?;
    let mut events = session.subscribe(None);
    session
        .add_torrent(
            descriptor(1),
            AddTorrentParams {
                category: "Movies".to_string(),
                tags: BTreeSet::from(["hd".to_string()]),
                paused: Some(true),
                ..AddTorrentParams::default()
            },
        )
        .await?;
    wait_for(&mut events, |event| matches!(event, Event::TorrentAdded { .. })).await?;
    session.shutdown().await?;
    assert!(matches!(session.queue().await, Err(SessionError::Closed)));

    let restarted = start_session(&resume_dir, StubEngine::new(), store)?;
    let mut events = restarted.subscribe(None);
    wait_for(&mut events, |event| {
        matches!(event, Event::TorrentAdded { from_resume: true, .. })
    })
    .await?;
    let view = restarted.torrent(hash(1)).await?;
    assert_eq!(view.category, "Movies");
    assert!(view.tags.contains("hd"));
    assert_eq!(view.state, TorrentState::PausedDownloading);
    restarted.shutdown().await?;
    Ok(())
}

/// Harness whose alert drain lags behind commands, so several requests can
/// be issued before the engine's answers are seen.
async fn lagging_harness() -> Result<Harness> {
    let harness = Harness::start(&[(keys::ALERT_POLL_INTERVAL_MS, SettingValue::Int(300))])?;
    sleep(Duration::from_millis(50)).await;
    Ok(harness)
}

#[tokio::test]
async fn superseded_metadata_fetch_does_not_settle_the_full_add() -> Result<()> {
    let mut harness = lagging_harness().await?;
    let magnet = TorrentDescriptor::magnet(hash(9), "magnet:?xt=urn:btih:0909");
    harness.session.load_metadata(magnet).await?;
    harness.engine.reject_add(hash(9), "bad metainfo");
    harness
        .session
        .add_torrent(descriptor(9), AddTorrentParams::default())
        .await?;

    let event = wait_for(&mut harness.events, |event| {
        matches!(event, Event::AddTorrentFailed { .. } | Event::TorrentAdded { .. })
    })
    .await?;
    assert!(matches!(event, Event::AddTorrentFailed { reason, .. } if reason == "bad metainfo"));
    sleep(Duration::from_millis(400)).await;
    assert!(harness.session.torrents().await?.is_empty());
    assert!(matches!(
        harness.session.torrent(hash(9)).await,
        Err(SessionError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn rejected_metadata_fetch_does_not_fail_the_full_add() -> Result<()> {
    let mut harness = lagging_harness().await?;
    harness.engine.reject_add(hash(9), "tracker unreachable");
    let magnet = TorrentDescriptor::magnet(hash(9), "magnet:?xt=urn:btih:0909");
    harness.session.load_metadata(magnet).await?;
    harness
        .session
        .add_torrent(descriptor(9), AddTorrentParams::default())
        .await?;

    let event = wait_for(&mut harness.events, |event| {
        matches!(event, Event::AddTorrentFailed { .. } | Event::TorrentAdded { .. })
    })
    .await?;
    assert!(matches!(event, Event::TorrentAdded { info_hash, .. } if info_hash == hash(9)));
    assert_eq!(harness.session.torrents().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_fetch_drops_metadata_still_in_flight() -> Result<()> {
    let mut harness = lagging_harness().await?;
    let magnet = TorrentDescriptor::magnet(hash(7), "magnet:?xt=urn:btih:0707");
    harness.session.load_metadata(magnet.clone()).await?;
    harness.engine.push_alert(EngineAlert::MetadataReceived {
        info_hash: hash(7),
        name: "fetched".to_string(),
        total_size: 1_024,
        metadata: vec![b'd', b'e'],
    });
    assert!(harness.session.cancel_load_metadata(hash(7)).await?);

    sleep(Duration::from_millis(700)).await;
    let leaked = harness
        .events
        .drain()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                Event::MetadataLoaded { .. }
                    | Event::TorrentMetadataLoaded { .. }
                    | Event::AddTorrentFailed { .. }
            )
        })
        .count();
    assert_eq!(leaked, 0);
    assert!(harness.session.torrents().await?.is_empty());

    harness.session.load_metadata(magnet).await?;
    assert!(harness.session.cancel_load_metadata(hash(7)).await?);
    Ok(())
}

fn downloading_status(byte: u8, download_rate: u64) -> EngineTorrentStatus {
    let mut status = EngineTorrentStatus::pending(hash(byte), true);
    status.phase = EnginePhase::Downloading;
    status.total_size = 400;
    status.total_wanted = 400;
    status.download_rate = download_rate;
    status
}

#[tokio::test]
async fn forced_torrents_do_not_take_download_slots() -> Result<()> {
    let mut harness = Harness::start(&[(keys::MAX_ACTIVE_DOWNLOADS, SettingValue::Int(1))])?;
    harness
        .add(
            1,
            AddTorrentParams {
                force_start: true,
                ..AddTorrentParams::default()
            },
        )
        .await?;
    harness.add(2, AddTorrentParams::default()).await?;
    harness.add(3, AddTorrentParams::default()).await?;

    let session = harness.session.clone();
    eventually(|| {
        let session = session.clone();
        async move {
            let forced = session.torrent(hash(1)).await?.state;
            let second = session.torrent(hash(2)).await?.state;
            let third = session.torrent(hash(3)).await?.state;
            Ok::<bool, anyhow::Error>(
                forced == TorrentState::ForcedDownloading
                    && !second.is_queued()
                    && third == TorrentState::QueuedDownloading,
            )
        }
    })
    .await?;
    assert!(!harness.engine.is_paused(&hash(1)));
    assert!(!harness.engine.is_paused(&hash(2)));
    assert!(harness.engine.is_paused(&hash(3)));
    Ok(())
}

#[tokio::test]
async fn slow_downloads_give_up_their_slot() -> Result<()> {
    let mut harness = Harness::start(&[
        (keys::MAX_ACTIVE_DOWNLOADS, SettingValue::Int(1)),
        (keys::IGNORE_SLOW_TORRENTS, SettingValue::Bool(true)),
        (keys::SLOW_TORRENT_INACTIVITY_SECS, SettingValue::Int(0)),
    ])?;
    harness.engine.set_status(downloading_status(1, 4 * 1024 * 1024));
    harness.engine.set_status(downloading_status(2, 4 * 1024 * 1024));
    harness.add(1, AddTorrentParams::default()).await?;
    harness.add(2, AddTorrentParams::default()).await?;

    sleep(Duration::from_millis(150)).await;
    assert_eq!(
        harness.session.torrent(hash(2)).await?.state,
        TorrentState::QueuedDownloading
    );

    harness.engine.set_status(downloading_status(1, 0));
    let session = harness.session.clone();
    eventually(|| {
        let session = session.clone();
        async move {
            let first = session.torrent(hash(1)).await?.state;
            let second = session.torrent(hash(2)).await?.state;
            Ok::<bool, anyhow::Error>(!first.is_queued() && !second.is_queued())
        }
    })
    .await?;
    assert!(!harness.engine.is_paused(&hash(2)));
    Ok(())
}

#[tokio::test]
async fn tracker_edits_reach_the_engine_and_report_trackerless_changes() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness.add(1, AddTorrentParams::default()).await?;
    harness.events.drain();

    harness
        .session
        .add_trackers(
            hash(1),
            vec![
                TrackerEntry::new("udp://b.example:6969", 1),
                TrackerEntry::new(" udp://a.example:6969 ", 0),
                TrackerEntry::new("udp://a.example:6969", 2),
            ],
        )
        .await?;
    let view = harness.session.torrent(hash(1)).await?;
    let urls: Vec<&str> = view.trackers.iter().map(|entry| entry.url.as_str()).collect();
    assert_eq!(urls, ["udp://a.example:6969", "udp://b.example:6969"]);
    let events = harness.events.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TrackersAdded { trackers, .. } if trackers.len() == 2
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TrackerlessStateChanged { trackerless: false, .. }
    )));

    harness.engine.push_alert(EngineAlert::TrackerReply {
        info_hash: hash(1),
        tracker: "udp://a.example:6969".to_string(),
        num_peers: 12,
    });
    wait_for(&mut harness.events, |event| {
        matches!(event, Event::TrackerSuccess { .. })
    })
    .await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(
        view.tracker_status.get("udp://a.example:6969"),
        Some(&TrackerStatus::Working)
    );

    let taken = harness
        .session
        .edit_tracker(hash(1), "udp://b.example:6969", "udp://a.example:6969")
        .await;
    assert!(matches!(taken, Err(SessionError::TrackerExists { .. })));
    let missing = harness
        .session
        .edit_tracker(hash(1), "udp://c.example:6969", "udp://d.example:6969")
        .await;
    assert!(matches!(missing, Err(SessionError::TrackerNotFound { .. })));
    harness
        .session
        .edit_tracker(hash(1), "udp://a.example:6969", "udp://c.example:6969")
        .await?;
    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(view.trackers[0], TrackerEntry::new("udp://c.example:6969", 0));
    assert!(view.tracker_status.is_empty());

    harness
        .session
        .remove_trackers(
            hash(1),
            vec!["udp://b.example:6969".to_string(), "udp://c.example:6969".to_string()],
        )
        .await?;
    assert!(harness.session.torrent(hash(1)).await?.trackers.is_empty());
    let events = harness.events.drain();
    assert!(events.iter().any(|event| matches!(event, Event::TrackersChanged { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TrackerlessStateChanged { trackerless: true, .. }
    )));

    let replaced = harness
        .engine
        .calls()
        .iter()
        .filter(|call| matches!(call, StubCall::ReplaceTrackers { .. }))
        .count();
    assert_eq!(replaced, 3);
    assert!(matches!(
        harness.session.add_trackers(hash(1), vec![TrackerEntry::new("  ", 0)]).await,
        Err(SessionError::InvalidUrl { .. })
    ));
    assert!(matches!(
        harness.session.add_trackers(hash(8), Vec::new()).await,
        Err(SessionError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn url_seeds_are_added_once_and_removed() -> Result<()> {
    let mut harness = Harness::start(&[])?;
    harness.add(1, AddTorrentParams::default()).await?;
    harness.events.drain();
    let seed = "https://mirror.example/debian.iso".to_string();

    harness
        .session
        .add_url_seeds(hash(1), vec![seed.clone(), seed.clone()])
        .await?;
    harness.session.add_url_seeds(hash(1), vec![seed.clone()]).await?;
    assert_eq!(harness.session.torrent(hash(1)).await?.url_seeds, [seed.clone()]);

    harness
        .session
        .remove_url_seeds(hash(1), vec![seed.clone()])
        .await?;
    assert!(harness.session.torrent(hash(1)).await?.url_seeds.is_empty());

    let events = harness.events.drain();
    let added = events
        .iter()
        .filter(|event| matches!(event, Event::UrlSeedsAdded { urls, .. } if *urls == [seed.clone()]))
        .count();
    assert_eq!(added, 1);
    assert!(events.iter().any(|event| matches!(event, Event::UrlSeedsRemoved { .. })));
    assert!(harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::ReplaceUrlSeeds { urls, .. } if urls.is_empty()
    )));
    Ok(())
}

#[tokio::test]
async fn incomplete_downloads_live_in_the_temp_path_until_finished() -> Result<()> {
    let mut harness = Harness::start(&[
        (keys::DEFAULT_SAVE_PATH, SettingValue::String("/data".to_string())),
        (keys::TEMP_PATH_ENABLED, SettingValue::Bool(true)),
        (keys::TEMP_PATH, SettingValue::String("/scratch".to_string())),
    ])?;
    harness.add(1, AddTorrentParams::default()).await?;

    let view = harness.session.torrent(hash(1)).await?;
    assert_eq!(view.save_path, "/data");
    assert_eq!(view.download_path.as_deref(), Some("/scratch"));
    assert!(harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::Add { save_path, .. } if save_path == "/scratch"
    )));

    harness.session.move_storage(hash(1), "/archive").await?;
    assert!(!harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::MoveStorage { .. }
    )));

    harness.engine.set_status(seeding_status(1));
    harness
        .engine
        .push_alert(EngineAlert::TorrentFinished { info_hash: hash(1) });
    let session = harness.session.clone();
    eventually(|| {
        let session = session.clone();
        async move {
            let view = session.torrent(hash(1)).await?;
            Ok::<bool, anyhow::Error>(view.download_path.is_none())
        }
    })
    .await?;
    assert_eq!(harness.session.torrent(hash(1)).await?.save_path, "/archive");
    assert!(harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::MoveStorage { path, .. } if path == "/archive"
    )));
    Ok(())
}

#[tokio::test]
async fn added_torrent_files_are_exported() -> Result<()> {
    let exports = TempDir::new()?;
    let export_dir = exports.path().to_string_lossy().into_owned();
    let mut harness = Harness::start(&[(keys::TORRENT_EXPORT_DIR, SettingValue::String(export_dir))])?;
    harness.add(5, AddTorrentParams::default()).await?;

    let exported = exports.path().join("torrent-5.torrent");
    eventually(|| {
        let exported = exported.clone();
        async move { Ok::<bool, anyhow::Error>(exported.exists()) }
    })
    .await?;
    assert_eq!(std::fs::read(&exported)?, b"de");
    Ok(())
}

#[tokio::test]
async fn metadata_fetches_stage_under_the_default_save_path() -> Result<()> {
    let harness = Harness::start(&[(
        keys::DEFAULT_SAVE_PATH,
        SettingValue::String("/data".to_string()),
    )])?;
    let magnet = TorrentDescriptor::magnet(hash(6), "magnet:?xt=urn:btih:0606");
    harness.session.load_metadata(magnet).await?;

    let staging = std::path::Path::new("/data").join(".sluice-metadata");
    assert!(harness.engine.calls().iter().any(|call| matches!(
        call,
        StubCall::Add { metadata_only: true, save_path, .. }
            if std::path::Path::new(save_path) == staging.as_path()
    )));
    Ok(())
}
