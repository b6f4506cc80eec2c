//! Engine counter sampling and process-wide network counters.
//!
//! # Design
//! - Metric slots are resolved once against the engine schema; a missing name
//!   aborts startup instead of silently reporting zeros.
//! - Rates are derived from counter deltas between consecutive samples.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::Serialize;
use sluice_config::AllTimeTotals;
use sluice_torrent_core::{CacheStatus, MetricDescriptor, SessionStatus};

use crate::error::{SessionError, SessionResult};

const HAS_INCOMING_CONNECTIONS: &str = "net.has_incoming_connections";
const RECV_PAYLOAD_BYTES: &str = "net.recv_payload_bytes";
const SENT_PAYLOAD_BYTES: &str = "net.sent_payload_bytes";
const RECV_BYTES: &str = "net.recv_bytes";
const SENT_BYTES: &str = "net.sent_bytes";
const RECV_IP_OVERHEAD_BYTES: &str = "net.recv_ip_overhead_bytes";
const SENT_IP_OVERHEAD_BYTES: &str = "net.sent_ip_overhead_bytes";
const RECV_TRACKER_BYTES: &str = "net.recv_tracker_bytes";
const SENT_TRACKER_BYTES: &str = "net.sent_tracker_bytes";
const RECV_REDUNDANT_BYTES: &str = "net.recv_redundant_bytes";
const RECV_FAILED_BYTES: &str = "net.recv_failed_bytes";
const DHT_BYTES_IN: &str = "dht.dht_bytes_in";
const DHT_BYTES_OUT: &str = "dht.dht_bytes_out";
const DHT_NODES: &str = "dht.dht_nodes";
const PEERS_CONNECTED: &str = "peer.num_peers_connected";
const PEERS_UP_DISK: &str = "peer.num_peers_up_disk";
const PEERS_DOWN_DISK: &str = "peer.num_peers_down_disk";
const DISK_BLOCKS_IN_USE: &str = "disk.disk_blocks_in_use";
const BLOCKS_READ: &str = "disk.num_blocks_read";
const BLOCKS_CACHE_HITS: &str = "disk.num_blocks_cache_hits";
const BLOCKS_HASHED: &str = "disk.num_blocks_hashed";
const QUEUED_DISK_JOBS: &str = "disk.queued_disk_jobs";
const DISK_JOB_TIME: &str = "disk.disk_job_time";
const READ_OPS: &str = "disk.num_read_ops";
const WRITE_OPS: &str = "disk.num_write_ops";

/// Counter names the session requires from the engine's stats schema.
pub const REQUIRED_METRICS: [&str; 25] = [
    HAS_INCOMING_CONNECTIONS,
    RECV_PAYLOAD_BYTES,
    SENT_PAYLOAD_BYTES,
    RECV_BYTES,
    SENT_BYTES,
    RECV_IP_OVERHEAD_BYTES,
    SENT_IP_OVERHEAD_BYTES,
    RECV_TRACKER_BYTES,
    SENT_TRACKER_BYTES,
    RECV_REDUNDANT_BYTES,
    RECV_FAILED_BYTES,
    DHT_BYTES_IN,
    DHT_BYTES_OUT,
    DHT_NODES,
    PEERS_CONNECTED,
    PEERS_UP_DISK,
    PEERS_DOWN_DISK,
    DISK_BLOCKS_IN_USE,
    BLOCKS_READ,
    BLOCKS_CACHE_HITS,
    BLOCKS_HASHED,
    QUEUED_DISK_JOBS,
    DISK_JOB_TIME,
    READ_OPS,
    WRITE_OPS,
];

/// Slots of [`REQUIRED_METRICS`] in the engine's stats vector, same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MetricIndices {
    slots: [usize; REQUIRED_METRICS.len()],
}

impl MetricIndices {
    /// Resolve every required name against the engine schema.
    pub(crate) fn resolve(schema: &[MetricDescriptor]) -> SessionResult<Self> {
        let mut slots = [0; REQUIRED_METRICS.len()];
        for (slot, name) in slots.iter_mut().zip(REQUIRED_METRICS) {
            *slot = schema
                .iter()
                .find(|descriptor| descriptor.name == name)
                .map(|descriptor| descriptor.index)
                .ok_or(SessionError::MissingMetric { name })?;
        }
        Ok(Self { slots })
    }

    fn read(&self, values: &[i64], name: &str) -> u64 {
        REQUIRED_METRICS
            .iter()
            .position(|candidate| *candidate == name)
            .and_then(|position| values.get(self.slots[position]))
            .and_then(|value| u64::try_from(*value).ok())
            .unwrap_or(0)
    }
}

/// Counters read from one stats sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Sample {
    recv_payload: u64,
    sent_payload: u64,
    recv: u64,
    sent: u64,
    recv_ip_overhead: u64,
    sent_ip_overhead: u64,
    recv_tracker: u64,
    sent_tracker: u64,
    dht_in: u64,
    dht_out: u64,
}

/// Turns raw stats samples into session and cache status.
#[derive(Debug)]
pub(crate) struct StatsTracker {
    indices: MetricIndices,
    previous: Option<(Sample, Instant)>,
    base: AllTimeTotals,
    session: SessionStatus,
    cache: CacheStatus,
}

impl StatsTracker {
    pub(crate) fn new(indices: MetricIndices, base: AllTimeTotals) -> Self {
        Self {
            indices,
            previous: None,
            base,
            session: SessionStatus {
                all_time_download: base.download,
                all_time_upload: base.upload,
                ..SessionStatus::default()
            },
            cache: CacheStatus {
                read_ratio: -1.0,
                ..CacheStatus::default()
            },
        }
    }

    pub(crate) const fn session(&self) -> SessionStatus {
        self.session
    }

    pub(crate) const fn cache(&self) -> CacheStatus {
        self.cache
    }

    /// Totals to persist: stored base plus this session's traffic.
    pub(crate) const fn all_time(&self) -> AllTimeTotals {
        AllTimeTotals {
            download: self.session.all_time_download,
            upload: self.session.all_time_upload,
        }
    }

    /// Replace the derived figures with those of a new sample.
    pub(crate) fn ingest(&mut self, values: &[i64], now: Instant) {
        let read = |name: &str| self.indices.read(values, name);
        let sample = Sample {
            recv_payload: read(RECV_PAYLOAD_BYTES),
            sent_payload: read(SENT_PAYLOAD_BYTES),
            recv: read(RECV_BYTES),
            sent: read(SENT_BYTES),
            recv_ip_overhead: read(RECV_IP_OVERHEAD_BYTES),
            sent_ip_overhead: read(SENT_IP_OVERHEAD_BYTES),
            recv_tracker: read(RECV_TRACKER_BYTES),
            sent_tracker: read(SENT_TRACKER_BYTES),
            dht_in: read(DHT_BYTES_IN),
            dht_out: read(DHT_BYTES_OUT),
        };
        let (previous, elapsed) = match self.previous {
            Some((previous, at)) => (previous, now.saturating_duration_since(at)),
            None => (sample, Duration::ZERO),
        };

        let blocks_read = read(BLOCKS_READ);
        let cache_hits = read(BLOCKS_CACHE_HITS);
        let total_jobs = read(WRITE_OPS)
            .saturating_add(read(READ_OPS))
            .saturating_add(read(BLOCKS_HASHED));
        let job_time = read(DISK_JOB_TIME);

        self.session = SessionStatus {
            has_incoming_connections: read(HAS_INCOMING_CONNECTIONS) != 0,
            payload_download_rate: rate(sample.recv_payload, previous.recv_payload, elapsed),
            payload_upload_rate: rate(sample.sent_payload, previous.sent_payload, elapsed),
            download_rate: rate(sample.recv, previous.recv, elapsed),
            upload_rate: rate(sample.sent, previous.sent, elapsed),
            ip_overhead_download_rate: rate(
                sample.recv_ip_overhead,
                previous.recv_ip_overhead,
                elapsed,
            ),
            ip_overhead_upload_rate: rate(
                sample.sent_ip_overhead,
                previous.sent_ip_overhead,
                elapsed,
            ),
            tracker_download_rate: rate(sample.recv_tracker, previous.recv_tracker, elapsed),
            tracker_upload_rate: rate(sample.sent_tracker, previous.sent_tracker, elapsed),
            dht_download_rate: rate(sample.dht_in, previous.dht_in, elapsed),
            dht_upload_rate: rate(sample.dht_out, previous.dht_out, elapsed),
            total_download: sample.recv,
            total_upload: sample.sent,
            total_payload_download: sample.recv_payload,
            total_payload_upload: sample.sent_payload,
            ip_overhead_download: sample.recv_ip_overhead,
            ip_overhead_upload: sample.sent_ip_overhead,
            tracker_download: sample.recv_tracker,
            tracker_upload: sample.sent_tracker,
            dht_download: sample.dht_in,
            dht_upload: sample.dht_out,
            total_wasted: read(RECV_REDUNDANT_BYTES).saturating_add(read(RECV_FAILED_BYTES)),
            dht_nodes: read(DHT_NODES),
            peers_count: read(PEERS_CONNECTED),
            disk_read_queue: read(PEERS_UP_DISK),
            disk_write_queue: read(PEERS_DOWN_DISK),
            all_time_download: self.base.download.saturating_add(sample.recv),
            all_time_upload: self.base.upload.saturating_add(sample.sent),
        };
        self.cache = CacheStatus {
            total_used_buffers: read(DISK_BLOCKS_IN_USE),
            read_ratio: read_ratio(cache_hits, blocks_read),
            jobs_queue_length: read(QUEUED_DISK_JOBS),
            average_job_time_ms: job_time.checked_div(total_jobs).unwrap_or(0),
        };
        self.previous = Some((sample, now));
    }
}

fn rate(current: u64, previous: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis();
    if millis == 0 {
        return 0;
    }
    let delta = u128::from(current.saturating_sub(previous));
    u64::try_from(delta * 1000 / millis).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_precision_loss)]
fn read_ratio(hits: u64, read: u64) -> f64 {
    if read == 0 {
        return -1.0;
    }
    hits as f64 / read as f64
}

/// Process-wide counters fed by network alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkCounters {
    /// Endpoints currently listening.
    pub listening: BTreeSet<String>,
    /// Listen attempts that failed.
    pub listen_failures: u64,
    /// Last external address reported.
    pub external_ip: Option<IpAddr>,
    /// Successful port mappings.
    pub port_mappings: u64,
    /// Failed port mappings.
    pub port_mapping_failures: u64,
    /// Refused peer connections.
    pub blocked_peers: u64,
    /// Peers banned for corrupt data.
    pub banned_peers: u64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn schema() -> Vec<MetricDescriptor> {
        REQUIRED_METRICS
            .iter()
            .enumerate()
            .map(|(index, name)| MetricDescriptor {
                name: (*name).to_string(),
                index,
            })
            .collect()
    }

    fn values(pairs: &[(&str, i64)]) -> Vec<i64> {
        let mut values = vec![0; REQUIRED_METRICS.len()];
        for (name, value) in pairs {
            if let Some(index) = REQUIRED_METRICS.iter().position(|metric| metric == name) {
                values[index] = *value;
            }
        }
        values
    }

    #[test]
    fn missing_metric_fails_resolution() {
        let mut schema = schema();
        schema.retain(|descriptor| descriptor.name != DHT_NODES);
        match MetricIndices::resolve(&schema) {
            Err(SessionError::MissingMetric { name }) => assert_eq!(name, DHT_NODES),
            other => panic!("expected missing metric, got {other:?}"),
        }
    }

    #[test]
    fn rates_come_from_deltas() -> SessionResult<()> {
        let indices = MetricIndices::resolve(&schema())?;
        let mut tracker = StatsTracker::new(indices, AllTimeTotals::default());
        let start = Instant::now();
        tracker.ingest(&values(&[(RECV_PAYLOAD_BYTES, 1_000)]), start);
        assert_eq!(tracker.session().payload_download_rate, 0);
        assert_eq!(tracker.session().total_payload_download, 1_000);

        tracker.ingest(
            &values(&[(RECV_PAYLOAD_BYTES, 4_000)]),
            start + Duration::from_secs(2),
        );
        assert_eq!(tracker.session().payload_download_rate, 1_500);
        Ok(())
    }

    #[test]
    fn cache_and_waste_figures() -> SessionResult<()> {
        let indices = MetricIndices::resolve(&schema())?;
        let mut tracker = StatsTracker::new(indices, AllTimeTotals::default());
        assert!((tracker.cache().read_ratio + 1.0).abs() < f64::EPSILON);
        tracker.ingest(
            &values(&[
                (BLOCKS_READ, 200),
                (BLOCKS_CACHE_HITS, 50),
                (DISK_JOB_TIME, 900),
                (READ_OPS, 10),
                (WRITE_OPS, 15),
                (BLOCKS_HASHED, 5),
                (RECV_REDUNDANT_BYTES, 7),
                (RECV_FAILED_BYTES, 3),
            ]),
            Instant::now(),
        );
        assert!((tracker.cache().read_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(tracker.cache().average_job_time_ms, 30);
        assert_eq!(tracker.session().total_wasted, 10);
        Ok(())
    }

    #[test]
    fn extreme_counters_saturate() -> SessionResult<()> {
        let indices = MetricIndices::resolve(&schema())?;
        let mut tracker = StatsTracker::new(indices, AllTimeTotals::default());
        tracker.ingest(
            &values(&[
                (READ_OPS, i64::MAX),
                (WRITE_OPS, i64::MAX),
                (BLOCKS_HASHED, i64::MAX),
                (DISK_JOB_TIME, i64::MAX),
                (RECV_REDUNDANT_BYTES, i64::MAX),
                (RECV_FAILED_BYTES, i64::MAX),
            ]),
            Instant::now(),
        );
        assert_eq!(tracker.cache().average_job_time_ms, 0);
        assert_eq!(tracker.session().total_wasted, u64::MAX - 1);
        Ok(())
    }

    #[test]
    fn all_time_totals_add_stored_base() -> SessionResult<()> {
        let indices = MetricIndices::resolve(&schema())?;
        let base = AllTimeTotals {
            download: 100,
            upload: 50,
        };
        let mut tracker = StatsTracker::new(indices, base);
        assert_eq!(tracker.all_time(), base);
        tracker.ingest(&values(&[(RECV_BYTES, 10), (SENT_BYTES, 5)]), Instant::now());
        assert_eq!(
            tracker.all_time(),
            AllTimeTotals {
                download: 110,
                upload: 55
            }
        );
        Ok(())
    }
}
