//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Gauges mirror the session status snapshot; counters track control-loop work.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Torrent count buckets exported under the `state` label.
pub const TORRENT_STATE_BUCKETS: [&str; 8] = [
    "downloading",
    "seeding",
    "completed",
    "active",
    "inactive",
    "paused",
    "resumed",
    "errored",
];

/// Prometheus-backed metrics registry shared by the session.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    torrents: IntGaugeVec,
    queued_torrents: IntGauge,
    download_rate_bytes: IntGauge,
    upload_rate_bytes: IntGauge,
    peers_connected: IntGauge,
    dht_nodes: IntGauge,
    alerts_processed_total: IntCounterVec,
    engine_applies_total: IntCounter,
    resume_write_failures_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Torrents currently downloading.
    pub downloading: i64,
    /// Torrents currently seeding.
    pub seeding: i64,
    /// Torrents held in the queue.
    pub queued_torrents: i64,
    /// Latest session download rate in bytes per second.
    pub download_rate_bytes: i64,
    /// Latest session upload rate in bytes per second.
    pub upload_rate_bytes: i64,
    /// Connected peers.
    pub peers_connected: i64,
    /// DHT routing table size.
    pub dht_nodes: i64,
    /// Engine configuration applications.
    pub engine_applies_total: u64,
    /// Resume data writes that failed.
    pub resume_write_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let torrents = IntGaugeVec::new(
            Opts::new("sluice_torrents", "Torrents per status bucket"),
            &["state"],
        )
        .map_err(|source| collector("sluice_torrents", source))?;
        let queued_torrents = gauge("sluice_queued_torrents", "Torrents waiting in the queue")?;
        let download_rate_bytes = gauge(
            "sluice_download_rate_bytes",
            "Session payload download rate (bytes/s)",
        )?;
        let upload_rate_bytes = gauge(
            "sluice_upload_rate_bytes",
            "Session payload upload rate (bytes/s)",
        )?;
        let peers_connected = gauge("sluice_peers_connected", "Connected peers")?;
        let dht_nodes = gauge("sluice_dht_nodes", "Nodes in the DHT routing table")?;
        let alerts_processed_total = IntCounterVec::new(
            Opts::new("sluice_alerts_processed_total", "Engine alerts handled by kind"),
            &["kind"],
        )
        .map_err(|source| collector("sluice_alerts_processed_total", source))?;
        let engine_applies_total = counter(
            "sluice_engine_applies_total",
            "Engine configuration applications",
        )?;
        let resume_write_failures_total = counter(
            "sluice_resume_write_failures_total",
            "Resume data writes that failed",
        )?;

        register(&registry, "sluice_torrents", &torrents)?;
        register(&registry, "sluice_queued_torrents", &queued_torrents)?;
        register(&registry, "sluice_download_rate_bytes", &download_rate_bytes)?;
        register(&registry, "sluice_upload_rate_bytes", &upload_rate_bytes)?;
        register(&registry, "sluice_peers_connected", &peers_connected)?;
        register(&registry, "sluice_dht_nodes", &dht_nodes)?;
        register(
            &registry,
            "sluice_alerts_processed_total",
            &alerts_processed_total,
        )?;
        register(&registry, "sluice_engine_applies_total", &engine_applies_total)?;
        register(
            &registry,
            "sluice_resume_write_failures_total",
            &resume_write_failures_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                torrents,
                queued_torrents,
                download_rate_bytes,
                upload_rate_bytes,
                peers_connected,
                dht_nodes,
                alerts_processed_total,
                engine_applies_total,
                resume_write_failures_total,
            }),
        })
    }

    /// Set the torrent count for one status bucket.
    pub fn set_torrents(&self, state: &str, count: i64) {
        self.inner.torrents.with_label_values(&[state]).set(count);
    }

    /// Set the queued torrent gauge.
    pub fn set_queued_torrents(&self, count: i64) {
        self.inner.queued_torrents.set(count);
    }

    /// Record the latest session payload rates.
    pub fn set_transfer_rates(&self, download: i64, upload: i64) {
        self.inner.download_rate_bytes.set(download);
        self.inner.upload_rate_bytes.set(upload);
    }

    /// Record the connected peer count.
    pub fn set_peers_connected(&self, peers: i64) {
        self.inner.peers_connected.set(peers);
    }

    /// Record the DHT routing table size.
    pub fn set_dht_nodes(&self, nodes: i64) {
        self.inner.dht_nodes.set(nodes);
    }

    /// Count one handled engine alert.
    pub fn inc_alert(&self, kind: &str) {
        self.inner
            .alerts_processed_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count one engine configuration application.
    pub fn inc_engine_apply(&self) {
        self.inner.engine_applies_total.inc();
    }

    /// Count one failed resume data write.
    pub fn inc_resume_write_failure(&self) {
        self.inner.resume_write_failures_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let bucket = |state: &str| self.inner.torrents.with_label_values(&[state]).get();
        MetricsSnapshot {
            downloading: bucket("downloading"),
            seeding: bucket("seeding"),
            queued_torrents: self.inner.queued_torrents.get(),
            download_rate_bytes: self.inner.download_rate_bytes.get(),
            upload_rate_bytes: self.inner.upload_rate_bytes.get(),
            peers_connected: self.inner.peers_connected.get(),
            dht_nodes: self.inner.dht_nodes.get(),
            engine_applies_total: self.inner.engine_applies_total.get(),
            resume_write_failures_total: self.inner.resume_write_failures_total.get(),
        }
    }
}

fn collector(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsCollector { name, source }
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help)).map_err(|source| collector(name, source))
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help)).map_err(|source| collector(name, source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_torrents("downloading", 4);
        metrics.set_torrents("seeding", 2);
        metrics.set_queued_torrents(3);
        metrics.set_transfer_rates(1_024, 2_048);
        metrics.set_peers_connected(17);
        metrics.set_dht_nodes(250);
        metrics.inc_alert("state_update");
        metrics.inc_engine_apply();
        metrics.inc_resume_write_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.downloading, 4);
        assert_eq!(snapshot.seeding, 2);
        assert_eq!(snapshot.queued_torrents, 3);
        assert_eq!(snapshot.download_rate_bytes, 1_024);
        assert_eq!(snapshot.upload_rate_bytes, 2_048);
        assert_eq!(snapshot.peers_connected, 17);
        assert_eq!(snapshot.dht_nodes, 250);
        assert_eq!(snapshot.engine_applies_total, 1);
        assert_eq!(snapshot.resume_write_failures_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("sluice_torrents{state=\"downloading\"} 4"));
        assert!(rendered.contains("sluice_alerts_processed_total"));
        Ok(())
    }

    #[test]
    fn instances_do_not_share_registries() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_engine_apply();
        assert_eq!(second.snapshot().engine_applies_total, 0);
        Ok(())
    }
}
