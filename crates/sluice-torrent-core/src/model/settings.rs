//! Engine configuration produced by the session's settings adapter.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Peer connection encryption policy understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionPolicy {
    /// Encrypt when possible.
    #[default]
    Prefer,
    /// Only encrypted peers.
    Require,
    /// Plaintext only.
    Disable,
}

/// Proxy protocol understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyProtocol {
    /// SOCKS4.
    Socks4,
    /// SOCKS5.
    Socks5,
    /// HTTP CONNECT.
    Http,
}

/// Proxy section of the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineProxy {
    /// Protocol.
    pub protocol: ProxyProtocol,
    /// Host.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Credentials, when both parts are set.
    pub credentials: Option<(String, String)>,
    /// Proxy peer connections as well as tracker traffic.
    pub proxy_peer_connections: bool,
}

/// Listening section of the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// `host:port` pairs; `0.0.0.0` and `[::]` bind every interface.
    pub interfaces: Vec<String>,
    /// Port shared by every entry.
    pub port: u16,
}

/// Peer class assignment for rate-limit exemptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerClassConfig {
    /// LAN peers bypass the global rate limits.
    pub lan_unthrottled: bool,
    /// Protocol overhead is charged to the rate limits.
    pub throttle_overhead: bool,
    /// uTP peers are charged to the rate limits.
    pub throttle_utp: bool,
}

/// Inclusive address range blocked by the IP filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    /// First blocked address.
    pub first: IpAddr,
    /// Last blocked address.
    pub last: IpAddr,
}

impl IpRange {
    /// Range covering a single address.
    #[must_use]
    pub const fn single(addr: IpAddr) -> Self {
        Self {
            first: addr,
            last: addr,
        }
    }
}

/// Complete engine configuration applied in one call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct EngineSettings {
    /// Listening endpoints; `None` keeps the current binding.
    pub listen: Option<ListenConfig>,
    /// Address reported to trackers.
    pub announce_ip: Option<IpAddr>,
    /// Download limit in bytes per second.
    pub download_rate_limit: Option<u64>,
    /// Upload limit in bytes per second.
    pub upload_rate_limit: Option<u64>,
    /// Encryption policy.
    pub encryption: EncryptionPolicy,
    /// DHT.
    pub dht: bool,
    /// Local service discovery.
    pub lsd: bool,
    /// Peer exchange.
    pub pex: bool,
    /// UPnP / NAT-PMP.
    pub upnp: bool,
    /// Anonymous mode.
    pub anonymous_mode: bool,
    /// Announce to every tracker in a tier.
    pub announce_to_all_trackers: bool,
    /// Announce to every tier.
    pub announce_to_all_tiers: bool,
    /// Proxy, when configured.
    pub proxy: Option<EngineProxy>,
    /// Global connection limit.
    pub max_connections: Option<u32>,
    /// Per-torrent connection limit.
    pub max_connections_per_torrent: Option<u32>,
    /// Global upload slot limit.
    pub max_uploads: Option<u32>,
    /// Per-torrent upload slot limit.
    pub max_uploads_per_torrent: Option<u32>,
    /// Peer class assignment.
    pub peer_classes: PeerClassConfig,
    /// Blocked address ranges: banned IPs followed by IP filter rules.
    pub ip_filter: Vec<IpRange>,
}
