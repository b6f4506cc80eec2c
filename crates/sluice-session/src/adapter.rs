//! Translation of session settings into engine configuration.
//!
//! # Design
//! - Invalid values are dropped or clamped rather than rejected so a bad
//!   setting never prevents the remaining configuration from applying.
//! - Every guard-rail decision is recorded as a warning for the caller to log.
//! - An unusable listen section is omitted so the engine keeps its previous
//!   binding.

use std::net::IpAddr;

use sluice_config::{EncryptionMode, ProxyKind, SessionSettings};
use sluice_torrent_core::{
    EncryptionPolicy, EngineProxy, EngineSettings, IpRange, ListenConfig, PeerClassConfig,
    ProxyProtocol,
};

/// Planned engine configuration plus guard-rail warnings.
#[derive(Debug)]
pub(crate) struct EngineSettingsPlan {
    /// Configuration handed to the engine.
    pub(crate) settings: EngineSettings,
    /// Clamp and drop decisions applied while planning.
    pub(crate) warnings: Vec<String>,
}

impl EngineSettingsPlan {
    /// Build the engine configuration; `filter_rules` come from the external
    /// IP filter and follow the banned addresses.
    pub(crate) fn from_settings(settings: &SessionSettings, filter_rules: &[IpRange]) -> Self {
        let mut warnings = Vec::new();

        let listen = plan_listen(settings, &mut warnings);
        let announce_ip = match settings.announce_ip.trim() {
            "" => None,
            raw => raw.parse::<IpAddr>().map_or_else(
                |_| {
                    warnings.push(format!("announce ip {raw} is not an address; ignoring"));
                    None
                },
                Some,
            ),
        };
        let proxy = plan_proxy(settings, &mut warnings);

        let mut ip_filter = Vec::with_capacity(settings.banned_ips.len() + filter_rules.len());
        for raw in &settings.banned_ips {
            match raw.trim().parse::<IpAddr>() {
                Ok(addr) => ip_filter.push(IpRange::single(addr)),
                Err(_) => warnings.push(format!("banned ip {raw} is not an address; skipping")),
            }
        }
        ip_filter.extend_from_slice(filter_rules);

        let settings = EngineSettings {
            listen,
            announce_ip,
            download_rate_limit: settings.effective_download_limit(),
            upload_rate_limit: settings.effective_upload_limit(),
            encryption: match settings.encryption {
                EncryptionMode::Prefer => EncryptionPolicy::Prefer,
                EncryptionMode::Require => EncryptionPolicy::Require,
                EncryptionMode::Disable => EncryptionPolicy::Disable,
            },
            dht: settings.dht_enabled,
            lsd: settings.lsd_enabled,
            pex: settings.pex_enabled,
            upnp: settings.upnp_enabled,
            anonymous_mode: settings.anonymous_mode,
            announce_to_all_trackers: settings.announce_to_all_trackers,
            announce_to_all_tiers: settings.announce_to_all_tiers,
            proxy,
            max_connections: connection_limit(settings.max_connections),
            max_connections_per_torrent: connection_limit(settings.max_connections_per_torrent),
            max_uploads: connection_limit(settings.max_uploads),
            max_uploads_per_torrent: connection_limit(settings.max_uploads_per_torrent),
            peer_classes: PeerClassConfig {
                lan_unthrottled: settings.ignore_limits_on_lan,
                throttle_overhead: settings.include_overhead_in_limits,
                throttle_utp: settings.utp_rate_limited,
            },
            ip_filter,
        };

        Self { settings, warnings }
    }
}

fn plan_listen(settings: &SessionSettings, warnings: &mut Vec<String>) -> Option<ListenConfig> {
    let port = match u16::try_from(settings.port) {
        Ok(port) if port > 0 => port,
        _ => {
            warnings.push(format!(
                "listen port {} is out of range; keeping previous binding",
                settings.port
            ));
            return None;
        }
    };

    let interface = settings.network_interface.trim();
    let address = settings.network_interface_address.trim();
    let hosts = if !address.is_empty() {
        match address.parse::<IpAddr>() {
            Ok(addr) => vec![addr.to_string()],
            Err(_) => {
                warnings.push(format!(
                    "interface address {address} is not an address; keeping previous binding"
                ));
                return None;
            }
        }
    } else if !interface.is_empty() {
        if !is_valid_interface_name(interface) {
            warnings.push(format!(
                "interface {interface} is not a valid name; keeping previous binding"
            ));
            return None;
        }
        vec![interface.to_string()]
    } else if settings.ipv6_enabled {
        vec!["0.0.0.0".to_string(), "::".to_string()]
    } else {
        vec!["0.0.0.0".to_string()]
    };

    let interfaces = hosts
        .iter()
        .map(|host| {
            if host.contains(':') {
                format!("[{host}]:{port}")
            } else {
                format!("{host}:{port}")
            }
        })
        .collect();
    Some(ListenConfig { interfaces, port })
}

fn is_valid_interface_name(name: &str) -> bool {
    name.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

fn plan_proxy(settings: &SessionSettings, warnings: &mut Vec<String>) -> Option<EngineProxy> {
    let proxy = &settings.proxy;
    let protocol = match proxy.kind {
        ProxyKind::None => return None,
        ProxyKind::Socks4 => ProxyProtocol::Socks4,
        ProxyKind::Socks5 => ProxyProtocol::Socks5,
        ProxyKind::Http => ProxyProtocol::Http,
    };
    let host = proxy.host.trim();
    if host.is_empty() {
        warnings.push("proxy host is empty; connecting directly".to_string());
        return None;
    }
    let Some(port) = u16::try_from(proxy.port).ok().filter(|port| *port > 0) else {
        warnings.push(format!(
            "proxy port {} is out of range; connecting directly",
            proxy.port
        ));
        return None;
    };
    let credentials = (!proxy.username.is_empty() && !proxy.password.is_empty())
        .then(|| (proxy.username.clone(), proxy.password.clone()));
    Some(EngineProxy {
        protocol,
        host: host.to_string(),
        port,
        credentials,
        proxy_peer_connections: proxy.peer_connections,
    })
}

fn connection_limit(value: i64) -> Option<u32> {
    if value <= 0 {
        return None;
    }
    Some(u32::try_from(value).unwrap_or(u32::MAX))
}
