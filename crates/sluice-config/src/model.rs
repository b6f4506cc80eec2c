//! Typed view over the settings store.
//!
//! # Design
//! - `SessionSettings` is rebuilt from the store whenever the session
//!   reconfigures; it never writes back.
//! - Missing keys take the documented default. Keys holding a value of the
//!   wrong type also take the default and log a warning, so one bad entry
//!   cannot prevent the session from starting.
//! - Negative connection and queue limits mean "unlimited"; zero rate limits
//!   mean "unlimited".

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::keys;
use crate::store::{SettingValue, SettingsStore};

/// Default directory for downloaded content.
pub const DEFAULT_SAVE_PATH: &str = "/downloads";
/// Default listening port.
pub const DEFAULT_PORT: u16 = 8999;
/// Largest ratio reported for a torrent; also the ceiling for ratio limits.
pub const MAX_RATIO: f64 = 9999.0;
/// Largest accepted seeding time limit in minutes (one year).
pub const MAX_SEEDING_MINUTES: i64 = 525_600;

/// Peer connection encryption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    /// Encrypt when the peer supports it.
    #[default]
    Prefer,
    /// Refuse unencrypted peers.
    Require,
    /// Never encrypt.
    Disable,
}

impl EncryptionMode {
    /// Map the stored integer (`0` prefer, `1` require, `2` disable).
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Prefer),
            1 => Some(Self::Require),
            2 => Some(Self::Disable),
            _ => None,
        }
    }
}

/// Action taken when a torrent reaches its share limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxRatioAction {
    /// Pause the torrent.
    #[default]
    Pause,
    /// Remove the torrent, keeping its files.
    Remove,
}

impl MaxRatioAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pause" => Some(Self::Pause),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyKind {
    /// Direct connections.
    #[default]
    None,
    /// SOCKS4 proxy.
    Socks4,
    /// SOCKS5 proxy.
    Socks5,
    /// HTTP CONNECT proxy.
    Http,
}

impl ProxyKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(Self::None),
            "socks4" => Some(Self::Socks4),
            "socks5" => Some(Self::Socks5),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Protocol spoken to the proxy.
    pub kind: ProxyKind,
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: i64,
    /// Optional user name.
    pub username: String,
    /// Optional password.
    pub password: String,
    /// Route peer connections through the proxy as well as tracker traffic.
    pub peer_connections: bool,
}

/// Typed session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionSettings {
    /// Default directory for new torrents.
    pub default_save_path: String,
    /// Incomplete torrents live under the temporary path.
    pub temp_path_enabled: bool,
    /// Temporary path as stored; see [`SessionSettings::temp_path`].
    pub temp_path: String,
    /// Export directory for added torrent files; empty disables.
    pub torrent_export_dir: String,
    /// Export directory for finished torrent files; empty disables.
    pub finished_torrent_export_dir: String,
    /// `/` in category names creates parent categories.
    pub subcategories_enabled: bool,
    /// New torrents use manual save paths unless requested otherwise.
    pub auto_tmm_disabled_by_default: bool,
    /// Switch to manual mode instead of relocating on category change.
    pub disable_auto_tmm_on_category_changed: bool,
    /// Switch to manual mode when the default save path changes.
    pub disable_auto_tmm_on_default_save_path_changed: bool,
    /// Switch to manual mode when a category save path changes.
    pub disable_auto_tmm_on_category_save_path_changed: bool,

    /// DHT discovery.
    pub dht_enabled: bool,
    /// Local service discovery.
    pub lsd_enabled: bool,
    /// Peer exchange.
    pub pex_enabled: bool,
    /// UPnP / NAT-PMP.
    pub upnp_enabled: bool,

    /// Global download limit in bytes per second.
    pub global_download_limit: i64,
    /// Global upload limit in bytes per second.
    pub global_upload_limit: i64,
    /// Alternative download limit in bytes per second.
    pub alt_download_limit: i64,
    /// Alternative upload limit in bytes per second.
    pub alt_upload_limit: i64,
    /// Alternative limits replace the global ones.
    pub alt_limits_enabled: bool,
    /// LAN peers are exempt from limits.
    pub ignore_limits_on_lan: bool,
    /// Protocol overhead counts against limits.
    pub include_overhead_in_limits: bool,
    /// uTP connections are rate limited.
    pub utp_rate_limited: bool,

    /// Listening port as stored; validated by the engine adapter.
    pub port: i64,
    /// Interface to bind to.
    pub network_interface: String,
    /// Address on the interface to bind to.
    pub network_interface_address: String,
    /// Listen on IPv6 too.
    pub ipv6_enabled: bool,
    /// Encryption policy.
    pub encryption: EncryptionMode,
    /// Proxy configuration.
    pub proxy: ProxySettings,

    /// Global connection limit.
    pub max_connections: i64,
    /// Per-torrent connection limit.
    pub max_connections_per_torrent: i64,
    /// Global upload slot limit.
    pub max_uploads: i64,
    /// Per-torrent upload slot limit.
    pub max_uploads_per_torrent: i64,

    /// Anonymous mode.
    pub anonymous_mode: bool,
    /// Address reported to trackers.
    pub announce_ip: String,
    /// Announce to all trackers in a tier.
    pub announce_to_all_trackers: bool,
    /// Announce to all tiers.
    pub announce_to_all_tiers: bool,
    /// Banned peer addresses.
    pub banned_ips: Vec<String>,
    /// Append the additional trackers to new torrents.
    pub add_trackers_enabled: bool,
    /// Newline separated tracker list.
    pub additional_trackers: String,

    /// Active-count limits are enforced.
    pub queueing_enabled: bool,
    /// Maximum active downloads.
    pub max_active_downloads: i64,
    /// Maximum active uploads.
    pub max_active_uploads: i64,
    /// Maximum active torrents.
    pub max_active_torrents: i64,
    /// Slow torrents do not occupy slots.
    pub ignore_slow_torrents: bool,
    /// Slow download threshold in KiB/s.
    pub slow_torrent_download_rate: i64,
    /// Slow upload threshold in KiB/s.
    pub slow_torrent_upload_rate: i64,
    /// Time below thresholds before a torrent counts as slow.
    pub slow_torrent_inactivity: Duration,

    /// Global ratio limit; negative means no limit.
    pub global_max_ratio: f64,
    /// Global seeding time limit in minutes; negative means no limit.
    pub global_max_seeding_minutes: i64,
    /// Action on reaching a share limit.
    pub max_ratio_action: MaxRatioAction,

    /// New torrents start paused.
    pub add_torrent_paused: bool,
    /// Status refresh interval.
    pub refresh_interval: Duration,
    /// Resume data save interval; zero disables periodic saving.
    pub save_resume_data_interval: Duration,
    /// Share-limit evaluation interval.
    pub share_limit_check_interval: Duration,
    /// Alert drain interval.
    pub alert_poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_save_path: DEFAULT_SAVE_PATH.to_string(),
            temp_path_enabled: false,
            temp_path: String::new(),
            torrent_export_dir: String::new(),
            finished_torrent_export_dir: String::new(),
            subcategories_enabled: false,
            auto_tmm_disabled_by_default: true,
            disable_auto_tmm_on_category_changed: false,
            disable_auto_tmm_on_default_save_path_changed: true,
            disable_auto_tmm_on_category_save_path_changed: true,
            dht_enabled: true,
            lsd_enabled: true,
            pex_enabled: true,
            upnp_enabled: true,
            global_download_limit: 0,
            global_upload_limit: 0,
            alt_download_limit: 10 * 1024,
            alt_upload_limit: 10 * 1024,
            alt_limits_enabled: false,
            ignore_limits_on_lan: true,
            include_overhead_in_limits: false,
            utp_rate_limited: true,
            port: i64::from(DEFAULT_PORT),
            network_interface: String::new(),
            network_interface_address: String::new(),
            ipv6_enabled: false,
            encryption: EncryptionMode::Prefer,
            proxy: ProxySettings::default(),
            max_connections: 500,
            max_connections_per_torrent: 100,
            max_uploads: 20,
            max_uploads_per_torrent: 4,
            anonymous_mode: false,
            announce_ip: String::new(),
            announce_to_all_trackers: false,
            announce_to_all_tiers: true,
            banned_ips: Vec::new(),
            add_trackers_enabled: false,
            additional_trackers: String::new(),
            queueing_enabled: true,
            max_active_downloads: 3,
            max_active_uploads: 3,
            max_active_torrents: 5,
            ignore_slow_torrents: false,
            slow_torrent_download_rate: 2,
            slow_torrent_upload_rate: 2,
            slow_torrent_inactivity: Duration::from_secs(60),
            global_max_ratio: -1.0,
            global_max_seeding_minutes: -1,
            max_ratio_action: MaxRatioAction::Pause,
            add_torrent_paused: false,
            refresh_interval: Duration::from_millis(1500),
            save_resume_data_interval: Duration::from_secs(3 * 60),
            share_limit_check_interval: Duration::from_secs(10),
            alert_poll_interval: Duration::from_millis(200),
        }
    }
}

impl SessionSettings {
    /// Build settings from the store, substituting defaults for absent or
    /// malformed keys.
    #[must_use]
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let read = Reader { store };
        Self {
            default_save_path: read.string(keys::DEFAULT_SAVE_PATH, &defaults.default_save_path),
            temp_path_enabled: read.bool(keys::TEMP_PATH_ENABLED, defaults.temp_path_enabled),
            temp_path: read.string(keys::TEMP_PATH, &defaults.temp_path),
            torrent_export_dir: read.string(keys::TORRENT_EXPORT_DIR, &defaults.torrent_export_dir),
            finished_torrent_export_dir: read.string(
                keys::FINISHED_TORRENT_EXPORT_DIR,
                &defaults.finished_torrent_export_dir,
            ),
            subcategories_enabled: read.bool(
                keys::SUBCATEGORIES_ENABLED,
                defaults.subcategories_enabled,
            ),
            auto_tmm_disabled_by_default: read.bool(
                keys::AUTO_TMM_DISABLED_BY_DEFAULT,
                defaults.auto_tmm_disabled_by_default,
            ),
            disable_auto_tmm_on_category_changed: read.bool(
                keys::DISABLE_AUTO_TMM_ON_CATEGORY_CHANGED,
                defaults.disable_auto_tmm_on_category_changed,
            ),
            disable_auto_tmm_on_default_save_path_changed: read.bool(
                keys::DISABLE_AUTO_TMM_ON_DEFAULT_SAVE_PATH_CHANGED,
                defaults.disable_auto_tmm_on_default_save_path_changed,
            ),
            disable_auto_tmm_on_category_save_path_changed: read.bool(
                keys::DISABLE_AUTO_TMM_ON_CATEGORY_SAVE_PATH_CHANGED,
                defaults.disable_auto_tmm_on_category_save_path_changed,
            ),
            dht_enabled: read.bool(keys::DHT_ENABLED, defaults.dht_enabled),
            lsd_enabled: read.bool(keys::LSD_ENABLED, defaults.lsd_enabled),
            pex_enabled: read.bool(keys::PEX_ENABLED, defaults.pex_enabled),
            upnp_enabled: read.bool(keys::UPNP_ENABLED, defaults.upnp_enabled),
            global_download_limit: read
                .int(keys::GLOBAL_DOWNLOAD_LIMIT, defaults.global_download_limit),
            global_upload_limit: read.int(keys::GLOBAL_UPLOAD_LIMIT, defaults.global_upload_limit),
            alt_download_limit: read.int(keys::ALT_DOWNLOAD_LIMIT, defaults.alt_download_limit),
            alt_upload_limit: read.int(keys::ALT_UPLOAD_LIMIT, defaults.alt_upload_limit),
            alt_limits_enabled: read.bool(keys::ALT_LIMITS_ENABLED, defaults.alt_limits_enabled),
            ignore_limits_on_lan: read
                .bool(keys::IGNORE_LIMITS_ON_LAN, defaults.ignore_limits_on_lan),
            include_overhead_in_limits: read.bool(
                keys::INCLUDE_OVERHEAD_IN_LIMITS,
                defaults.include_overhead_in_limits,
            ),
            utp_rate_limited: read.bool(keys::UTP_RATE_LIMITED, defaults.utp_rate_limited),
            port: read.int(keys::PORT, defaults.port),
            network_interface: read.string(keys::NETWORK_INTERFACE, &defaults.network_interface),
            network_interface_address: read.string(
                keys::NETWORK_INTERFACE_ADDRESS,
                &defaults.network_interface_address,
            ),
            ipv6_enabled: read.bool(keys::IPV6_ENABLED, defaults.ipv6_enabled),
            encryption: read.encryption(defaults.encryption),
            proxy: ProxySettings {
                kind: read.proxy_kind(defaults.proxy.kind),
                host: read.string(keys::PROXY_HOST, &defaults.proxy.host),
                port: read.int(keys::PROXY_PORT, defaults.proxy.port),
                username: read.string(keys::PROXY_USERNAME, &defaults.proxy.username),
                password: read.string(keys::PROXY_PASSWORD, &defaults.proxy.password),
                peer_connections: read
                    .bool(keys::PROXY_PEER_CONNECTIONS, defaults.proxy.peer_connections),
            },
            max_connections: read.int(keys::MAX_CONNECTIONS, defaults.max_connections),
            max_connections_per_torrent: read.int(
                keys::MAX_CONNECTIONS_PER_TORRENT,
                defaults.max_connections_per_torrent,
            ),
            max_uploads: read.int(keys::MAX_UPLOADS, defaults.max_uploads),
            max_uploads_per_torrent: read
                .int(keys::MAX_UPLOADS_PER_TORRENT, defaults.max_uploads_per_torrent),
            anonymous_mode: read.bool(keys::ANONYMOUS_MODE, defaults.anonymous_mode),
            announce_ip: read.string(keys::ANNOUNCE_IP, &defaults.announce_ip),
            announce_to_all_trackers: read
                .bool(keys::ANNOUNCE_TO_ALL_TRACKERS, defaults.announce_to_all_trackers),
            announce_to_all_tiers: read
                .bool(keys::ANNOUNCE_TO_ALL_TIERS, defaults.announce_to_all_tiers),
            banned_ips: read.string_list(keys::BANNED_IPS, &defaults.banned_ips),
            add_trackers_enabled: read
                .bool(keys::ADD_TRACKERS_ENABLED, defaults.add_trackers_enabled),
            additional_trackers: read
                .string(keys::ADDITIONAL_TRACKERS, &defaults.additional_trackers),
            queueing_enabled: read.bool(keys::QUEUEING_ENABLED, defaults.queueing_enabled),
            max_active_downloads: read
                .int(keys::MAX_ACTIVE_DOWNLOADS, defaults.max_active_downloads),
            max_active_uploads: read.int(keys::MAX_ACTIVE_UPLOADS, defaults.max_active_uploads),
            max_active_torrents: read.int(keys::MAX_ACTIVE_TORRENTS, defaults.max_active_torrents),
            ignore_slow_torrents: read
                .bool(keys::IGNORE_SLOW_TORRENTS, defaults.ignore_slow_torrents),
            slow_torrent_download_rate: read.int(
                keys::SLOW_TORRENT_DOWNLOAD_RATE,
                defaults.slow_torrent_download_rate,
            ),
            slow_torrent_upload_rate: read
                .int(keys::SLOW_TORRENT_UPLOAD_RATE, defaults.slow_torrent_upload_rate),
            slow_torrent_inactivity: read.duration(
                keys::SLOW_TORRENT_INACTIVITY_SECS,
                defaults.slow_torrent_inactivity,
                Duration::from_secs,
            ),
            global_max_ratio: read
                .float(keys::GLOBAL_MAX_RATIO, defaults.global_max_ratio)
                .min(MAX_RATIO),
            global_max_seeding_minutes: read
                .int(
                    keys::GLOBAL_MAX_SEEDING_MINUTES,
                    defaults.global_max_seeding_minutes,
                )
                .min(MAX_SEEDING_MINUTES),
            max_ratio_action: read.max_ratio_action(defaults.max_ratio_action),
            add_torrent_paused: read.bool(keys::ADD_TORRENT_PAUSED, defaults.add_torrent_paused),
            refresh_interval: read.duration(
                keys::REFRESH_INTERVAL_MS,
                defaults.refresh_interval,
                Duration::from_millis,
            ),
            save_resume_data_interval: read.duration(
                keys::SAVE_RESUME_DATA_INTERVAL_MINS,
                defaults.save_resume_data_interval,
                |mins| Duration::from_secs(mins.saturating_mul(60)),
            ),
            share_limit_check_interval: read.duration(
                keys::SHARE_LIMIT_CHECK_INTERVAL_SECS,
                defaults.share_limit_check_interval,
                Duration::from_secs,
            ),
            alert_poll_interval: read.duration(
                keys::ALERT_POLL_INTERVAL_MS,
                defaults.alert_poll_interval,
                Duration::from_millis,
            ),
        }
    }

    /// Download limit currently in force, honouring the alternative toggle.
    #[must_use]
    pub const fn effective_download_limit(&self) -> Option<u64> {
        rate_limit(if self.alt_limits_enabled {
            self.alt_download_limit
        } else {
            self.global_download_limit
        })
    }

    /// Upload limit currently in force, honouring the alternative toggle.
    #[must_use]
    pub const fn effective_upload_limit(&self) -> Option<u64> {
        rate_limit(if self.alt_limits_enabled {
            self.alt_upload_limit
        } else {
            self.global_upload_limit
        })
    }

    /// Directory for incomplete torrents, or `None` when the temporary path is off.
    #[must_use]
    pub fn temp_path(&self) -> Option<String> {
        if !self.temp_path_enabled {
            return None;
        }
        let configured = self.temp_path.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        let base = self.default_save_path.trim_end_matches(['/', '\\']);
        Some(format!("{base}/temp"))
    }

    /// Trackers appended to every new torrent, when enabled.
    #[must_use]
    pub fn additional_tracker_list(&self) -> Vec<String> {
        if !self.add_trackers_enabled {
            return Vec::new();
        }
        self.additional_trackers
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Global ratio limit, or `None` when disabled.
    #[must_use]
    pub fn global_ratio_limit(&self) -> Option<f64> {
        (self.global_max_ratio >= 0.0).then_some(self.global_max_ratio)
    }

    /// Global seeding time limit in minutes, or `None` when disabled.
    #[must_use]
    pub const fn global_seeding_limit(&self) -> Option<i64> {
        if self.global_max_seeding_minutes >= 0 {
            Some(self.global_max_seeding_minutes)
        } else {
            None
        }
    }
}

/// Interpret a count setting where negative values mean unlimited.
#[must_use]
pub fn count_limit(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Interpret a rate setting where zero or negative values mean unlimited.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn rate_limit(value: i64) -> Option<u64> {
    if value > 0 {
        Some(value as u64)
    } else {
        None
    }
}

struct Reader<'a> {
    store: &'a dyn SettingsStore,
}

impl Reader<'_> {
    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(SettingValue) -> Option<T>,
    ) -> ConfigResult<Option<T>> {
        let Some(value) = self.store.get(key) else {
            return Ok(None);
        };
        extract(value)
            .map(Some)
            .ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected,
            })
    }

    fn or_default<T>(result: ConfigResult<Option<T>>, default: T) -> T {
        match result {
            Ok(value) => value.unwrap_or(default),
            Err(err) => {
                if let ConfigError::TypeMismatch { key, expected } = &err {
                    warn!(error = %err, key = %key, expected, "using default for setting");
                }
                default
            }
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        Self::or_default(
            self.typed(key, "bool", |value| match value {
                SettingValue::Bool(flag) => Some(flag),
                _ => None,
            }),
            default,
        )
    }

    fn int(&self, key: &str, default: i64) -> i64 {
        Self::or_default(
            self.typed(key, "int", |value| match value {
                SettingValue::Int(number) => Some(number),
                _ => None,
            }),
            default,
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn float(&self, key: &str, default: f64) -> f64 {
        Self::or_default(
            self.typed(key, "float", |value| match value {
                SettingValue::Float(number) => Some(number),
                SettingValue::Int(number) => Some(number as f64),
                _ => None,
            }),
            default,
        )
    }

    fn string(&self, key: &str, default: &str) -> String {
        Self::or_default(
            self.typed(key, "string", |value| match value {
                SettingValue::String(text) => Some(text),
                _ => None,
            }),
            default.to_string(),
        )
    }

    fn string_list(&self, key: &str, default: &[String]) -> Vec<String> {
        Self::or_default(
            self.typed(key, "string_list", |value| match value {
                SettingValue::StringList(items) => Some(items),
                _ => None,
            }),
            default.to_vec(),
        )
    }

    fn duration(&self, key: &str, default: Duration, unit: impl Fn(u64) -> Duration) -> Duration {
        let raw = self.typed(key, "non-negative int", |value| match value {
            SettingValue::Int(number) => u64::try_from(number).ok(),
            _ => None,
        });
        Self::or_default(raw.map(|value| value.map(unit)), default)
    }

    fn encryption(&self, default: EncryptionMode) -> EncryptionMode {
        Self::or_default(
            self.typed(keys::ENCRYPTION, "encryption code 0..=2", |value| match value {
                SettingValue::Int(code) => EncryptionMode::from_code(code),
                _ => None,
            }),
            default,
        )
    }

    fn max_ratio_action(&self, default: MaxRatioAction) -> MaxRatioAction {
        Self::or_default(
            self.typed(keys::MAX_RATIO_ACTION, "pause or remove", |value| match value {
                SettingValue::String(raw) => MaxRatioAction::parse(&raw),
                _ => None,
            }),
            default,
        )
    }

    fn proxy_kind(&self, default: ProxyKind) -> ProxyKind {
        Self::or_default(
            self.typed(keys::PROXY_KIND, "proxy kind", |value| match value {
                SettingValue::String(raw) => ProxyKind::parse(&raw),
                _ => None,
            }),
            default,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;

    #[test]
    fn empty_store_yields_defaults() {
        let store = MemorySettingsStore::new();
        let settings = SessionSettings::load(&store);
        assert_eq!(settings, SessionSettings::default());
        assert_eq!(settings.max_active_downloads, 3);
        assert_eq!(settings.max_active_uploads, 3);
        assert_eq!(settings.max_active_torrents, 5);
        assert_eq!(settings.refresh_interval, Duration::from_millis(1500));
        assert_eq!(settings.save_resume_data_interval, Duration::from_secs(180));
        assert_eq!(settings.encryption, EncryptionMode::Prefer);
        assert_eq!(settings.port, 8999);
        assert_eq!(settings.global_ratio_limit(), None);
        assert_eq!(settings.global_seeding_limit(), None);
    }

    #[test]
    fn stored_values_override_defaults() {
        let store = MemorySettingsStore::new();
        store.set(keys::MAX_ACTIVE_DOWNLOADS, SettingValue::Int(2));
        store.set(keys::GLOBAL_MAX_RATIO, SettingValue::Int(2));
        store.set(keys::MAX_RATIO_ACTION, "Remove".into());
        store.set(keys::ENCRYPTION, SettingValue::Int(1));
        store.set(keys::PROXY_KIND, "socks5".into());
        store.set(keys::SAVE_RESUME_DATA_INTERVAL_MINS, SettingValue::Int(5));
        let settings = SessionSettings::load(&store);
        assert_eq!(settings.max_active_downloads, 2);
        assert_eq!(settings.global_ratio_limit(), Some(2.0));
        assert_eq!(settings.max_ratio_action, MaxRatioAction::Remove);
        assert_eq!(settings.encryption, EncryptionMode::Require);
        assert_eq!(settings.proxy.kind, ProxyKind::Socks5);
        assert_eq!(settings.save_resume_data_interval, Duration::from_secs(300));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let store = MemorySettingsStore::new();
        store.set(keys::DHT_ENABLED, "yes".into());
        store.set(keys::ENCRYPTION, SettingValue::Int(7));
        store.set(keys::REFRESH_INTERVAL_MS, SettingValue::Int(-5));
        store.set(keys::GLOBAL_MAX_RATIO, SettingValue::Float(50_000.0));
        let settings = SessionSettings::load(&store);
        assert!(settings.dht_enabled);
        assert_eq!(settings.encryption, EncryptionMode::Prefer);
        assert_eq!(settings.refresh_interval, Duration::from_millis(1500));
        assert!((settings.global_max_ratio - MAX_RATIO).abs() < f64::EPSILON);
    }

    #[test]
    fn alternative_limits_take_effect_when_enabled() {
        let mut settings = SessionSettings {
            global_download_limit: 0,
            global_upload_limit: 500,
            ..SessionSettings::default()
        };
        assert_eq!(settings.effective_download_limit(), None);
        assert_eq!(settings.effective_upload_limit(), Some(500));
        settings.alt_limits_enabled = true;
        assert_eq!(settings.effective_download_limit(), Some(10 * 1024));
        assert_eq!(settings.effective_upload_limit(), Some(10 * 1024));
    }

    #[test]
    fn additional_trackers_require_toggle() {
        let mut settings = SessionSettings {
            additional_trackers: "udp://a.example:80\n\n  http://b.example/announce  \n".into(),
            ..SessionSettings::default()
        };
        assert!(settings.additional_tracker_list().is_empty());
        settings.add_trackers_enabled = true;
        assert_eq!(
            settings.additional_tracker_list(),
            vec![
                "udp://a.example:80".to_string(),
                "http://b.example/announce".to_string()
            ]
        );
    }

    #[test]
    fn temp_path_derives_from_default_save_path() {
        let store = MemorySettingsStore::new();
        store.set(keys::DEFAULT_SAVE_PATH, SettingValue::from("/srv/data/"));
        let settings = SessionSettings::load(&store);
        assert_eq!(settings.temp_path(), None);

        store.set(keys::TEMP_PATH_ENABLED, SettingValue::Bool(true));
        let settings = SessionSettings::load(&store);
        assert_eq!(settings.temp_path().as_deref(), Some("/srv/data/temp"));

        store.set(keys::TEMP_PATH, SettingValue::from(" /scratch "));
        let settings = SessionSettings::load(&store);
        assert_eq!(settings.temp_path().as_deref(), Some("/scratch"));
    }

    #[test]
    fn limit_helpers_treat_sentinels_as_unlimited() {
        assert_eq!(count_limit(-1), None);
        assert_eq!(count_limit(0), Some(0));
        assert_eq!(count_limit(4), Some(4));
        assert_eq!(rate_limit(0), None);
        assert_eq!(rate_limit(-3), None);
        assert_eq!(rate_limit(1024), Some(1024));
    }
}
