//! Named setting keys understood by [`SessionSettings::load`](crate::SessionSettings::load).

/// Default directory for new torrents and root of derived category paths.
pub const DEFAULT_SAVE_PATH: &str = "session.default_save_path";
/// Keep incomplete torrents under the temporary path until they finish.
pub const TEMP_PATH_ENABLED: &str = "session.temp_path_enabled";
/// Directory for incomplete torrents; empty means `<default save path>/temp`.
pub const TEMP_PATH: &str = "session.temp_path";
/// Directory receiving a copy of every added `.torrent` file (empty = off).
pub const TORRENT_EXPORT_DIR: &str = "session.torrent_export_dir";
/// Directory receiving a copy of every finished `.torrent` file (empty = off).
pub const FINISHED_TORRENT_EXPORT_DIR: &str = "session.finished_torrent_export_dir";
/// Whether `/` in category names creates parent categories.
pub const SUBCATEGORIES_ENABLED: &str = "session.subcategories_enabled";
/// New torrents start in manual save-path mode unless requested otherwise.
pub const AUTO_TMM_DISABLED_BY_DEFAULT: &str = "session.auto_tmm_disabled_by_default";
/// Switch torrents to manual mode instead of relocating them on category change.
pub const DISABLE_AUTO_TMM_ON_CATEGORY_CHANGED: &str =
    "session.disable_auto_tmm_on_category_changed";
/// Switch torrents to manual mode when the default save path changes.
pub const DISABLE_AUTO_TMM_ON_DEFAULT_SAVE_PATH_CHANGED: &str =
    "session.disable_auto_tmm_on_default_save_path_changed";
/// Switch torrents to manual mode when their category save path changes.
pub const DISABLE_AUTO_TMM_ON_CATEGORY_SAVE_PATH_CHANGED: &str =
    "session.disable_auto_tmm_on_category_save_path_changed";

/// Distributed hash table discovery.
pub const DHT_ENABLED: &str = "session.dht_enabled";
/// Local service discovery.
pub const LSD_ENABLED: &str = "session.lsd_enabled";
/// Peer exchange.
pub const PEX_ENABLED: &str = "session.pex_enabled";
/// UPnP / NAT-PMP port mapping.
pub const UPNP_ENABLED: &str = "session.upnp_enabled";

/// Global download limit in bytes per second (0 = unlimited).
pub const GLOBAL_DOWNLOAD_LIMIT: &str = "session.global_download_limit";
/// Global upload limit in bytes per second (0 = unlimited).
pub const GLOBAL_UPLOAD_LIMIT: &str = "session.global_upload_limit";
/// Alternative download limit in bytes per second.
pub const ALT_DOWNLOAD_LIMIT: &str = "session.alt_download_limit";
/// Alternative upload limit in bytes per second.
pub const ALT_UPLOAD_LIMIT: &str = "session.alt_upload_limit";
/// Use the alternative limits instead of the global ones.
pub const ALT_LIMITS_ENABLED: &str = "session.alt_limits_enabled";
/// Exempt LAN peers from rate limiting.
pub const IGNORE_LIMITS_ON_LAN: &str = "session.ignore_limits_on_lan";
/// Count protocol overhead against the rate limits.
pub const INCLUDE_OVERHEAD_IN_LIMITS: &str = "session.include_overhead_in_limits";
/// Apply rate limits to uTP connections.
pub const UTP_RATE_LIMITED: &str = "session.utp_rate_limited";

/// Listening port.
pub const PORT: &str = "session.port";
/// Network interface to bind to (empty = any).
pub const NETWORK_INTERFACE: &str = "session.network_interface";
/// Address on the interface to bind to (empty = any).
pub const NETWORK_INTERFACE_ADDRESS: &str = "session.network_interface_address";
/// Also listen on IPv6.
pub const IPV6_ENABLED: &str = "session.ipv6_enabled";
/// Encryption mode: 0 prefer, 1 require, 2 disable.
pub const ENCRYPTION: &str = "session.encryption";

/// Proxy kind (`none`, `socks4`, `socks5`, `http`).
pub const PROXY_KIND: &str = "session.proxy.kind";
/// Proxy host.
pub const PROXY_HOST: &str = "session.proxy.host";
/// Proxy port.
pub const PROXY_PORT: &str = "session.proxy.port";
/// Proxy user name.
pub const PROXY_USERNAME: &str = "session.proxy.username";
/// Proxy password.
pub const PROXY_PASSWORD: &str = "session.proxy.password";
/// Route peer connections through the proxy as well.
pub const PROXY_PEER_CONNECTIONS: &str = "session.proxy.peer_connections";

/// Global connection limit (negative = unlimited).
pub const MAX_CONNECTIONS: &str = "session.max_connections";
/// Per-torrent connection limit (negative = unlimited).
pub const MAX_CONNECTIONS_PER_TORRENT: &str = "session.max_connections_per_torrent";
/// Global upload slot limit (negative = unlimited).
pub const MAX_UPLOADS: &str = "session.max_uploads";
/// Per-torrent upload slot limit (negative = unlimited).
pub const MAX_UPLOADS_PER_TORRENT: &str = "session.max_uploads_per_torrent";

/// Hide identifying information from peers and trackers.
pub const ANONYMOUS_MODE: &str = "session.anonymous_mode";
/// IP address reported to trackers.
pub const ANNOUNCE_IP: &str = "session.announce_ip";
/// Announce to every tracker in a tier.
pub const ANNOUNCE_TO_ALL_TRACKERS: &str = "session.announce_to_all_trackers";
/// Announce to every tier.
pub const ANNOUNCE_TO_ALL_TIERS: &str = "session.announce_to_all_tiers";
/// Peer addresses that are never connected to.
pub const BANNED_IPS: &str = "session.banned_ips";
/// Append [`ADDITIONAL_TRACKERS`] to new torrents.
pub const ADD_TRACKERS_ENABLED: &str = "session.add_trackers_enabled";
/// Newline separated tracker URLs.
pub const ADDITIONAL_TRACKERS: &str = "session.additional_trackers";

/// Enforce the active torrent limits.
pub const QUEUEING_ENABLED: &str = "session.queueing_enabled";
/// Maximum active downloads (negative = unlimited).
pub const MAX_ACTIVE_DOWNLOADS: &str = "session.max_active_downloads";
/// Maximum active uploads (negative = unlimited).
pub const MAX_ACTIVE_UPLOADS: &str = "session.max_active_uploads";
/// Maximum active torrents (negative = unlimited).
pub const MAX_ACTIVE_TORRENTS: &str = "session.max_active_torrents";
/// Slow torrents do not count against the active limits.
pub const IGNORE_SLOW_TORRENTS: &str = "session.ignore_slow_torrents";
/// Download rate (KiB/s) below which a torrent is slow.
pub const SLOW_TORRENT_DOWNLOAD_RATE: &str = "session.slow_torrent_download_rate";
/// Upload rate (KiB/s) below which a torrent is slow.
pub const SLOW_TORRENT_UPLOAD_RATE: &str = "session.slow_torrent_upload_rate";
/// Seconds a torrent must stay below the thresholds to be slow.
pub const SLOW_TORRENT_INACTIVITY_SECS: &str = "session.slow_torrent_inactivity_secs";

/// Global share ratio limit (negative = no limit).
pub const GLOBAL_MAX_RATIO: &str = "session.global_max_ratio";
/// Global seeding time limit in minutes (negative = no limit).
pub const GLOBAL_MAX_SEEDING_MINUTES: &str = "session.global_max_seeding_minutes";
/// Share-limit action: `pause` or `remove`.
pub const MAX_RATIO_ACTION: &str = "session.max_ratio_action";

/// New torrents start paused unless requested otherwise.
pub const ADD_TORRENT_PAUSED: &str = "session.add_torrent_paused";
/// Status refresh interval in milliseconds.
pub const REFRESH_INTERVAL_MS: &str = "session.refresh_interval_ms";
/// Resume data save interval in minutes (0 = only at shutdown).
pub const SAVE_RESUME_DATA_INTERVAL_MINS: &str = "session.save_resume_data_interval_mins";
/// Share-limit evaluation interval in seconds.
pub const SHARE_LIMIT_CHECK_INTERVAL_SECS: &str = "session.share_limit_check_interval_secs";
/// Alert drain interval in milliseconds.
pub const ALERT_POLL_INTERVAL_MS: &str = "session.alert_poll_interval_ms";

/// Category name to explicit save path (empty = derived).
pub const CATEGORIES: &str = "session.categories";
/// Global tag set.
pub const TAGS: &str = "session.tags";
/// Bytes downloaded in previous sessions.
pub const ALL_TIME_DOWNLOAD: &str = "session.all_time_download";
/// Bytes uploaded in previous sessions.
pub const ALL_TIME_UPLOAD: &str = "session.all_time_upload";
