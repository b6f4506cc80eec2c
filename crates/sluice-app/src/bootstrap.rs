use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use sluice_config::{MemorySettingsStore, SettingsStore};
use sluice_events::EventBus;
use sluice_session::{Session, SessionConfig, StubEngine};
use sluice_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Log level or directive string.
pub const LOG_LEVEL_ENV: &str = "SLUICE_LOG_LEVEL";
/// `json` or `pretty`; anything else picks the build default.
pub const LOG_FORMAT_ENV: &str = "SLUICE_LOG_FORMAT";
/// Directory holding fast-resume data.
pub const RESUME_DIR_ENV: &str = "SLUICE_RESUME_DIR";
/// Optional flat JSON document seeding the settings store.
pub const SETTINGS_FILE_ENV: &str = "SLUICE_SETTINGS_FILE";

const DEFAULT_RESUME_DIR: &str = "sluice-resume";

/// Dependencies required to bootstrap a session.
pub struct BootstrapDependencies {
    log_level: String,
    log_format: LogFormat,
    resume_dir: PathBuf,
    store: Arc<MemorySettingsStore>,
    events: EventBus,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Construct dependencies from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be read or parsed, or
    /// when the metrics registry cannot be built.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Construct dependencies from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`BootstrapDependencies::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let log_level = lookup(LOG_LEVEL_ENV)
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_format = lookup(LOG_FORMAT_ENV)
            .as_deref()
            .map_or_else(LogFormat::infer, LogFormat::from_name);
        let resume_dir = lookup(RESUME_DIR_ENV)
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_RESUME_DIR), PathBuf::from);

        let store = match lookup(SETTINGS_FILE_ENV).filter(|path| !path.trim().is_empty()) {
            Some(path) => {
                let path = PathBuf::from(path);
                let document = std::fs::read_to_string(&path)
                    .map_err(|source| AppError::SettingsRead { path, source })?;
                MemorySettingsStore::from_json(&document)
                    .map_err(|err| AppError::config("settings.from_json", err))?
            }
            None => MemorySettingsStore::new(),
        };
        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        Ok(Self {
            log_level,
            log_format,
            resume_dir,
            store: Arc::new(store),
            events: EventBus::new(),
            metrics,
        })
    }
}

/// Entry point for the boot sequence; runs until ctrl-c.
///
/// # Errors
///
/// Returns an error if dependency construction, logging setup or session
/// startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies, tokio::signal::ctrl_c()).await
}

/// Boot sequence over injected dependencies; stops when `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if logging cannot be installed, the session fails to
/// start or stop, or the shutdown signal cannot be awaited.
pub async fn run_app_with(
    dependencies: BootstrapDependencies,
    shutdown: impl Future<Output = io::Result<()>>,
) -> AppResult<()> {
    let BootstrapDependencies {
        log_level,
        log_format,
        resume_dir,
        store,
        events,
        metrics,
    } = dependencies;
    sluice_telemetry::init_logging(&LoggingConfig {
        level: &log_level,
        format: log_format,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(resume_dir = %resume_dir.display(), "sluice bootstrap starting");
    let store: Arc<dyn SettingsStore> = store;
    let session = Session::start(
        SessionConfig { resume_dir },
        Box::new(StubEngine::new()),
        store,
        events,
        metrics,
    )
    .map_err(|err| AppError::session("session.start", err))?;

    let mut stream = session.subscribe(None);
    let event_log = tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            debug!(id = ?envelope.id, event = envelope.event.kind(), "session event");
        }
    });

    let signal = shutdown.await;
    info!("shutdown requested");
    let stopped = session
        .shutdown()
        .await
        .map_err(|err| AppError::session("session.shutdown", err));
    event_log.abort();
    signal.map_err(|source| AppError::Signal { source })?;
    stopped?;
    info!("sluice stopped");
    Ok(())
}
