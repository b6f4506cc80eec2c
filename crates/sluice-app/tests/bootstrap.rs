use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use sluice_app::bootstrap::{LOG_FORMAT_ENV, RESUME_DIR_ENV, SETTINGS_FILE_ENV};
use sluice_app::{AppError, BootstrapDependencies, run_app_with};
use sluice_config::{MemorySettingsStore, SettingsStore};
use sluice_events::EventBus;
use sluice_session::{Session, SessionConfig, StubEngine};
use sluice_telemetry::Metrics;
use tempfile::TempDir;

fn lookup(vars: &[(&str, String)]) -> impl Fn(&str) -> Option<String> + use<> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn unreadable_settings_file_is_reported() {
    let result = BootstrapDependencies::from_lookup(lookup(&[(
        SETTINGS_FILE_ENV,
        "/nonexistent/sluice-settings.json".to_string(),
    )]));
    assert!(matches!(result, Err(AppError::SettingsRead { .. })));
}

#[test]
fn malformed_settings_file_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "[1, 2, 3]")?;
    let result = BootstrapDependencies::from_lookup(lookup(&[(
        SETTINGS_FILE_ENV,
        path.display().to_string(),
    )]));
    assert!(matches!(result, Err(AppError::Config { .. })));
    Ok(())
}

#[tokio::test]
async fn session_runs_until_shutdown_and_releases_the_resume_dir() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = dir.path().join("settings.json");
    std::fs::write(&settings, r#"{"session.default_save_path": "/srv/downloads"}"#)?;
    let resume_dir = dir.path().join("resume");
    let dependencies = BootstrapDependencies::from_lookup(lookup(&[
        (RESUME_DIR_ENV, resume_dir.display().to_string()),
        (SETTINGS_FILE_ENV, settings.display().to_string()),
        (LOG_FORMAT_ENV, "json".to_string()),
    ]))?;

    run_app_with(dependencies, async { Ok(()) }).await?;
    assert!(resume_dir.join(".lock").exists());

    let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
    let session = Session::start(
        SessionConfig { resume_dir },
        Box::new(StubEngine::new()),
        store,
        EventBus::new(),
        Metrics::new()?,
    )?;
    session.shutdown().await?;
    Ok(())
}
