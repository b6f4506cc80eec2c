//! Copies of `.torrent` files written to the export directories.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sluice_events::InfoHash;
use tracing::{info, warn};

const EXTENSION: &str = "torrent";
const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// File name for `name`: separators and control characters become `_`.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|ch| {
            if matches!(ch, '/' | '\\' | ':') || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "torrent".to_string()
    } else {
        stem.to_string()
    }
}

/// Write `bytes` as `<dir>/<name>.torrent`, adding ` N` before the
/// extension when the name is taken. Returns the written path.
pub(crate) fn export_torrent(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let stem = file_stem(name);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = if attempt == 0 {
            format!("{stem}.{EXTENSION}")
        } else {
            format!("{stem} {attempt}.{EXTENSION}")
        };
        let path = dir.join(file_name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create {}", path.display()));
            }
        };
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(path);
    }
    bail!("no free file name for {stem} in {}", dir.display())
}

/// Export on a blocking thread; failures are logged.
pub(crate) fn spawn_export(info_hash: InfoHash, dir: String, name: String, bytes: Vec<u8>) {
    tokio::task::spawn_blocking(move || {
        match export_torrent(Path::new(&dir), &name, &bytes) {
            Ok(path) => info!(info_hash = %info_hash, path = %path.display(), "torrent file exported"),
            Err(err) => warn!(info_hash = %info_hash, error = %err, "torrent file export failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn existing_names_get_a_counter() -> Result<()> {
        let dir = TempDir::new()?;
        let first = export_torrent(dir.path(), "debian.iso", b"d1:ae")?;
        let second = export_torrent(dir.path(), "debian.iso", b"d1:be")?;
        assert_eq!(first, dir.path().join("debian.iso.torrent"));
        assert_eq!(second, dir.path().join("debian.iso 1.torrent"));
        assert_eq!(fs::read(&second)?, b"d1:be");
        Ok(())
    }

    #[test]
    fn names_cannot_escape_the_directory() -> Result<()> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("exports");
        let path = export_torrent(&nested, "../../etc/passwd", b"de")?;
        assert_eq!(path.parent(), Some(nested.as_path()));
        assert_eq!(file_stem("  "), "torrent");
        assert_eq!(file_stem("a/b\\c"), "a_b_c");
        Ok(())
    }
}
