//! Per-torrent tracker and web seed edits.

use sluice_events::{Event, InfoHash};
use sluice_torrent_core::TrackerEntry;
use tracing::info;

use super::Worker;
use crate::error::{SessionError, SessionResult};

fn normalize_url(url: &str) -> SessionResult<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(SessionError::InvalidUrl {
            url: url.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

impl Worker {
    pub(super) async fn add_trackers(
        &mut self,
        info_hash: InfoHash,
        entries: Vec<TrackerEntry>,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        let mut trackers = record.trackers.clone();
        let mut added = Vec::new();
        for entry in entries {
            let url = normalize_url(&entry.url)?;
            if trackers.iter().any(|existing| existing.url == url) {
                continue;
            }
            added.push(url.clone());
            trackers.push(TrackerEntry::new(url, entry.tier));
        }
        if added.is_empty() {
            return Ok(());
        }
        trackers.sort_by_key(|entry| entry.tier);
        self.engine
            .replace_trackers(info_hash, trackers.clone())
            .await
            .map_err(|err| SessionError::engine("replace_trackers", err))?;

        let was_trackerless = record.trackers.is_empty();
        record.trackers = trackers;
        record.needs_resume_save = true;
        info!(info_hash = %info_hash, count = added.len(), "trackers added");
        let _ = self.events.publish(Event::TrackersAdded {
            info_hash,
            trackers: added,
        });
        if was_trackerless {
            let _ = self.events.publish(Event::TrackerlessStateChanged {
                info_hash,
                trackerless: false,
            });
        }
        Ok(())
    }

    pub(super) async fn remove_trackers(
        &mut self,
        info_hash: InfoHash,
        urls: Vec<String>,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        let urls: Vec<&str> = urls.iter().map(|url| url.trim()).collect();
        let (removed, kept): (Vec<TrackerEntry>, Vec<TrackerEntry>) = record
            .trackers
            .iter()
            .cloned()
            .partition(|entry| urls.contains(&entry.url.as_str()));
        if removed.is_empty() {
            return Ok(());
        }
        self.engine
            .replace_trackers(info_hash, kept.clone())
            .await
            .map_err(|err| SessionError::engine("replace_trackers", err))?;

        for entry in &removed {
            record.tracker_status.remove(&entry.url);
        }
        record.trackers = kept;
        record.needs_resume_save = true;
        let now_trackerless = record.trackers.is_empty();
        info!(info_hash = %info_hash, count = removed.len(), "trackers removed");
        let _ = self.events.publish(Event::TrackersRemoved {
            info_hash,
            trackers: removed.into_iter().map(|entry| entry.url).collect(),
        });
        if now_trackerless {
            let _ = self.events.publish(Event::TrackerlessStateChanged {
                info_hash,
                trackerless: true,
            });
        }
        Ok(())
    }

    pub(super) async fn edit_tracker(
        &mut self,
        info_hash: InfoHash,
        old_url: &str,
        new_url: &str,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        let old_url = old_url.trim();
        let new_url = normalize_url(new_url)?;
        let Some(position) = record
            .trackers
            .iter()
            .position(|entry| entry.url == old_url)
        else {
            return Err(SessionError::TrackerNotFound {
                url: old_url.to_string(),
            });
        };
        if old_url == new_url {
            return Ok(());
        }
        if record.trackers.iter().any(|entry| entry.url == new_url) {
            return Err(SessionError::TrackerExists { url: new_url });
        }
        let mut trackers = record.trackers.clone();
        trackers[position].url.clone_from(&new_url);
        self.engine
            .replace_trackers(info_hash, trackers.clone())
            .await
            .map_err(|err| SessionError::engine("replace_trackers", err))?;

        record.tracker_status.remove(old_url);
        record.trackers = trackers;
        record.needs_resume_save = true;
        info!(info_hash = %info_hash, old_url = %old_url, new_url = %new_url, "tracker edited");
        let _ = self.events.publish(Event::TrackersChanged { info_hash });
        Ok(())
    }

    pub(super) async fn add_url_seeds(
        &mut self,
        info_hash: InfoHash,
        urls: Vec<String>,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        let mut seeds = record.url_seeds.clone();
        let mut added = Vec::new();
        for url in urls {
            let url = normalize_url(&url)?;
            if !seeds.contains(&url) {
                seeds.push(url.clone());
                added.push(url);
            }
        }
        if added.is_empty() {
            return Ok(());
        }
        self.engine
            .replace_url_seeds(info_hash, seeds.clone())
            .await
            .map_err(|err| SessionError::engine("replace_url_seeds", err))?;

        record.url_seeds = seeds;
        record.needs_resume_save = true;
        let _ = self.events.publish(Event::UrlSeedsAdded {
            info_hash,
            urls: added,
        });
        Ok(())
    }

    pub(super) async fn remove_url_seeds(
        &mut self,
        info_hash: InfoHash,
        urls: Vec<String>,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        let urls: Vec<&str> = urls.iter().map(|url| url.trim()).collect();
        let (removed, kept): (Vec<String>, Vec<String>) = record
            .url_seeds
            .iter()
            .cloned()
            .partition(|seed| urls.contains(&seed.as_str()));
        if removed.is_empty() {
            return Ok(());
        }
        self.engine
            .replace_url_seeds(info_hash, kept.clone())
            .await
            .map_err(|err| SessionError::engine("replace_url_seeds", err))?;

        record.url_seeds = kept;
        record.needs_resume_save = true;
        let _ = self.events.publish(Event::UrlSeedsRemoved {
            info_hash,
            urls: removed,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_trimmed_and_must_be_single_tokens() {
        assert_eq!(
            normalize_url("  udp://tracker.example:6969 ").ok().as_deref(),
            Some("udp://tracker.example:6969")
        );
        assert!(matches!(
            normalize_url("   "),
            Err(SessionError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize_url("http://a.example/ announce"),
            Err(SessionError::InvalidUrl { .. })
        ));
    }
}
