//! Categories, tags, save-path management and IP filtering.

use std::net::IpAddr;

use sluice_config::{SettingValue, keys};
use sluice_events::{Event, InfoHash};
use sluice_torrent_core::{AddTorrentParams, IpRange, ShareLimit};
use tracing::{info, warn};

use super::Worker;
use crate::error::{SessionError, SessionResult};

impl Worker {
    /// Reject parameters naming categories or tags that do not exist.
    pub(super) fn validate_labels(&self, params: &AddTorrentParams) -> SessionResult<()> {
        self.taxonomy.require_category(&params.category)?;
        for tag in &params.tags {
            self.taxonomy.require_tag(tag)?;
        }
        Ok(())
    }

    pub(super) async fn set_category(
        &mut self,
        info_hash: InfoHash,
        category: String,
    ) -> SessionResult<()> {
        self.taxonomy.require_category(&category)?;
        let disable_tmm = self.settings.disable_auto_tmm_on_category_changed;
        let target = self
            .taxonomy
            .category_save_path(&category, &self.settings.default_save_path);
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.category == category {
            return Ok(());
        }
        let old_category = std::mem::replace(&mut record.category, category.clone());
        record.needs_resume_save = true;
        let auto_tmm = record.auto_tmm;
        if auto_tmm && disable_tmm {
            record.auto_tmm = false;
        }
        let _ = self.events.publish(Event::TorrentCategoryChanged {
            info_hash,
            old_category,
            new_category: category,
        });
        if auto_tmm {
            if disable_tmm {
                let _ = self.events.publish(Event::TorrentSavingModeChanged {
                    info_hash,
                    auto_managed: false,
                });
            } else {
                self.relocate(info_hash, target).await;
            }
        }
        Ok(())
    }

    pub(super) fn add_torrent_tag(&mut self, info_hash: InfoHash, tag: &str) -> SessionResult<bool> {
        let tag = tag.trim();
        self.taxonomy.require_tag(tag)?;
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if !record.tags.insert(tag.to_string()) {
            return Ok(false);
        }
        record.needs_resume_save = true;
        let _ = self.events.publish(Event::TorrentTagAdded {
            info_hash,
            tag: tag.to_string(),
        });
        Ok(true)
    }

    pub(super) fn remove_torrent_tag(
        &mut self,
        info_hash: InfoHash,
        tag: &str,
    ) -> SessionResult<bool> {
        let tag = tag.trim();
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if !record.tags.remove(tag) {
            return Ok(false);
        }
        record.needs_resume_save = true;
        let _ = self.events.publish(Event::TorrentTagRemoved {
            info_hash,
            tag: tag.to_string(),
        });
        Ok(true)
    }

    pub(super) async fn set_auto_tmm(
        &mut self,
        info_hash: InfoHash,
        enabled: bool,
    ) -> SessionResult<()> {
        let default_save_path = self.settings.default_save_path.clone();
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.auto_tmm == enabled {
            return Ok(());
        }
        record.auto_tmm = enabled;
        record.needs_resume_save = true;
        let target = self
            .taxonomy
            .category_save_path(&record.category, &default_save_path);
        let _ = self.events.publish(Event::TorrentSavingModeChanged {
            info_hash,
            auto_managed: enabled,
        });
        if enabled {
            self.relocate(info_hash, target).await;
        }
        Ok(())
    }

    /// Manual relocation; switches the torrent out of automatic mode.
    pub(super) async fn move_storage(&mut self, info_hash: InfoHash, path: &str) -> SessionResult<()> {
        let path = path.trim();
        if path.is_empty() {
            return Err(SessionError::InvalidSavePath {
                path: path.to_string(),
            });
        }
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        if record.auto_tmm {
            record.auto_tmm = false;
            record.needs_resume_save = true;
            let _ = self.events.publish(Event::TorrentSavingModeChanged {
                info_hash,
                auto_managed: false,
            });
        }
        self.relocate(info_hash, path.to_string()).await;
        Ok(())
    }

    pub(super) fn set_share_limits(
        &mut self,
        info_hash: InfoHash,
        ratio_limit: ShareLimit<f64>,
        seeding_time_limit: ShareLimit<i64>,
    ) -> SessionResult<()> {
        let Some(record) = self.registry.get_mut(&info_hash) else {
            return Err(SessionError::NotFound { info_hash });
        };
        record.ratio_limit = ratio_limit;
        record.seeding_time_limit = seeding_time_limit;
        record.share_limit_reached = false;
        record.needs_resume_save = true;
        Ok(())
    }

    pub(super) fn add_category(&mut self, name: &str, save_path: &str) -> SessionResult<()> {
        let created =
            self.taxonomy
                .add_category(name, save_path, self.settings.subcategories_enabled)?;
        self.persist_taxonomy();
        for name in created {
            info!(category = %name, "category added");
            let _ = self.events.publish(Event::CategoryAdded { name });
        }
        Ok(())
    }

    pub(super) async fn edit_category(&mut self, name: &str, save_path: &str) -> SessionResult<()> {
        if !self.taxonomy.edit_category(name, save_path)? {
            return Ok(());
        }
        self.persist_taxonomy();
        let target = self
            .taxonomy
            .category_save_path(name, &self.settings.default_save_path);
        let disable_tmm = self.settings.disable_auto_tmm_on_category_save_path_changed;
        let members: Vec<InfoHash> = self
            .registry
            .records()
            .filter(|record| record.auto_tmm && record.category == name)
            .map(|record| record.info_hash())
            .collect();
        for info_hash in members {
            if disable_tmm {
                if let Some(record) = self.registry.get_mut(&info_hash) {
                    record.auto_tmm = false;
                    record.needs_resume_save = true;
                }
                let _ = self.events.publish(Event::TorrentSavingModeChanged {
                    info_hash,
                    auto_managed: false,
                });
            } else {
                self.relocate(info_hash, target.clone()).await;
            }
        }
        info!(category = %name, save_path = %save_path, "category edited");
        Ok(())
    }

    /// Delete a category and its descendants; members become uncategorized.
    pub(super) async fn remove_category(&mut self, name: &str) -> SessionResult<()> {
        let removed = self.taxonomy.remove_category(name)?;
        self.persist_taxonomy();
        let default_save_path = self.settings.default_save_path.clone();
        let members: Vec<InfoHash> = self
            .registry
            .records()
            .filter(|record| removed.contains(&record.category))
            .map(|record| record.info_hash())
            .collect();
        for info_hash in members {
            let Some(record) = self.registry.get_mut(&info_hash) else {
                continue;
            };
            let old_category = std::mem::take(&mut record.category);
            record.needs_resume_save = true;
            let auto_tmm = record.auto_tmm;
            let _ = self.events.publish(Event::TorrentCategoryChanged {
                info_hash,
                old_category,
                new_category: String::new(),
            });
            if auto_tmm {
                self.relocate(info_hash, default_save_path.clone()).await;
            }
        }
        for name in removed {
            info!(category = %name, "category removed");
            let _ = self.events.publish(Event::CategoryRemoved { name });
        }
        Ok(())
    }

    pub(super) fn add_tag(&mut self, tag: &str) -> SessionResult<()> {
        let tag = self.taxonomy.add_tag(tag)?;
        self.persist_taxonomy();
        info!(tag = %tag, "tag added");
        let _ = self.events.publish(Event::TagAdded { tag });
        Ok(())
    }

    /// Delete a tag globally and from every torrent carrying it.
    pub(super) fn remove_tag(&mut self, tag: &str) -> SessionResult<()> {
        let tag = tag.trim();
        self.taxonomy.remove_tag(tag)?;
        for info_hash in self.registry.hashes() {
            let Some(record) = self.registry.get_mut(&info_hash) else {
                continue;
            };
            if record.tags.remove(tag) {
                record.needs_resume_save = true;
                let _ = self.events.publish(Event::TorrentTagRemoved {
                    info_hash,
                    tag: tag.to_string(),
                });
            }
        }
        self.persist_taxonomy();
        info!(tag = %tag, "tag removed");
        let _ = self.events.publish(Event::TagRemoved {
            tag: tag.to_string(),
        });
        Ok(())
    }

    /// Add an address to the persisted ban list.
    pub(super) fn ban_ip(&mut self, raw: &str) -> SessionResult<()> {
        let addr: IpAddr = raw.trim().parse().map_err(|_| SessionError::InvalidIp {
            value: raw.to_string(),
        })?;
        let addr = addr.to_string();
        let mut banned = self.settings.banned_ips.clone();
        if banned.contains(&addr) {
            return Ok(());
        }
        banned.push(addr.clone());
        self.store
            .set(keys::BANNED_IPS, SettingValue::StringList(banned));
        self.config_dirty = true;
        info!(ip = %addr, "peer address banned");
        Ok(())
    }

    pub(super) fn apply_ip_filter(&mut self, result: Result<Vec<IpRange>, String>) {
        match result {
            Ok(rules) => {
                info!(rules = rules.len(), "ip filter parsed");
                let rule_count = rules.len();
                self.ip_filter_rules = rules;
                let _ = self.events.publish(Event::IpFilterParsed {
                    error: false,
                    rule_count,
                });
            }
            Err(reason) => {
                warn!(reason = %reason, "ip filter could not be parsed");
                self.ip_filter_rules.clear();
                let _ = self.events.publish(Event::IpFilterParsed {
                    error: true,
                    rule_count: 0,
                });
            }
        }
        self.config_dirty = true;
    }

    /// Cascade a default save path change to automatic-mode torrents.
    pub(super) async fn default_save_path_changed(&mut self) {
        let disable_tmm = self.settings.disable_auto_tmm_on_default_save_path_changed;
        let default_save_path = self.settings.default_save_path.clone();
        let affected: Vec<(InfoHash, String)> = self
            .registry
            .records()
            .filter(|record| record.auto_tmm)
            .filter(|record| {
                record.category.is_empty()
                    || self
                        .taxonomy
                        .categories()
                        .get(&record.category)
                        .is_none_or(String::is_empty)
            })
            .map(|record| {
                (
                    record.info_hash(),
                    self.taxonomy
                        .category_save_path(&record.category, &default_save_path),
                )
            })
            .collect();
        for (info_hash, target) in affected {
            if disable_tmm {
                if let Some(record) = self.registry.get_mut(&info_hash) {
                    record.auto_tmm = false;
                    record.needs_resume_save = true;
                }
                let _ = self.events.publish(Event::TorrentSavingModeChanged {
                    info_hash,
                    auto_managed: false,
                });
            } else {
                self.relocate(info_hash, target).await;
            }
        }
    }
}
