//! Session-owned data kept in the settings store between runs.
//!
//! Categories, tags and all-time transfer totals are written by the session
//! itself rather than by users, but live in the same store so a single backend
//! persists everything.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::keys;
use crate::store::{SettingValue, SettingsStore};

/// Categories mapped to their explicit save path (empty = derived).
#[must_use]
pub fn load_categories(store: &dyn SettingsStore) -> BTreeMap<String, String> {
    match store.get(keys::CATEGORIES) {
        None => BTreeMap::new(),
        Some(SettingValue::StringMap(map)) => map,
        Some(other) => {
            warn!(
                key = keys::CATEGORIES,
                found = other.type_name(),
                "ignoring stored categories"
            );
            BTreeMap::new()
        }
    }
}

/// Persist the category table.
pub fn store_categories(store: &dyn SettingsStore, categories: &BTreeMap<String, String>) {
    store.set(keys::CATEGORIES, SettingValue::StringMap(categories.clone()));
}

/// Global tag set.
#[must_use]
pub fn load_tags(store: &dyn SettingsStore) -> BTreeSet<String> {
    match store.get(keys::TAGS) {
        None => BTreeSet::new(),
        Some(SettingValue::StringList(tags)) => tags.into_iter().collect(),
        Some(other) => {
            warn!(key = keys::TAGS, found = other.type_name(), "ignoring stored tags");
            BTreeSet::new()
        }
    }
}

/// Persist the global tag set.
pub fn store_tags(store: &dyn SettingsStore, tags: &BTreeSet<String>) {
    store.set(
        keys::TAGS,
        SettingValue::StringList(tags.iter().cloned().collect()),
    );
}

/// Bytes transferred in previous sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllTimeTotals {
    /// Downloaded bytes.
    pub download: u64,
    /// Uploaded bytes.
    pub upload: u64,
}

/// Read the stored all-time totals; malformed or negative entries read as zero.
#[must_use]
pub fn load_all_time_totals(store: &dyn SettingsStore) -> AllTimeTotals {
    let read = |key: &str| match store.get(key) {
        Some(SettingValue::Int(value)) => u64::try_from(value).unwrap_or_default(),
        _ => 0,
    };
    AllTimeTotals {
        download: read(keys::ALL_TIME_DOWNLOAD),
        upload: read(keys::ALL_TIME_UPLOAD),
    }
}

/// Persist all-time totals, saturating at `i64::MAX`.
pub fn store_all_time_totals(store: &dyn SettingsStore, totals: AllTimeTotals) {
    let clamp = |value: u64| i64::try_from(value).unwrap_or(i64::MAX);
    store.set(keys::ALL_TIME_DOWNLOAD, SettingValue::Int(clamp(totals.download)));
    store.set(keys::ALL_TIME_UPLOAD, SettingValue::Int(clamp(totals.upload)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;

    #[test]
    fn taxonomy_round_trips_through_store() {
        let store = MemorySettingsStore::new();
        let mut categories = BTreeMap::new();
        categories.insert("Movies".to_string(), "/data/movies".to_string());
        categories.insert("Linux/Ubuntu".to_string(), String::new());
        store_categories(&store, &categories);
        assert_eq!(load_categories(&store), categories);

        let tags: BTreeSet<String> = ["iso".to_string(), "linux".to_string()].into();
        store_tags(&store, &tags);
        assert_eq!(load_tags(&store), tags);
    }

    #[test]
    fn malformed_entries_read_as_empty() {
        let store = MemorySettingsStore::new();
        store.set(keys::CATEGORIES, SettingValue::Bool(true));
        store.set(keys::TAGS, "iso".into());
        store.set(keys::ALL_TIME_DOWNLOAD, SettingValue::Int(-4));
        assert!(load_categories(&store).is_empty());
        assert!(load_tags(&store).is_empty());
        assert_eq!(load_all_time_totals(&store), AllTimeTotals::default());
    }

    #[test]
    fn totals_persist() {
        let store = MemorySettingsStore::new();
        let totals = AllTimeTotals {
            download: 1 << 40,
            upload: u64::MAX,
        };
        store_all_time_totals(&store, totals);
        let loaded = load_all_time_totals(&store);
        assert_eq!(loaded.download, 1 << 40);
        assert_eq!(loaded.upload, u64::try_from(i64::MAX).unwrap_or_default());
    }
}
