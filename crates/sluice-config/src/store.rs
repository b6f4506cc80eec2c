//! Key/value settings store with change notification.
//!
//! # Design
//! - Values are typed at the store boundary; callers never parse strings.
//! - Every effective write bumps a revision published over a `watch` channel,
//!   so the session can mark its configuration dirty without polling.
//! - Absent keys are not errors; readers substitute their defaults.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{ConfigError, ConfigResult};

/// Typed value held by the settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    /// Boolean toggle.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Free-form string.
    String(String),
    /// Ordered list of strings.
    StringList(Vec<String>),
    /// String-keyed map of strings.
    StringMap(BTreeMap<String, String>),
}

impl SettingValue {
    /// Name of the variant, used in type-mismatch diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::StringList(_) => "string_list",
            Self::StringMap(_) => "string_map",
        }
    }

    fn from_json(key: &str, value: Value) -> ConfigResult<Self> {
        match value {
            Value::Bool(flag) => Ok(Self::Bool(flag)),
            Value::Number(number) => number.as_i64().map_or_else(
                || {
                    number
                        .as_f64()
                        .map(Self::Float)
                        .ok_or_else(|| ConfigError::UnsupportedValue {
                            key: key.to_string(),
                        })
                },
                |int| Ok(Self::Int(int)),
            ),
            Value::String(text) => Ok(Self::String(text)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => Ok(text),
                    _ => Err(ConfigError::UnsupportedValue {
                        key: key.to_string(),
                    }),
                })
                .collect::<ConfigResult<Vec<_>>>()
                .map(Self::StringList),
            Value::Object(map) => map
                .into_iter()
                .map(|(name, item)| match item {
                    Value::String(text) => Ok((name, text)),
                    _ => Err(ConfigError::UnsupportedValue {
                        key: key.to_string(),
                    }),
                })
                .collect::<ConfigResult<BTreeMap<_, _>>>()
                .map(Self::StringMap),
            Value::Null => Err(ConfigError::UnsupportedValue {
                key: key.to_string(),
            }),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<BTreeMap<String, String>> for SettingValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::StringMap(value)
    }
}

/// Storage boundary for named settings.
pub trait SettingsStore: Send + Sync {
    /// Read a value; `None` means "use the default".
    fn get(&self, key: &str) -> Option<SettingValue>;
    /// Write a value, notifying watchers when it changed.
    fn set(&self, key: &str, value: SettingValue);
    /// Remove a value so readers fall back to the default.
    fn remove(&self, key: &str);
    /// Current revision; increases on every effective change.
    fn revision(&self) -> u64;
    /// Subscribe to revision changes.
    fn watch(&self) -> watch::Receiver<u64>;
}

/// Thread-safe in-memory settings store.
#[derive(Debug)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, SettingValue>>,
    revision: watch::Sender<u64>,
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettingsStore {
    /// Create an empty store at revision zero.
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            values: RwLock::new(BTreeMap::new()),
            revision,
        }
    }

    /// Seed a store from a flat JSON object of `key: value` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid JSON, is not an object,
    /// or holds values that cannot be represented as [`SettingValue`].
    pub fn from_json(document: &str) -> ConfigResult<Self> {
        let parsed: Value = serde_json::from_str(document)
            .map_err(|source| ConfigError::InvalidDocument { source })?;
        let Value::Object(entries) = parsed else {
            return Err(ConfigError::NotAnObject);
        };
        let mut values = BTreeMap::new();
        for (key, value) in entries {
            let setting = SettingValue::from_json(&key, value)?;
            values.insert(key, setting);
        }
        let (revision, _) = watch::channel(0);
        Ok(Self {
            values: RwLock::new(values),
            revision,
        })
    }

    /// Snapshot every stored key/value pair.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, SettingValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: SettingValue) {
        let changed = {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            if values.get(key) == Some(&value) {
                false
            } else {
                values.insert(key.to_string(), value);
                true
            }
        };
        if changed {
            self.bump();
        }
    }

    fn remove(&self, key: &str) {
        let removed = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.bump();
        }
    }

    fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn set_bumps_revision_only_on_change() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.revision(), 0);
        store.set("session.port", SettingValue::Int(6881));
        assert_eq!(store.revision(), 1);
        store.set("session.port", SettingValue::Int(6881));
        assert_eq!(store.revision(), 1);
        store.remove("session.port");
        assert_eq!(store.revision(), 2);
        store.remove("session.port");
        assert_eq!(store.revision(), 2);
        assert_eq!(store.get("session.port"), None);
    }

    #[tokio::test]
    async fn watchers_observe_changes() -> Result<()> {
        let store = MemorySettingsStore::new();
        let mut watcher = store.watch();
        store.set("session.dht_enabled", false.into());
        watcher.changed().await?;
        assert_eq!(*watcher.borrow_and_update(), 1);
        Ok(())
    }

    #[test]
    fn seeds_from_json_document() -> Result<()> {
        let store = MemorySettingsStore::from_json(
            r#"{
                "session.port": 51413,
                "session.global_max_ratio": 1.5,
                "session.dht_enabled": false,
                "session.default_save_path": "/data",
                "session.tags": ["linux", "iso"],
                "session.categories": {"Movies": "/data/movies"}
            }"#,
        )?;
        assert_eq!(store.get("session.port"), Some(SettingValue::Int(51_413)));
        assert_eq!(
            store.get("session.global_max_ratio"),
            Some(SettingValue::Float(1.5))
        );
        assert_eq!(
            store.get("session.tags"),
            Some(SettingValue::StringList(vec!["linux".into(), "iso".into()]))
        );
        let categories = match store.get("session.categories") {
            Some(SettingValue::StringMap(map)) => map,
            other => panic!("unexpected categories value {other:?}"),
        };
        assert_eq!(categories.get("Movies").map(String::as_str), Some("/data/movies"));
        assert_eq!(store.snapshot().len(), 6);
        Ok(())
    }

    #[test]
    fn rejects_unsupported_documents() {
        assert!(matches!(
            MemorySettingsStore::from_json("[1, 2]"),
            Err(ConfigError::NotAnObject)
        ));
        assert!(matches!(
            MemorySettingsStore::from_json(r#"{"key": null}"#),
            Err(ConfigError::UnsupportedValue { .. })
        ));
        assert!(matches!(
            MemorySettingsStore::from_json("{"),
            Err(ConfigError::InvalidDocument { .. })
        ));
    }
}
