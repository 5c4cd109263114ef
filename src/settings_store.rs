//! JSON key-value store for view-layer state.
//!
//! Column layout, sidebar collapse, and the scrobble retry queue live here
//! rather than in `config.toml`. Every committed `set` writes through to disk
//! so state survives an abrupt exit.

use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};

/// Settings key for the serialized column layout.
pub const KEY_COLUMN_LAYOUT: &str = "column_layout";
/// Settings key for the sidebar collapse flag.
pub const KEY_SIDEBAR_COLLAPSED: &str = "sidebar_collapsed";
/// Settings key for scrobbles awaiting retry.
pub const KEY_SCROBBLE_RETRY_QUEUE: &str = "scrobble_retry_queue";

/// File-backed (or in-memory, for tests) JSON key-value store.
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl SettingsStore {
    /// Opens the store at `path`, falling back to an empty store when the
    /// file is missing or corrupt.
    pub fn open(path: &Path) -> SettingsStore {
        let values = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    warn!(
                        "Settings file {} is not a JSON object. Starting empty.",
                        path.display()
                    );
                    Map::new()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse settings file {}. Starting empty. error={}",
                        path.display(),
                        err
                    );
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        SettingsStore {
            path: Some(path.to_path_buf()),
            values,
        }
    }

    /// Creates a store that never touches disk.
    pub fn new_in_memory() -> SettingsStore {
        SettingsStore {
            path: None,
            values: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Stores `value` under `key` and writes the file through.
    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        self.flush();
    }

    /// Removes `key` if present and writes the file through.
    pub fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.flush();
        }
    }

    fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let text = match serde_json::to_string_pretty(&Value::Object(self.values.clone())) {
            Ok(text) => text,
            Err(err) => {
                log::error!("Failed to serialize settings for {}: {}", path.display(), err);
                return;
            }
        };
        if let Err(err) = std::fs::write(path, text) {
            log::error!("Failed to persist settings to {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_store_round_trips_values() {
        let mut store = SettingsStore::new_in_memory();
        assert!(store.get(KEY_SIDEBAR_COLLAPSED).is_none());

        store.set(KEY_SIDEBAR_COLLAPSED, json!(true));
        assert_eq!(store.get_bool(KEY_SIDEBAR_COLLAPSED), Some(true));

        store.remove(KEY_SIDEBAR_COLLAPSED);
        assert!(store.get(KEY_SIDEBAR_COLLAPSED).is_none());
    }

    #[test]
    fn test_open_falls_back_to_empty_on_corrupt_json() {
        let dir = std::env::temp_dir().join("cadenza_settings_store_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("corrupt_settings.json");
        std::fs::write(&path, "{not json").expect("write fixture");

        let store = SettingsStore::open(&path);
        assert!(store.get(KEY_COLUMN_LAYOUT).is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_backed_store_persists_across_reopen() {
        let dir = std::env::temp_dir().join("cadenza_settings_store_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join(format!("settings_{}.json", uuid::Uuid::new_v4()));

        let mut store = SettingsStore::open(&path);
        store.set(KEY_SIDEBAR_COLLAPSED, json!(false));
        store.set(KEY_COLUMN_LAYOUT, json!({"order": ["title", "artist"]}));
        drop(store);

        let reopened = SettingsStore::open(&path);
        assert_eq!(reopened.get_bool(KEY_SIDEBAR_COLLAPSED), Some(false));
        assert_eq!(
            reopened
                .get(KEY_COLUMN_LAYOUT)
                .and_then(|value| value.get("order"))
                .and_then(|order| order.as_array())
                .map(|order| order.len()),
            Some(2)
        );
        let _ = std::fs::remove_file(&path);
    }
}
