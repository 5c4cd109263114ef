//! Persistent application configuration model and defaults.

use std::path::PathBuf;

use crate::protocol::{SortOrder, WatchedFolder};

/// Root configuration persisted to `config.toml`.
///
/// View-layer state (column layout, sidebar collapse) lives in the JSON
/// settings store instead and must not be added here.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// UI preferences.
    pub ui: UiConfig,
    #[serde(default)]
    /// Library indexing preferences.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Scrobbling integration preferences.
    pub scrobbler: ScrobblerConfig,
}

/// UI preferences persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UiConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default = "default_sort_key")]
    pub sort_key: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: SortOrder,
    /// Strip leading articles from sort comparisons.
    #[serde(default = "default_true")]
    pub sort_ignore_words_enabled: bool,
    /// Comma-separated leading tokens ignored during sort comparison.
    #[serde(default = "default_sort_ignore_words")]
    pub sort_ignore_words: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            volume: default_volume(),
            muted: false,
            shuffle: false,
            sort_key: default_sort_key(),
            sort_order: default_sort_order(),
            sort_ignore_words_enabled: true,
            sort_ignore_words: default_sort_ignore_words(),
        }
    }
}

/// Library indexing preferences persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub watched_folders: Vec<WatchedFolder>,
}

/// Last.fm scrobbling preferences. The session key is stored in the OS
/// keyring, never in this file.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScrobblerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Signed-in account name, kept for display and session lookup.
    #[serde(default)]
    pub username: String,
    /// Play fraction that must elapse before a scrobble fires.
    #[serde(default = "default_scrobble_threshold")]
    pub scrobble_threshold: f64,
}

impl Default for ScrobblerConfig {
    fn default() -> Self {
        ScrobblerConfig {
            enabled: false,
            username: String::new(),
            scrobble_threshold: default_scrobble_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

fn default_sort_key() -> String {
    "artist".to_string()
}

fn default_sort_order() -> SortOrder {
    SortOrder::Ascending
}

fn default_sort_ignore_words() -> String {
    "the, a, an".to_string()
}

fn default_scrobble_threshold() -> f64 {
    0.8
}

/// Clamps out-of-range loaded values back into their valid domains.
pub fn sanitize_config(mut config: Config) -> Config {
    config.ui.volume = config.ui.volume.clamp(0.0, 1.0);
    if !(0.0..=1.0).contains(&config.scrobbler.scrobble_threshold) {
        config.scrobbler.scrobble_threshold = default_scrobble_threshold();
    }
    if config.ui.sort_key.trim().is_empty() {
        config.ui.sort_key = default_sort_key();
    }
    config
        .library
        .watched_folders
        .retain(|folder| folder.path != PathBuf::new());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sane_scrobble_threshold() {
        let config = Config::default();
        assert!((config.scrobbler.scrobble_threshold - 0.8).abs() < f64::EPSILON);
        assert!(!config.scrobbler.enabled);
    }

    #[test]
    fn test_sanitize_config_clamps_volume_and_threshold() {
        let mut config = Config::default();
        config.ui.volume = 4.2;
        config.scrobbler.scrobble_threshold = -1.0;
        config.ui.sort_key = "   ".to_string();

        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.ui.volume, 1.0);
        assert!((sanitized.scrobbler.scrobble_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(sanitized.ui.sort_key, "artist");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.ui.sort_ignore_words = "the, los, la".to_string();
        config.scrobbler.enabled = true;
        config.scrobbler.username = "listener".to_string();

        let text = toml::to_string(&config).expect("config should serialize");
        let restored: Config = toml::from_str(&text).expect("config should parse");
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_config_falls_back_to_field_defaults() {
        let restored: Config = toml::from_str("[ui]\nvolume = 0.5\n").expect("should parse");
        assert_eq!(restored.ui.volume, 0.5);
        assert!(restored.ui.sort_ignore_words_enabled);
        assert_eq!(restored.ui.sort_key, "artist");
    }
}
