//! Comment-preserving persistence for `config.toml`.

use std::path::Path;

use log::warn;
use toml_edit::{value, ArrayOfTables, DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};
use crate::protocol::SortOrder;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let replacing_scalar_with_aot = item.is_array_of_tables()
        && table
            .get(key)
            .is_some_and(|current| !current.is_array_of_tables());
    if replacing_scalar_with_aot {
        table.remove(key);
        table[key] = item;
        return;
    }

    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq + Copy,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn ensure_section_table(document: &mut DocumentMut, key: &str) {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
}

fn sort_order_label(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ascending",
        SortOrder::Descending => "descending",
    }
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    ensure_section_table(document, "ui");
    ensure_section_table(document, "library");
    ensure_section_table(document, "scrobbler");

    {
        let ui = document["ui"].as_table_mut().expect("ui should be a table");
        set_table_scalar_if_changed(
            ui,
            "volume",
            f64::from(previous.ui.volume),
            f64::from(config.ui.volume),
            value,
        );
        set_table_scalar_if_changed(ui, "muted", previous.ui.muted, config.ui.muted, value);
        set_table_scalar_if_changed(ui, "shuffle", previous.ui.shuffle, config.ui.shuffle, value);
        if !ui.contains_key("sort_key") || previous.ui.sort_key != config.ui.sort_key {
            set_table_value_preserving_decor(ui, "sort_key", value(config.ui.sort_key.clone()));
        }
        if !ui.contains_key("sort_order") || previous.ui.sort_order != config.ui.sort_order {
            set_table_value_preserving_decor(
                ui,
                "sort_order",
                value(sort_order_label(config.ui.sort_order)),
            );
        }
        set_table_scalar_if_changed(
            ui,
            "sort_ignore_words_enabled",
            previous.ui.sort_ignore_words_enabled,
            config.ui.sort_ignore_words_enabled,
            value,
        );
        if !ui.contains_key("sort_ignore_words")
            || previous.ui.sort_ignore_words != config.ui.sort_ignore_words
        {
            set_table_value_preserving_decor(
                ui,
                "sort_ignore_words",
                value(config.ui.sort_ignore_words.clone()),
            );
        }
    }

    {
        let library = document["library"]
            .as_table_mut()
            .expect("library should be a table");
        if !library.contains_key("watched_folders")
            || previous.library.watched_folders != config.library.watched_folders
        {
            let mut folders = ArrayOfTables::new();
            for folder in &config.library.watched_folders {
                let mut row = Table::new();
                row.insert("id", value(folder.id.clone()));
                row.insert("path", value(folder.path.display().to_string()));
                row.insert("enabled", value(folder.enabled));
                folders.push(row);
            }
            set_table_value_preserving_decor(
                library,
                "watched_folders",
                Item::ArrayOfTables(folders),
            );
        }
    }

    {
        let scrobbler = document["scrobbler"]
            .as_table_mut()
            .expect("scrobbler should be a table");
        set_table_scalar_if_changed(
            scrobbler,
            "enabled",
            previous.scrobbler.enabled,
            config.scrobbler.enabled,
            value,
        );
        if !scrobbler.contains_key("username")
            || previous.scrobbler.username != config.scrobbler.username
        {
            set_table_value_preserving_decor(
                scrobbler,
                "username",
                value(config.scrobbler.username.clone()),
            );
        }
        set_table_scalar_if_changed(
            scrobbler,
            "scrobble_threshold",
            previous.scrobbler.scrobble_threshold,
            config.scrobbler.scrobble_threshold,
            value,
        );
    }
}

/// Rewrites an existing config text with updated values, keeping user
/// comments and formatting intact.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

/// Writes the config to disk, preserving comments when the file exists.
pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

/// Loads the config file, falling back to defaults on any read/parse error.
pub fn load_config_file(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::protocol::WatchedFolder;

    #[test]
    fn test_serialize_preserves_comments_and_updates_changed_scalars() {
        let existing = "[ui]\n# user set this low on purpose\nvolume = 0.25\nmuted = false\n";
        let mut config = Config::default();
        config.ui.volume = 0.25;
        config.ui.muted = true;

        let updated =
            serialize_config_with_preserved_comments(existing, &config).expect("should rewrite");
        assert!(updated.contains("# user set this low on purpose"));
        assert!(updated.contains("volume = 0.25"));
        assert!(updated.contains("muted = true"));
    }

    #[test]
    fn test_serialize_writes_watched_folder_rows() {
        let mut config = Config::default();
        config.library.watched_folders.push(WatchedFolder {
            id: "wf-1".to_string(),
            path: PathBuf::from("/music/flac"),
            enabled: true,
        });

        let updated = serialize_config_with_preserved_comments("", &config).expect("rewrite");
        let restored: Config = toml::from_str(&updated).expect("should parse");
        assert_eq!(restored.library.watched_folders.len(), 1);
        assert_eq!(
            restored.library.watched_folders[0].path,
            PathBuf::from("/music/flac")
        );
    }

    #[test]
    fn test_load_config_file_falls_back_on_corrupt_toml() {
        let dir = std::env::temp_dir().join("cadenza_config_persistence_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("corrupt_config.toml");
        std::fs::write(&path, "[ui\nvolume = nonsense").expect("write fixture");

        let config = load_config_file(&path);
        assert_eq!(config, Config::default());
        let _ = std::fs::remove_file(&path);
    }
}
