//! Single-owner config state shared across managers.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::Config;
use crate::config_persistence::persist_config_file;

/// Authoritative in-memory config with serialized file writes.
///
/// Managers never persist from their own config copies. Updates go through
/// [`ConfigCoordinator::apply_update`], which merges the change into the
/// shared copy under a lock and writes the merged result, so a manager
/// holding a stale snapshot cannot overwrite fields another manager just
/// changed.
pub struct ConfigCoordinator {
    state: Mutex<Config>,
    config_path: Option<PathBuf>,
}

impl ConfigCoordinator {
    pub fn new(config: Config, config_path: PathBuf) -> ConfigCoordinator {
        ConfigCoordinator {
            state: Mutex::new(config),
            config_path: Some(config_path),
        }
    }

    /// Coordinator with no backing file; updates stay in memory (tests).
    pub fn new_in_memory(config: Config) -> ConfigCoordinator {
        ConfigCoordinator {
            state: Mutex::new(config),
            config_path: None,
        }
    }

    /// True when updates are written to a config file.
    pub fn persistence_enabled(&self) -> bool {
        self.config_path.is_some()
    }

    /// Clone of the current authoritative config.
    pub fn snapshot(&self) -> Config {
        self.state
            .lock()
            .expect("config state lock poisoned")
            .clone()
    }

    /// Applies `update` to the authoritative config, persists the merged
    /// result, and returns it. Callers must only touch the fields they own.
    pub fn apply_update<F>(&self, update: F) -> Config
    where
        F: FnOnce(&mut Config),
    {
        let mut state = self.state.lock().expect("config state lock poisoned");
        update(&mut state);
        if let Some(config_path) = &self.config_path {
            persist_config_file(&state, config_path);
        }
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_persistence::load_config_file;
    use crate::protocol::WatchedFolder;

    #[test]
    fn test_updates_from_different_owners_merge_on_disk() {
        let dir = std::env::temp_dir().join(format!("cadenza-coord-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp config dir");
        let path = dir.join("config.toml");

        let coordinator = ConfigCoordinator::new(Config::default(), path.clone());
        coordinator.apply_update(|config| {
            config.library.watched_folders.push(WatchedFolder {
                id: "wf-1".to_string(),
                path: PathBuf::from("/music"),
                enabled: true,
            });
        });
        coordinator.apply_update(|config| {
            config.ui.volume = 0.5;
        });

        let on_disk = load_config_file(&path);
        assert_eq!(on_disk.library.watched_folders.len(), 1);
        assert!((on_disk.ui.volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(coordinator.snapshot(), on_disk);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_in_memory_coordinator_keeps_updates_off_disk() {
        let coordinator = ConfigCoordinator::new_in_memory(Config::default());
        assert!(!coordinator.persistence_enabled());

        let updated = coordinator.apply_update(|config| {
            config.scrobbler.enabled = true;
        });
        assert!(updated.scrobbler.enabled);
        assert!(coordinator.snapshot().scrobbler.enabled);
    }
}
