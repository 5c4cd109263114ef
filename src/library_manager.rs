//! Library-domain orchestrator.
//!
//! Owns the track collection and the watched-folder list, persists folder
//! mutations to the config file, and rebuilds the collection on rescans.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};
use uuid::Uuid;

use crate::config::Config;
use crate::config_coordinator::ConfigCoordinator;
use crate::media_file_discovery::{collect_audio_files_from_watched_folders, infer_track_fields};
use crate::protocol::{self, Track, WatchedFolder};

/// Coordinates the track collection and watched-folder scanning.
pub struct LibraryManager {
    tracks: Vec<Track>,
    config: Config,
    config_coordinator: Arc<ConfigCoordinator>,
    bus_consumer: Receiver<protocol::Message>,
    bus_producer: Sender<protocol::Message>,
}

impl LibraryManager {
    /// Creates a library manager bound to bus channels. Folder mutations go
    /// through the shared config coordinator.
    pub fn new(
        bus_consumer: Receiver<protocol::Message>,
        bus_producer: Sender<protocol::Message>,
        config_coordinator: Arc<ConfigCoordinator>,
    ) -> Self {
        let config = config_coordinator.snapshot();
        Self {
            tracks: Vec::new(),
            config,
            config_coordinator,
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        if !self.config.library.watched_folders.is_empty() {
            self.rescan_watched_folders();
        }

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => match message {
                    protocol::Message::Library(library_message) => {
                        self.handle_library_message(library_message);
                    }
                    protocol::Message::Config(protocol::ConfigMessage::ConfigChanged(config)) => {
                        // This manager owns the library section; only the
                        // other sections are taken from broadcasts.
                        self.config.ui = config.ui;
                        self.config.scrobbler = config.scrobbler;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("LibraryManager: bus receiver lagged, skipped {skipped} messages");
                }
                Err(RecvError::Closed) => {
                    info!("LibraryManager: bus closed, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_library_message(&mut self, message: protocol::LibraryMessage) {
        match message {
            protocol::LibraryMessage::RequestTracks => {
                self.emit_tracks();
            }
            protocol::LibraryMessage::UpdateTrackMetadata {
                id,
                title,
                artist,
                album,
            } => {
                self.update_track_metadata(&id, title, artist, album);
            }
            protocol::LibraryMessage::ToggleFavorite(id) => {
                self.toggle_favorite(&id);
            }
            protocol::LibraryMessage::MarkFavoritesByIdentity(pairs) => {
                self.mark_favorites_by_identity(&pairs);
            }
            protocol::LibraryMessage::RemoveTracks(ids) => {
                let before = self.tracks.len();
                self.tracks.retain(|track| !ids.contains(&track.id));
                if self.tracks.len() != before {
                    self.emit_tracks();
                }
            }
            protocol::LibraryMessage::RequestWatchedFolders => {
                self.emit_watched_folders();
            }
            protocol::LibraryMessage::WatchedFolderAdd(path) => {
                self.add_watched_folder(path);
            }
            protocol::LibraryMessage::WatchedFolderSetEnabled { id, enabled } => {
                self.set_watched_folder_enabled(&id, enabled);
            }
            protocol::LibraryMessage::WatchedFolderRemove(id) => {
                self.remove_watched_folder(&id);
            }
            protocol::LibraryMessage::RescanWatchedFolders => {
                self.rescan_watched_folders();
            }
            // Notifications this manager emits itself.
            protocol::LibraryMessage::TracksResult(_)
            | protocol::LibraryMessage::TrackMetadataChanged(_)
            | protocol::LibraryMessage::FavoriteChanged { .. }
            | protocol::LibraryMessage::WatchedFoldersResult(_)
            | protocol::LibraryMessage::ScanStarted
            | protocol::LibraryMessage::ScanCompleted { .. }
            | protocol::LibraryMessage::ScanFailed(_) => {}
        }
    }

    fn update_track_metadata(&mut self, id: &str, title: String, artist: String, album: String) {
        let Some(track) = self.tracks.iter_mut().find(|track| track.id == id) else {
            warn!("LibraryManager: metadata update for unknown track {id}");
            return;
        };
        track.title = title;
        track.artist = artist;
        track.album = album;
        let updated = track.clone();
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::TrackMetadataChanged(updated),
        ));
    }

    fn toggle_favorite(&mut self, id: &str) {
        let Some(track) = self.tracks.iter_mut().find(|track| track.id == id) else {
            warn!("LibraryManager: favorite toggle for unknown track {id}");
            return;
        };
        track.favorite = !track.favorite;
        let favorite = track.favorite;
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::FavoriteChanged {
                id: id.to_string(),
                favorite,
            },
        ));
    }

    /// Marks tracks whose (artist, title) matches one of `pairs`,
    /// case-insensitively. Already-favorite tracks are left alone.
    fn mark_favorites_by_identity(&mut self, pairs: &[(String, String)]) {
        let wanted: Vec<(String, String)> = pairs
            .iter()
            .map(|(artist, title)| (artist.to_lowercase(), title.to_lowercase()))
            .collect();
        let mut changed = Vec::new();
        for track in self.tracks.iter_mut() {
            if track.favorite {
                continue;
            }
            let identity = (track.artist.to_lowercase(), track.title.to_lowercase());
            if wanted.contains(&identity) {
                track.favorite = true;
                changed.push(track.id.clone());
            }
        }
        info!(
            "LibraryManager: marked {} favorites from {} imported pairs",
            changed.len(),
            pairs.len()
        );
        for id in changed {
            let _ = self.bus_producer.send(protocol::Message::Library(
                protocol::LibraryMessage::FavoriteChanged { id, favorite: true },
            ));
        }
    }

    fn add_watched_folder(&mut self, path: PathBuf) {
        let already_watched = self
            .config
            .library
            .watched_folders
            .iter()
            .any(|folder| folder.path == path);
        if already_watched {
            warn!("LibraryManager: folder {} is already watched", path.display());
            return;
        }
        self.config.library.watched_folders.push(WatchedFolder {
            id: Uuid::new_v4().to_string(),
            path,
            enabled: true,
        });
        self.persist_config();
        self.emit_watched_folders();
    }

    fn set_watched_folder_enabled(&mut self, id: &str, enabled: bool) {
        let Some(folder) = self
            .config
            .library
            .watched_folders
            .iter_mut()
            .find(|folder| folder.id == id)
        else {
            return;
        };
        folder.enabled = enabled;
        self.persist_config();
        self.emit_watched_folders();
    }

    fn remove_watched_folder(&mut self, id: &str) {
        let before = self.config.library.watched_folders.len();
        self.config
            .library
            .watched_folders
            .retain(|folder| folder.id != id);
        if self.config.library.watched_folders.len() == before {
            return;
        }
        self.persist_config();
        self.emit_watched_folders();
    }

    fn rescan_watched_folders(&mut self) {
        let enabled_count = self
            .config
            .library
            .watched_folders
            .iter()
            .filter(|folder| folder.enabled)
            .count();
        if enabled_count == 0 {
            let _ = self.bus_producer.send(protocol::Message::Library(
                protocol::LibraryMessage::ScanFailed(
                    "no enabled watched folders to scan".to_string(),
                ),
            ));
            return;
        }
        let _ = self
            .bus_producer
            .send(protocol::Message::Library(protocol::LibraryMessage::ScanStarted));

        // Keep ids and favorites stable for files that survive the rescan.
        let existing_by_path: HashMap<PathBuf, Track> = self
            .tracks
            .drain(..)
            .map(|track| (track.path.clone(), track))
            .collect();
        let files = collect_audio_files_from_watched_folders(&self.config.library.watched_folders);
        self.tracks = files
            .into_iter()
            .map(|path| match existing_by_path.get(&path) {
                Some(existing) => existing.clone(),
                None => {
                    let (title, artist, album) = infer_track_fields(&path);
                    Track {
                        id: Uuid::new_v4().to_string(),
                        path,
                        title,
                        artist,
                        album,
                        duration_secs: 0.0,
                        favorite: false,
                    }
                }
            })
            .collect();

        info!("LibraryManager: rescan indexed {} tracks", self.tracks.len());
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::ScanCompleted {
                indexed_tracks: self.tracks.len(),
            },
        ));
        self.emit_tracks();
    }

    fn persist_config(&mut self) {
        let folders = self.config.library.watched_folders.clone();
        self.config = self.config_coordinator.apply_update(|config| {
            config.library.watched_folders = folders;
        });
        let _ = self.bus_producer.send(protocol::Message::Config(
            protocol::ConfigMessage::ConfigChanged(self.config.clone()),
        ));
    }

    fn emit_tracks(&self) {
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::TracksResult(self.tracks.clone()),
        ));
    }

    fn emit_watched_folders(&self) {
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::WatchedFoldersResult(
                self.config.library.watched_folders.clone(),
            ),
        ));
    }
}
